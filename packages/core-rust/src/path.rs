//! Helpers for shortening fully-qualified resource URIs.
//!
//! Every function assumes a well-formed URI and never fails: a string with
//! no separators is returned unchanged.

/// Returns the last `/`-separated segment of `uri`.
#[must_use]
pub fn name(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Returns the scoped part of `uri`: everything after `/zones/` or
/// `/regions/`, or just the name for global resources.
#[must_use]
pub fn scoped_suffix(uri: &str) -> &str {
    if let Some((_, suffix)) = uri.rsplit_once("/zones/") {
        suffix
    } else if let Some((_, suffix)) = uri.rsplit_once("/regions/") {
        suffix
    } else {
        name(uri)
    }
}

/// Returns everything after `/projects/`.
#[must_use]
pub fn project_suffix(uri: &str) -> &str {
    uri.rsplit_once("/projects/").map_or(uri, |(_, suffix)| suffix)
}
