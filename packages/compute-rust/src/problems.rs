//! Turning accumulated soft errors into something a command can report.

use std::collections::BTreeSet;

use cloudsdk_core::RequestError;

use crate::error::ToolError;

const DEFAULT_PROBLEMS_TITLE: &str = "Some requests did not succeed:";

/// Formats `items` under `title`, one ` - item` row per distinct item in
/// sorted order.
#[must_use]
pub fn construct_list<I, S>(title: &str, items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let items: BTreeSet<String> = items
        .into_iter()
        .map(|item| item.as_ref().to_string())
        .collect();
    let mut buf = format!("{title}\n");
    for item in &items {
        buf.push_str(" - ");
        buf.push_str(item);
        buf.push('\n');
    }
    buf
}

/// Fails with every message of `errors` when there is at least one.
///
/// # Errors
///
/// Returns a [`ToolError`] listing the error messages under `title`, or
/// under a generic title when `title` is `None`.
pub fn raise_on_problems(errors: &[RequestError], title: Option<&str>) -> Result<(), ToolError> {
    if errors.is_empty() {
        return Ok(());
    }
    Err(ToolError(construct_list(
        title.unwrap_or(DEFAULT_PROBLEMS_TITLE),
        errors.iter().map(|e| e.message.as_str()),
    )))
}
