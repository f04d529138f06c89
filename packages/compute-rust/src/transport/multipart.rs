//! `multipart/mixed` batch encoding.
//!
//! Request body, one part per sub-request:
//!
//! ```text
//! --{boundary}
//! Content-Type: application/http
//! Content-Transfer-Encoding: binary
//! Content-ID: <{index}>
//!
//! POST /compute/v1/projects/p/zones/z/instances HTTP/1.1
//! Content-Type: application/json
//!
//! {json body}
//! --{boundary}--
//! ```
//!
//! The response mirrors it with its own boundary (taken from the response
//! `Content-Type`) and `Content-ID: <response-{index}>`, so parts may be
//! matched back regardless of the order the server emits them in.

use cloudsdk_core::Resource;

use super::{SubResponse, TransportError};

const CRLF: &str = "\r\n";

/// One encoded sub-request.
#[derive(Debug, Clone)]
pub struct BatchPart<'a> {
    pub method: &'a http::Method,
    /// Origin-relative request target, e.g. `/compute/v1/projects/p/...?a=b`.
    pub target: String,
    pub body: Option<&'a serde_json::Value>,
}

/// Generates a boundary that cannot collide with JSON payloads.
#[must_use]
pub fn new_boundary() -> String {
    format!("batch_{}", uuid::Uuid::new_v4().simple())
}

/// Value of the outer `Content-Type` header for `boundary`.
#[must_use]
pub fn content_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary={boundary}")
}

/// Encodes `parts` into a batch request body.
#[must_use]
pub fn encode(boundary: &str, parts: &[BatchPart<'_>]) -> String {
    let mut out = String::new();
    for (index, part) in parts.iter().enumerate() {
        out.push_str(&format!("--{boundary}{CRLF}"));
        out.push_str(&format!("Content-Type: application/http{CRLF}"));
        out.push_str(&format!("Content-Transfer-Encoding: binary{CRLF}"));
        out.push_str(&format!("Content-ID: <{index}>{CRLF}{CRLF}"));
        out.push_str(&format!("{} {} HTTP/1.1{CRLF}", part.method, part.target));
        match part.body {
            Some(body) => {
                out.push_str(&format!("Content-Type: application/json{CRLF}{CRLF}"));
                out.push_str(&body.to_string());
                out.push_str(CRLF);
            }
            None => out.push_str(CRLF),
        }
    }
    out.push_str(&format!("--{boundary}--{CRLF}"));
    out
}

/// Decodes a batch response body into `expected` positional sub-responses.
///
/// A part that cannot be parsed becomes a `Protocol` error for that slot
/// only; a slot the server never answered gets one as well.
///
/// # Errors
///
/// Returns `TransportError::Protocol` when the envelope itself is unusable:
/// no boundary in `content_type`, a part without a usable `Content-ID`, or
/// an index outside the batch.
pub fn decode(
    content_type: &str,
    body: &str,
    expected: usize,
) -> Result<Vec<SubResponse>, TransportError> {
    let boundary = boundary_of(content_type).ok_or_else(|| {
        TransportError::Protocol(format!("no boundary in Content-Type `{content_type}`"))
    })?;
    let delimiter = format!("--{boundary}");

    let mut slots: Vec<Option<SubResponse>> = vec![None; expected];
    for segment in body.split(delimiter.as_str()).skip(1) {
        if segment.starts_with("--") {
            break;
        }
        let segment = segment.trim_start_matches(['\r', '\n']);
        let (headers, inner) = split_head(segment).unwrap_or((segment, ""));
        let index = content_index(headers)?;
        let slot = slots.get_mut(index).ok_or_else(|| {
            TransportError::Protocol(format!("response part {index} outside batch of {expected}"))
        })?;
        *slot = Some(parse_inner(inner));
    }

    Ok(slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                Err(TransportError::Protocol(format!(
                    "no response for sub-request {index}"
                )))
            })
        })
        .collect())
}

/// Extracts the `boundary` parameter of a `multipart/*` content type.
fn boundary_of(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|boundary| !boundary.is_empty())
}

/// Splits a header block from what follows the first blank line.
fn split_head(text: &str) -> Option<(&str, &str)> {
    text.split_once("\r\n\r\n")
        .or_else(|| text.split_once("\n\n"))
}

fn header<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then_some(value.trim())
    })
}

/// Reads the sub-request index from `Content-ID: <response-N>`.
fn content_index(headers: &str) -> Result<usize, TransportError> {
    let raw = header(headers, "Content-ID")
        .ok_or_else(|| TransportError::Protocol("part without Content-ID".to_string()))?;
    let id = raw.trim_start_matches('<').trim_end_matches('>');
    let id = id.strip_prefix("response-").unwrap_or(id);
    id.parse()
        .map_err(|_| TransportError::Protocol(format!("unusable Content-ID `{raw}`")))
}

/// Parses the embedded `HTTP/1.1 {code} {reason}` response of one part.
fn parse_inner(inner: &str) -> SubResponse {
    let inner = inner.trim_start_matches(['\r', '\n']);
    let (head, body) = split_head(inner).unwrap_or((inner, ""));
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| TransportError::Protocol(format!("no status line in part `{head}`")))?;
    let body = body.trim_end_matches(['\r', '\n']);

    if !(200..300).contains(&status) {
        return Err(TransportError::Http {
            status,
            content: body.to_string(),
        });
    }
    if body.trim().is_empty() {
        return Ok(Resource::Null);
    }
    serde_json::from_str(body)
        .map_err(|e| TransportError::Protocol(format!("invalid JSON in {status} response: {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn encodes_one_part_per_call() {
        let get = http::Method::GET;
        let post = http::Method::POST;
        let body = json!({"name": "vm-1"});
        let parts = [
            BatchPart {
                method: &get,
                target: "/compute/v1/projects/p/zones/z/instances/vm-0".to_string(),
                body: None,
            },
            BatchPart {
                method: &post,
                target: "/compute/v1/projects/p/zones/z/instances".to_string(),
                body: Some(&body),
            },
        ];

        let encoded = encode("xyz", &parts);

        assert_eq!(encoded.matches("--xyz\r\n").count(), 2);
        assert!(encoded.ends_with("--xyz--\r\n"));
        assert!(encoded.contains("Content-ID: <0>\r\n\r\nGET /compute/v1/projects/p/zones/z/instances/vm-0 HTTP/1.1\r\n"));
        assert!(encoded.contains(
            "Content-ID: <1>\r\n\r\nPOST /compute/v1/projects/p/zones/z/instances HTTP/1.1\r\nContent-Type: application/json\r\n\r\n{\"name\":\"vm-1\"}\r\n"
        ));
    }

    #[test]
    fn boundary_parsing_accepts_quotes_and_case() {
        assert_eq!(boundary_of("multipart/mixed; boundary=abc"), Some("abc"));
        assert_eq!(boundary_of("multipart/mixed; Boundary=\"a b\""), Some("a b"));
        assert_eq!(boundary_of("application/json"), None);
        assert_eq!(boundary_of("multipart/mixed; boundary="), None);
    }

    fn response_part(id: &str, status_line: &str, body: &str) -> String {
        format!(
            "--resp\r\nContent-Type: application/http\r\nContent-ID: <{id}>\r\n\r\n{status_line}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{body}\r\n"
        )
    }

    #[test]
    fn decodes_parts_by_content_id() {
        let body = format!(
            "{}{}--resp--\r\n",
            response_part("response-1", "HTTP/1.1 404 Not Found", r#"{"error":{"message":"gone"}}"#),
            response_part("response-0", "HTTP/1.1 200 OK", r#"{"name":"vm-0"}"#),
        );

        let responses = decode("multipart/mixed; boundary=resp", &body, 2).unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0], Ok(json!({"name": "vm-0"})));
        assert_eq!(
            responses[1],
            Err(TransportError::Http {
                status: 404,
                content: r#"{"error":{"message":"gone"}}"#.to_string(),
            })
        );
    }

    #[test]
    fn unanswered_slots_become_protocol_errors() {
        let body = format!(
            "{}--resp--\r\n",
            response_part("response-0", "HTTP/1.1 200 OK", r#"{"name":"vm-0"}"#)
        );
        let responses = decode("multipart/mixed; boundary=resp", &body, 2).unwrap();
        assert!(responses[0].is_ok());
        assert!(matches!(responses[1], Err(TransportError::Protocol(_))));
    }

    #[test]
    fn invalid_json_only_fails_its_own_slot() {
        let body = format!(
            "{}{}--resp--\r\n",
            response_part("response-0", "HTTP/1.1 200 OK", "{not json"),
            response_part("response-1", "HTTP/1.1 200 OK", r#"{"ok":true}"#),
        );
        let responses = decode("multipart/mixed; boundary=resp", &body, 2).unwrap();
        assert!(matches!(responses[0], Err(TransportError::Protocol(_))));
        assert_eq!(responses[1], Ok(json!({"ok": true})));
    }

    #[test]
    fn out_of_range_content_id_fails_the_batch() {
        let body = format!(
            "{}--resp--\r\n",
            response_part("response-7", "HTTP/1.1 200 OK", "{}")
        );
        let err = decode("multipart/mixed; boundary=resp", &body, 1).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn missing_boundary_fails_the_batch() {
        let err = decode("text/plain", "", 0).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn empty_success_body_is_null() {
        let body = "--b\nContent-ID: <response-0>\n\nHTTP/1.1 204 No Content\n\n\n--b--\n";
        let responses = decode("multipart/mixed; boundary=b", body, 1).unwrap();
        assert_eq!(responses, vec![Ok(Resource::Null)]);
    }
}
