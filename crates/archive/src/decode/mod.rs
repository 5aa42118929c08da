//! Archive Decoding
//!
//! Two decoders share the header and part parsing below:
//!
//! - [`decode_str`] splits an in-memory string on the boundary marker.
//! - [`decode_bytes`] and [`decode_reader`] scan bytes with a KMP matcher,
//!   the latter holding at most one part in memory at a time.
//!
//! None of them reject malformed input. A missing boundary yields the
//! top-level headers with no parts, a part without `Content-Location` is
//! skipped, and content that is not valid base64 is kept as raw text.

mod scan;
mod text;

pub use self::scan::{decode_bytes, decode_reader};
pub use self::text::decode_str;
use crate::keys;
use crate::model::{ArchivePart, MAIN_DOCUMENT_ID, PartKind};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

static BOUNDARY_PARAM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bboundary\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).unwrap());

type Headers = BTreeMap<String, String>;

/// Locate the first blank line (CRLF or LF line endings).
///
/// Returns the end of the header block and the start of the body.
pub(crate) fn find_blank_line(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    for (index, byte) in bytes.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        if bytes[line_start..index].iter().all(|b| *b == b'\r') {
            return Some((line_start, index + 1));
        }
        line_start = index + 1;
    }
    None
}

/// Parse `Key: value` lines. Lines without a colon are ignored.
pub(crate) fn parse_headers(block: &[u8]) -> Headers {
    String::from_utf8_lossy(block)
        .lines()
        .filter_map(parse_header_line)
        .collect()
}

pub(crate) fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim().trim_end_matches([';', ' ']);
    Some((key.to_string(), value.to_string()))
}

pub(crate) fn lookup<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Extract the `boundary` parameter of a `Content-Type` value, unquoted.
pub(crate) fn boundary_param(content_type: &str) -> Option<String> {
    let captures = BOUNDARY_PARAM_REGEX.captures(content_type)?;
    let value = captures.get(1).or_else(|| captures.get(2))?.as_str();
    match value.is_empty() {
        true => None,
        false => Some(value.to_string()),
    }
}

/// Record the boundary alongside the top-level headers.
pub(crate) fn with_boundary(mut headers: Headers) -> (Headers, Option<String>) {
    let boundary = lookup(&headers, keys::CONTENT_TYPE).and_then(boundary_param);
    if let Some(boundary) = &boundary {
        headers.insert(keys::BOUNDARY.to_string(), boundary.clone());
    }
    (headers, boundary)
}

/// Parse one segment between boundary markers.
pub(crate) fn parse_part(segment: &[u8]) -> Option<ArchivePart> {
    let segment = skip_line_breaks(segment);
    let (headers, body) = match find_blank_line(segment) {
        Some((header_end, body_start)) => (parse_headers(&segment[..header_end]), &segment[body_start..]),
        None => (parse_headers(segment), &segment[segment.len()..]),
    };

    let Some(url) = lookup(&headers, keys::CONTENT_LOCATION) else {
        tracing::warn!(headers = ?headers, "skipping archive part without Content-Location");
        return None;
    };
    let mime_type = lookup(&headers, keys::CONTENT_TYPE).unwrap_or(DEFAULT_MIME_TYPE);
    let kind = match lookup(&headers, keys::CONTENT_ID) {
        Some(id) if id.contains(MAIN_DOCUMENT_ID) => PartKind::Document,
        _ => PartKind::Resource,
    };

    Some(ArchivePart {
        kind,
        url: url.to_string(),
        mime_type: mime_type.to_string(),
        content: decode_content(url, body),
    })
}

/// Base64-decode a part body, falling back to the trimmed raw bytes.
pub(crate) fn decode_content(url: &str, body: &[u8]) -> Vec<u8> {
    let compact: Vec<u8> = body.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
    match STANDARD.decode(&compact) {
        Ok(content) => content,
        Err(err) => {
            tracing::debug!(url, error = %err, "part content is not base64, keeping raw bytes");
            body.trim_ascii().to_vec()
        },
    }
}

fn skip_line_breaks(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != b'\r' && *b != b'\n').unwrap_or(bytes.len());
    &bytes[start..]
}

/// A segment that is only whitespace carries no part.
pub(crate) fn is_blank(segment: &[u8]) -> bool {
    segment.iter().all(u8::is_ascii_whitespace)
}
