//! API utility functions
//!
//! Pure, stateless helpers for request processing, kept out of services.rs
//! so they can be unit tested.

use bytes::Bytes;

use crate::api::error::ApiError;

/// How a request body maps to events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    /// The whole body is one event
    Single,
    /// Each non-empty line is an event
    Lines,
}

/// Picks the body format from the Content-Type header
///
/// `application/x-ndjson` and `application/jsonl` (parameters allowed) are
/// split into lines. A missing header or any other media type is one event.
/// A header that is not a media type at all is rejected.
pub fn parse_content_type(content_type: Option<&str>) -> Result<BodyFormat, ApiError> {
    let Some(content_type) = content_type else {
        return Ok(BodyFormat::Single);
    };

    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    let is_lines = media_type.type_() == mime::APPLICATION
        && matches!(media_type.subtype().as_str(), "x-ndjson" | "ndjson" | "jsonl");

    Ok(if is_lines {
        BodyFormat::Lines
    } else {
        BodyFormat::Single
    })
}

/// Splits a newline-delimited body into events without copying
///
/// Trailing `\r` is stripped and blank lines are skipped.
pub fn split_lines(body: &Bytes) -> Vec<Bytes> {
    let mut events = Vec::new();
    let mut start = 0;

    for (pos, byte) in body.iter().enumerate() {
        if *byte == b'\n' {
            push_line(body, start, pos, &mut events);
            start = pos + 1;
        }
    }
    push_line(body, start, body.len(), &mut events);

    events
}

fn push_line(body: &Bytes, start: usize, mut end: usize, events: &mut Vec<Bytes>) {
    if end > start && body[end - 1] == b'\r' {
        end -= 1;
    }
    if body[start..end].iter().all(u8::is_ascii_whitespace) {
        return;
    }
    events.push(body.slice(start..end));
}
