//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module handles parsing of the `alt=sse` stream returned by
//! `streamGenerateContent`, converting raw byte streams into structured
//! `GenerateContentResponse` chunks.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::client::classify_api_error;
use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS};
use crate::types::{ApiErrorResponse, GenerateContentResponse};
use crate::{Error, Result};

/// Process a stream of bytes into a stream of response chunks.
///
/// Events are delimited by a blank line; both `\n\n` and `\r\n\r\n` are
/// accepted. Bytes are buffered until a whole event is available so that a
/// multi-byte character split across network reads decodes correctly.
/// Events without a `data:` field are skipped.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<GenerateContentResponse>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer),
        move |(mut stream, mut buffer)| async move {
            loop {
                // First check if we have a complete event in the buffer
                if let Some((event, consumed)) = split_event(&buffer) {
                    buffer.drain(..consumed);
                    match parse_event(&event) {
                        Some(item) => return Some((record(item), (stream, buffer))),
                        None => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        return Some((record(Err(e)), (stream, buffer)));
                    }
                    None => {
                        // End of stream: a final event may lack its trailing blank line.
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let event = std::mem::take(&mut buffer);
                        return parse_event(&event).map(|item| (record(item), (stream, buffer)));
                    }
                }
            }
        },
    )
}

fn record(item: Result<GenerateContentResponse>) -> Result<GenerateContentResponse> {
    match &item {
        Ok(_) => STREAM_EVENTS.click(),
        Err(_) => STREAM_ERRORS.click(),
    }
    item
}

/// Split the first complete event off the front of `buffer`.
///
/// Returns the event bytes and the number of bytes consumed, delimiter included.
fn split_event(buffer: &[u8]) -> Option<(Vec<u8>, usize)> {
    let lf = find(buffer, b"\n\n").map(|at| (at, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|at| (at, 4));
    let (at, len) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((buffer[..at].to_vec(), at + len))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse a single SSE event into a response chunk.
///
/// Returns `None` for events that carry no data (comments, keep-alives).
fn parse_event(event: &[u8]) -> Option<Result<GenerateContentResponse>> {
    let text = match std::str::from_utf8(event) {
        Ok(text) => text,
        Err(e) => {
            return Some(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut data: Option<String> = None;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    let data = data?;
    Some(parse_data(&data))
}

/// Parse the `data:` payload of an event.
///
/// An `{"error": ...}` payload becomes an error item rather than a chunk.
fn parse_data(data: &str) -> Result<GenerateContentResponse> {
    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })?;

    if value.get("error").is_some() {
        let body: ApiErrorResponse = serde_json::from_value(value)?;
        let detail = body.error;
        return Err(classify_api_error(
            detail.code.unwrap_or(500),
            detail.status,
            detail
                .message
                .unwrap_or_else(|| "error reported in stream".to_string()),
            None,
        ));
    }

    serde_json::from_value(value).map_err(|e| {
        Error::serialization(
            format!("Unexpected chunk shape: {e}"),
            Some(Box::new(e)),
        )
    })
}
