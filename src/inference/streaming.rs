//! Streaming response parser for newline-delimited JSON bodies.
//!
//! The model server streams one JSON frame per line. This module accumulates
//! partial-content frames into the full response text and stops at the
//! terminal frame (`done: true`), which carries token/timing statistics.
//!
//! A partial-line byte buffer is carried across chunk boundaries, so a frame
//! split mid-line (or mid-UTF-8-character) by the transport parses correctly,
//! and multiple frames arriving in one chunk are each parsed independently.

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::errors::InferenceError;
use super::types::{ParsedResponse, StreamFrame};

/// Boxed byte stream handed from the prompt client to the parser.
pub type ByteStream =
    std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, InferenceError>> + Send>>;

/// Callback invoked with the running response text after every partial frame.
pub type TokenCallback<'a> = &'a mut (dyn FnMut(&str) + Send);

// ─── Parser ─────────────────────────────────────────────────────────────────

/// Parse a newline-delimited JSON stream into the full response.
///
/// - Partial frames append their content fragment and fire `on_token` with
///   the running total.
/// - The terminal frame resolves immediately with accumulated text, the
///   continuation context, and the frame itself; any lines queued after it
///   are ignored.
/// - End-of-stream without a terminal frame resolves with whatever was
///   accumulated and an empty context.
/// - A malformed frame is fatal for this call: the error retains the
///   offending line for diagnostics. Retrying is the orchestrator's job.
///
/// Reads are strictly sequential, one chunk at a time.
pub async fn parse_chat_stream<S>(
    stream: S,
    mut on_token: Option<TokenCallback<'_>>,
) -> Result<ParsedResponse, InferenceError>
where
    S: Stream<Item = Result<Bytes, InferenceError>>,
{
    futures::pin_mut!(stream);

    let mut buffer: Vec<u8> = Vec::new();
    let mut text = String::new();

    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        buffer.extend_from_slice(&bytes);

        // Drain every complete line out of the buffer; the tail (no newline
        // yet) stays buffered for the next chunk.
        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            let line = &line[..line.len() - 1];

            if let Some(frame) = parse_frame_line(line)? {
                if frame.done {
                    return Ok(finish(text, frame));
                }
                text.push_str(frame.content());
                if let Some(cb) = on_token.as_deref_mut() {
                    cb(&text);
                }
            }
        }
    }

    // Stream ended without a trailing newline — the last line may still hold
    // the terminal frame.
    if let Some(frame) = parse_frame_line(&buffer)? {
        if frame.done {
            return Ok(finish(text, frame));
        }
        text.push_str(frame.content());
        if let Some(cb) = on_token.as_deref_mut() {
            cb(&text);
        }
    }

    Ok(ParsedResponse {
        text,
        context: Vec::new(),
        final_frame: None,
    })
}

/// Parse one line as a frame. Blank lines yield `None`.
fn parse_frame_line(line: &[u8]) -> Result<Option<StreamFrame>, InferenceError> {
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    serde_json::from_slice::<StreamFrame>(line)
        .map(Some)
        .map_err(|e| InferenceError::FrameParse {
            reason: e.to_string(),
            chunk: String::from_utf8_lossy(line).into_owned(),
        })
}

fn finish(text: String, frame: StreamFrame) -> ParsedResponse {
    ParsedResponse {
        text,
        context: frame.context.clone().unwrap_or_default(),
        final_frame: Some(frame),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
