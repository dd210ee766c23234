//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility — these types carry the context needed to
//! build meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to the model server.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("request timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The caller's cancellation signal fired before or during the stream.
    ///
    /// Distinct from end-of-stream: an aborted stream fails the in-flight
    /// generation loudly instead of silently truncating the answer.
    #[error("request aborted by caller")]
    Aborted,

    /// The byte stream errored mid-read (connection reset, decode failure).
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// A streamed line failed to parse as a JSON frame.
    ///
    /// Fatal for the generation call it belongs to — retry is the
    /// orchestrator's decision, not the parser's. The offending chunk is
    /// retained for diagnostics.
    #[error("frame parse error: {reason}")]
    FrameParse { reason: String, chunk: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = InferenceError::ConnectionFailed {
            endpoint: "http://localhost:11434".into(),
            reason: "refused".into(),
        };
        assert!(e.to_string().contains("localhost:11434"));

        let e = InferenceError::FrameParse {
            reason: "expected value".into(),
            chunk: "{broken".into(),
        };
        assert!(e.to_string().contains("frame parse error"));
    }

    #[test]
    fn frame_parse_retains_chunk() {
        let e = InferenceError::FrameParse {
            reason: "eof".into(),
            chunk: "{\"done\"".into(),
        };
        match e {
            InferenceError::FrameParse { chunk, .. } => assert_eq!(chunk, "{\"done\""),
            _ => unreachable!(),
        }
    }
}
