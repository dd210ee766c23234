//! Error types for the retrieval loop.

use thiserror::Error;

use crate::agents::AgentError;
use crate::inference::InferenceError;

/// Errors surfaced by the retrieval orchestrator.
///
/// Exhausting the attempt budget is NOT represented here: the loop then
/// returns the last generated text as a best-effort answer. Only the
/// wall-clock timeout and configuration problems are hard failures.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("timeout exceeded ({seconds} seconds)")]
    Timeout { seconds: u64 },

    #[error("no user message found")]
    NoUserMessage,

    #[error("invalid tool selection: {name}")]
    UnknownTool { name: String },

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let err = RetrievalError::Timeout { seconds: 30 };
        assert_eq!(err.to_string(), "timeout exceeded (30 seconds)");

        let err = RetrievalError::UnknownTool {
            name: "calculator".into(),
        };
        assert_eq!(err.to_string(), "invalid tool selection: calculator");
    }
}
