//! Prompt Client — Ollama-compatible API client for local model inference.
//!
//! This module handles all communication with the local model server:
//! - Streaming chat requests (`/api/chat`)
//! - Newline-delimited JSON frame parsing
//! - Sampling default merging (persisted settings under per-call options)
//! - Cooperative request cancellation
//! - Model listing (`/api/tags`) and configuration loading from `gollama.yaml`

pub mod client;
pub mod config;
pub mod errors;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::{PromptClient, RequestOptions};
pub use config::GollamaConfig;
pub use errors::InferenceError;
pub use streaming::{parse_chat_stream, ByteStream};
pub use types::{
    ChatMessage, ParsedResponse, PromptFormat, PromptRequest, Role, SamplingOptions, StreamFrame,
};
