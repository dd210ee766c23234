//! Retrieval — the tool-augmented answer pipeline.
//!
//! Decides whether a user message needs an external tool, runs it, enriches
//! the prompt with the retrieved data, generates an answer, and self-evaluates
//! whether the answer actually addresses the question — retrying with a
//! bounded attempt budget and a cooperative wall-clock timeout.

pub mod errors;
pub mod evaluator;
pub mod orchestrator;

pub use errors::RetrievalError;
pub use evaluator::{ExchangeEvaluator, ModelEvaluator, Verdict};
pub use orchestrator::{
    AnswerGenerator, ChatGenerator, GeneratedAnswer, RetrievalOutcome, RetrievalService,
    DEFAULT_QUERY_ATTEMPTS, DEFAULT_TIMEOUT,
};
