//! Tool agents — capabilities that gather external information before the
//! model answers.
//!
//! An agent owns one retrieval task end to end (e.g. a web search) and hands
//! back extracted text for prompt enrichment. Agents are looked up by name in
//! a registry of factories; unknown names fail closed.

pub mod websearch;

pub use websearch::{PageFetcher, WebSearchAgent};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::inference::{ChatMessage, InferenceError, PromptClient};
use crate::notify::SharedSink;
use crate::retrieval::evaluator::ExchangeEvaluator;

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Errors produced by a tool agent run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("unable to retrieve search results")]
    NoResults,

    #[error("failed to parse search keywords: {reason}")]
    KeywordParse { reason: String, raw: String },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

// ─── Results ────────────────────────────────────────────────────────────────

/// One search result link: destination URL and its anchor text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLink {
    pub url: String,
    pub text: String,
}

/// Data retrieved by a successful agent run.
///
/// Created by the agent, consumed once by the orchestrator for prompt
/// enrichment, never retained.
#[derive(Debug, Clone)]
pub struct RetrievedData {
    /// Extracted page or digest text.
    pub data: String,
    /// The search links this data came from, when applicable.
    pub links: Option<Vec<SearchLink>>,
}

// ─── ToolAgent ──────────────────────────────────────────────────────────────

/// A capability that gathers external information for the current prompt.
#[async_trait]
pub trait ToolAgent: Send {
    fn name(&self) -> &str;

    /// Run the tool to completion. Errors terminate the current attempt's
    /// tool phase; the orchestrator does not catch and hide them.
    async fn run(&mut self) -> Result<RetrievedData, AgentError>;
}

/// Per-invocation construction parameters, shared by all agent kinds.
pub struct AgentParams {
    /// The conversation transcript. Agents use only the trailing user
    /// message to keep their queries focused.
    pub messages: Vec<ChatMessage>,
    pub notifier: SharedSink,
    pub evaluator: Arc<dyn ExchangeEvaluator>,
}

// ─── Registry ───────────────────────────────────────────────────────────────

/// Factory building one agent instance per invocation.
pub type AgentFactory = Arc<dyn Fn(AgentParams) -> Box<dyn ToolAgent> + Send + Sync>;

/// Mapping from tool name to factory. Lookups of unregistered names are an
/// explicit error — tool selection fails closed.
#[derive(Default)]
pub struct AgentRegistry {
    factories: HashMap<String, AgentFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: AgentFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build the named agent, or `None` if it isn't registered.
    pub fn create(&self, name: &str, params: AgentParams) -> Option<Box<dyn ToolAgent>> {
        self.factories.get(name).map(|factory| factory(params))
    }
}

/// The standard registry: the web-search agent under `"websearch"`.
pub fn default_registry(client: Arc<PromptClient>, model: impl Into<String>) -> AgentRegistry {
    let model = model.into();
    let mut registry = AgentRegistry::new();
    registry.register(
        "websearch",
        Arc::new(move |params: AgentParams| {
            Box::new(WebSearchAgent::new(client.clone(), model.clone(), params))
                as Box<dyn ToolAgent>
        }),
    );
    registry
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullSink;
    use crate::retrieval::evaluator::Verdict;

    struct YesEvaluator;

    #[async_trait]
    impl ExchangeEvaluator for YesEvaluator {
        async fn evaluate_answer(&self, _messages: &[ChatMessage]) -> Verdict {
            Verdict::Judged {
                satisfied: true,
                reason: String::new(),
            }
        }

        async fn evaluate_data(&self, _messages: &[ChatMessage], _data: &str) -> Verdict {
            Verdict::Judged {
                satisfied: true,
                reason: String::new(),
            }
        }
    }

    struct StaticAgent;

    #[async_trait]
    impl ToolAgent for StaticAgent {
        fn name(&self) -> &str {
            "static"
        }

        async fn run(&mut self) -> Result<RetrievedData, AgentError> {
            Ok(RetrievedData {
                data: "canned".into(),
                links: None,
            })
        }
    }

    fn params() -> AgentParams {
        AgentParams {
            messages: vec![ChatMessage::user("hello")],
            notifier: Arc::new(NullSink),
            evaluator: Arc::new(YesEvaluator),
        }
    }

    #[test]
    fn unregistered_name_fails_closed() {
        let registry = AgentRegistry::new();
        assert!(!registry.contains("websearch"));
        assert!(registry.create("websearch", params()).is_none());
    }

    #[tokio::test]
    async fn registered_factory_builds_agent() {
        let mut registry = AgentRegistry::new();
        registry.register("static", Arc::new(|_| Box::new(StaticAgent) as Box<dyn ToolAgent>));

        let mut agent = registry.create("static", params()).unwrap();
        assert_eq!(agent.name(), "static");
        assert_eq!(agent.run().await.unwrap().data, "canned");
    }
}
