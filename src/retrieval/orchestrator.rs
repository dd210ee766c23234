//! Retrieval orchestrator — the decide → tool → generate → evaluate loop.
//!
//! One invocation handles one user prompt: it routes an optional tool from
//! the trailing user message, enriches the prompt with retrieved data,
//! generates an answer, and self-evaluates the result. Negative verdicts
//! retry the whole cycle on the original message list up to the attempt
//! budget; a wall-clock budget checked at the top of each attempt aborts
//! the call outright.
//!
//! Exhausting attempts is not an error — the last generated text is returned
//! as a best-effort answer. Only the timeout is a hard failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::errors::RetrievalError;
use super::evaluator::ExchangeEvaluator;
use crate::agents::{AgentParams, AgentRegistry};
use crate::inference::{
    parse_chat_stream, ChatMessage, PromptClient, PromptRequest, RequestOptions, Role,
    SamplingOptions, StreamFrame,
};
use crate::notify::{Notification, SharedSink};

// ─── Defaults ────────────────────────────────────────────────────────────────

/// Attempt budget for the retry loop.
pub const DEFAULT_QUERY_ATTEMPTS: u32 = 3;

/// Wall-clock budget for one `handle_prompt` call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Generation seam ─────────────────────────────────────────────────────────

/// A generated candidate answer plus the terminal frame's statistics.
#[derive(Debug, Clone, Default)]
pub struct GeneratedAnswer {
    pub text: String,
    pub stats: Option<StreamFrame>,
}

/// Live-update callback fed the running answer text as tokens arrive.
pub type Updater = Arc<dyn Fn(&str) + Send + Sync>;

/// Answer generation seam. Mocked in loop tests; [`ChatGenerator`] is the
/// real client-backed implementation.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate one candidate answer for the message list. When `live` is
    /// set, partial tokens are forwarded to the caller's updater.
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        live: bool,
    ) -> Result<GeneratedAnswer, RetrievalError>;
}

/// Generator backed by the prompt client and stream parser.
pub struct ChatGenerator {
    client: Arc<PromptClient>,
    model: String,
    options: Option<SamplingOptions>,
    updater: Option<Updater>,
    cancel: Option<CancellationToken>,
}

impl ChatGenerator {
    pub fn new(client: Arc<PromptClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            options: None,
            updater: None,
            cancel: None,
        }
    }

    /// Per-call sampling overrides, layered over the persisted defaults.
    pub fn with_options(mut self, options: SamplingOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Callback receiving the running answer text as tokens arrive.
    pub fn with_updater(mut self, updater: Updater) -> Self {
        self.updater = Some(updater);
        self
    }

    /// Token aborting the in-flight generation call when cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[async_trait]
impl AnswerGenerator for ChatGenerator {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        live: bool,
    ) -> Result<GeneratedAnswer, RetrievalError> {
        let mut request = PromptRequest::new(self.model.clone(), messages);
        request.options = self.options;

        let opts = RequestOptions {
            cancel: self.cancel.clone(),
        };
        let stream = self.client.send_prompt(request, opts).await?;

        let parsed = match (live, &self.updater) {
            (true, Some(updater)) => {
                let mut forward = |text: &str| updater(text);
                parse_chat_stream(stream, Some(&mut forward)).await?
            }
            _ => parse_chat_stream(stream, None).await?,
        };

        Ok(GeneratedAnswer {
            text: parsed.text,
            stats: parsed.final_frame,
        })
    }
}

// ─── Routing ─────────────────────────────────────────────────────────────────

/// Inspect the trailing user message for a routing marker: a leading
/// slash-command token like `/websearch`. No marker means no tool.
///
/// A transcript without any user message is a caller error, fatal and
/// never retried.
pub(crate) fn route_tool(messages: &[ChatMessage]) -> Result<Option<String>, RetrievalError> {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .ok_or(RetrievalError::NoUserMessage)?;

    let content = last_user.content.trim_start();
    let Some(rest) = content.strip_prefix('/') else {
        return Ok(None);
    };

    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    if name.is_empty() {
        return Ok(None);
    }
    Ok(Some(name))
}

/// Rewrite the trailing user message to carry the retrieved data.
///
/// Works on a cloned list — the caller's transcript is never mutated — and
/// appends the current date/time plus the tool output to the message text.
/// Enrichment is rebuilt from the original list on every attempt, so it is
/// not cumulative across retries.
pub(crate) fn enrich_prompt(messages: &[ChatMessage], data: &str) -> Vec<ChatMessage> {
    let mut enriched = messages.to_vec();
    let Some(index) = enriched.iter().rposition(|m| m.role == Role::User) else {
        return enriched;
    };

    let now = chrono::Local::now().to_rfc2822();
    enriched[index].content = format!(
        "{}\nPotentially relevant data:\nCurrent date and time: {}\nRetrieved data: {}",
        enriched[index].content, now, data
    );
    enriched
}

// ─── RetrievalService ────────────────────────────────────────────────────────

/// Top-level control loop for one conversation turn.
pub struct RetrievalService {
    generator: Arc<dyn AnswerGenerator>,
    evaluator: Arc<dyn ExchangeEvaluator>,
    registry: AgentRegistry,
    notifier: SharedSink,
    max_attempts: u32,
    timeout: Duration,
}

/// What a finished loop hands back to the caller: the accepted (or
/// best-effort) answer text, the last terminal frame's statistics, and how
/// many attempts the answer took. An outcome with `attempts` equal to the
/// budget was accepted by exhaustion, not by a positive verdict.
/// Persistence is the caller's job.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub text: String,
    pub stats: Option<StreamFrame>,
    pub attempts: u32,
}

impl RetrievalService {
    pub fn new(
        generator: Arc<dyn AnswerGenerator>,
        evaluator: Arc<dyn ExchangeEvaluator>,
        registry: AgentRegistry,
        notifier: SharedSink,
    ) -> Self {
        Self {
            generator,
            evaluator,
            registry,
            notifier,
            max_attempts: DEFAULT_QUERY_ATTEMPTS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply the attempt and timeout budgets from the loaded configuration.
    pub fn with_config(self, config: &crate::inference::GollamaConfig) -> Self {
        self.with_max_attempts(config.query_attempts)
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    /// Run the retry/evaluate loop for one prompt.
    ///
    /// The timeout is cooperative: it is checked at the top of each attempt,
    /// so a slow generation call can overshoot the budget by its own
    /// duration. Sub-steps within an attempt are strictly sequential.
    pub async fn handle_prompt(
        &self,
        messages: &[ChatMessage],
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let start = Instant::now();
        let mut attempts: u32 = 0;
        let mut outcome = RetrievalOutcome::default();

        while attempts < self.max_attempts {
            if start.elapsed() >= self.timeout {
                return Err(RetrievalError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }

            tracing::info!(attempt = attempts + 1, "starting retrieval attempt");

            let tool = route_tool(messages)?;
            let answer = match tool {
                Some(name) => {
                    let retrieved = self.invoke_tool(&name, messages).await?;
                    let enriched = enrich_prompt(messages, &retrieved.data);
                    self.notifier
                        .notify(Notification::info("", "Answering based on data..."));
                    self.generator.generate(enriched, true).await?
                }
                None => self.generator.generate(messages.to_vec(), true).await?,
            };

            outcome = RetrievalOutcome {
                text: answer.text,
                stats: answer.stats,
                attempts: attempts + 1,
            };

            let exchange = self.trailing_exchange(messages, &outcome.text);
            let verdict = self.evaluator.evaluate_answer(&exchange).await;
            tracing::info!(attempt = attempts + 1, satisfied = verdict.is_satisfied(), "attempt evaluated");
            if verdict.is_satisfied() {
                return Ok(outcome);
            }

            attempts += 1;
        }

        // Attempt budget exhausted: hand back the last answer rather than
        // failing the call.
        Ok(outcome)
    }

    /// Build and run the named tool. Unregistered names are a configuration
    /// error; the agent's own failures propagate untouched.
    async fn invoke_tool(
        &self,
        name: &str,
        messages: &[ChatMessage],
    ) -> Result<crate::agents::RetrievedData, RetrievalError> {
        let params = AgentParams {
            messages: messages.to_vec(),
            notifier: self.notifier.clone(),
            evaluator: self.evaluator.clone(),
        };
        let mut agent = self
            .registry
            .create(name, params)
            .ok_or_else(|| RetrievalError::UnknownTool {
                name: name.to_string(),
            })?;

        Ok(agent.run().await?)
    }

    /// The pair judged by the adequacy check: last user message + answer.
    fn trailing_exchange(&self, messages: &[ChatMessage], answer: &str) -> Vec<ChatMessage> {
        let mut exchange: Vec<ChatMessage> = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .cloned()
            .into_iter()
            .collect();
        exchange.push(ChatMessage::assistant(answer));
        exchange
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
