//! Quality evaluator — JSON-classifier model calls.
//!
//! Two independent single-shot classifiers, both constrained to JSON output
//! at low temperature: "does this answer address the question" and "is this
//! retrieved data usable for this question". Malformed classifier output
//! degrades to an unparsed verdict; it never propagates as an error, and the
//! loop treats it as "not satisfied".

use std::sync::Arc;

use async_trait::async_trait;

use crate::inference::{ChatMessage, InferenceError, PromptClient, PromptRequest};
use crate::notify::{Notification, SharedSink};

// ─── Verdict ────────────────────────────────────────────────────────────────

/// Outcome of one classifier call.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The classifier produced well-formed JSON with the expected boolean.
    Judged { satisfied: bool, reason: String },
    /// The classifier output could not be parsed; the raw text is kept for
    /// diagnostics. Interpreted downstream as "not satisfied".
    Unparsed { error: String, raw: String },
}

impl Verdict {
    /// Whether this verdict counts as a pass. Unknown is a fail: the loop
    /// retries rather than blindly accepting.
    pub fn is_satisfied(&self) -> bool {
        matches!(
            self,
            Verdict::Judged {
                satisfied: true,
                ..
            }
        )
    }
}

/// Extract a boolean verdict from raw classifier output.
///
/// `field` names the expected boolean key (`"answered"` or `"usable"`).
/// A missing or non-boolean field is an unparsed verdict, same as invalid
/// JSON.
pub(crate) fn parse_verdict(raw: &str, field: &str) -> Verdict {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            return Verdict::Unparsed {
                error: e.to_string(),
                raw: raw.to_string(),
            }
        }
    };

    match value.get(field).and_then(|v| v.as_bool()) {
        Some(satisfied) => Verdict::Judged {
            satisfied,
            reason: value
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        None => Verdict::Unparsed {
            error: format!("missing boolean field '{field}'"),
            raw: raw.to_string(),
        },
    }
}

// ─── ExchangeEvaluator ──────────────────────────────────────────────────────

/// Classifier seam between the orchestrator/agents and the model.
///
/// Mocked in loop tests; [`ModelEvaluator`] is the real implementation.
#[async_trait]
pub trait ExchangeEvaluator: Send + Sync {
    /// Does the trailing assistant answer adequately address the user's
    /// question? `messages` is the exchange to judge (last user message plus
    /// the candidate answer).
    async fn evaluate_answer(&self, messages: &[ChatMessage]) -> Verdict;

    /// Does `data` (retrieved page text) contain information that helps
    /// answer the conversation's question?
    async fn evaluate_data(&self, messages: &[ChatMessage], data: &str) -> Verdict;
}

// ─── ModelEvaluator ─────────────────────────────────────────────────────────

const ANSWER_SYSTEM_PROMPT: &str = "Evaluate the response of the assistant; determine if the response adequately answers the user's question.\nProvide a verdict of true or false, responding with a simple JSON object with the following format:\n{\"answered\": boolean, \"reason\": \"a single sentence explaining why this verdict was given\"}";

const ANSWER_INSTRUCTION: &str = "Did the assistant's response adequately answer or address the user's question?\nProvide a verdict of true or false, responding with a simple JSON object with the following format:\n{\"answered\": boolean, \"reason\": \"a single sentence explaining why this verdict was given\"}\nDo not include any other commentary or output, just return the JSON.";

const DATA_SYSTEM_PROMPT: &str = "Based on the conversation, does the data provided contain information to help answer the user's question?\nProvide a verdict of true or false, responding with a simple JSON object with the following format:\n{\"usable\": boolean, \"reason\": \"a single sentence explaining why this verdict was given\"}";

const DATA_INSTRUCTION: &str = "Based on the conversation, does the data provided contain information to help answer the question above?\nProvide a verdict of true or false, responding with a simple JSON object with the following format:\n{\"usable\": boolean, \"reason\": \"a single sentence explaining why this verdict was given\"}";

/// Evaluator backed by classifier calls against the model server.
pub struct ModelEvaluator {
    client: Arc<PromptClient>,
    model: String,
    notifier: SharedSink,
}

impl ModelEvaluator {
    pub fn new(client: Arc<PromptClient>, model: impl Into<String>, notifier: SharedSink) -> Self {
        Self {
            client,
            model: model.into(),
            notifier,
        }
    }

    async fn classify(
        &self,
        messages: Vec<ChatMessage>,
        field: &str,
    ) -> Result<Verdict, InferenceError> {
        let request = PromptRequest::json(self.model.clone(), messages);
        let parsed = self.client.complete(request).await?;
        Ok(parse_verdict(&parsed.text, field))
    }
}

#[async_trait]
impl ExchangeEvaluator for ModelEvaluator {
    async fn evaluate_answer(&self, messages: &[ChatMessage]) -> Verdict {
        self.notifier.notify(Notification::info("", "Sanity check..."));

        let mut convo = vec![ChatMessage::system(ANSWER_SYSTEM_PROMPT)];
        convo.extend_from_slice(messages);
        convo.push(ChatMessage::user(ANSWER_INSTRUCTION));

        match self.classify(convo, "answered").await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "answer evaluation call failed");
                Verdict::Unparsed {
                    error: e.to_string(),
                    raw: String::new(),
                }
            }
        }
    }

    async fn evaluate_data(&self, messages: &[ChatMessage], data: &str) -> Verdict {
        self.notifier
            .notify(Notification::info("", "Evaluating data..."));

        let mut convo = vec![ChatMessage::system(DATA_SYSTEM_PROMPT)];
        convo.extend_from_slice(messages);
        convo.push(ChatMessage::user(DATA_INSTRUCTION));
        convo.push(ChatMessage::user(format!("This is the data:\n{data}")));

        match self.classify(convo, "usable").await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "data evaluation call failed");
                Verdict::Unparsed {
                    error: e.to_string(),
                    raw: String::new(),
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_verdict_has_both_fields() {
        let verdict = parse_verdict(
            r#"{"answered": true, "reason": "the capital is named"}"#,
            "answered",
        );
        assert_eq!(
            verdict,
            Verdict::Judged {
                satisfied: true,
                reason: "the capital is named".into()
            }
        );
        assert!(verdict.is_satisfied());
    }

    #[test]
    fn negative_verdict_is_not_satisfied() {
        let verdict = parse_verdict(r#"{"usable": false, "reason": "off topic"}"#, "usable");
        assert!(!verdict.is_satisfied());
        assert!(matches!(verdict, Verdict::Judged { satisfied: false, .. }));
    }

    #[test]
    fn malformed_json_degrades_to_unparsed() {
        let verdict = parse_verdict("I think the answer is fine!", "answered");
        match verdict {
            Verdict::Unparsed { raw, .. } => {
                assert_eq!(raw, "I think the answer is fine!");
            }
            other => panic!("expected Unparsed, got {other:?}"),
        }
    }

    #[test]
    fn missing_boolean_field_degrades_to_unparsed() {
        let verdict = parse_verdict(r#"{"reason": "no verdict given"}"#, "answered");
        assert!(!verdict.is_satisfied());
        assert!(matches!(verdict, Verdict::Unparsed { .. }));
    }

    #[test]
    fn wrong_field_type_degrades_to_unparsed() {
        let verdict = parse_verdict(r#"{"answered": "yes"}"#, "answered");
        assert!(matches!(verdict, Verdict::Unparsed { .. }));
    }

    #[test]
    fn missing_reason_defaults_to_empty() {
        let verdict = parse_verdict(r#"{"usable": true}"#, "usable");
        assert_eq!(
            verdict,
            Verdict::Judged {
                satisfied: true,
                reason: String::new()
            }
        );
    }
}
