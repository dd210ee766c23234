//! Shared types for the prompt client.
//!
//! These mirror the Ollama HTTP API types (`/api/chat`, `/api/generate`,
//! `/api/tags`), used for both request building and stream-frame parsing.

use serde::{Deserialize, Serialize};

// ─── Messages ───────────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the conversation transcript.
///
/// Messages are immutable once sent; the orchestrator derives rewritten
/// copies (see enrichment) rather than mutating a caller's transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Base64-encoded image attachments, for multimodal models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            images: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            images: None,
        }
    }
}

// ─── Sampling Options ───────────────────────────────────────────────────────

/// Model sampling options, all optional.
///
/// Persisted defaults (from the settings store) are overridden field-by-field
/// by per-call options — never whole-object replace. A field present only in
/// the defaults is still sent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

impl SamplingOptions {
    /// Sampling used for classifier-style calls: near-deterministic output.
    pub fn deterministic() -> Self {
        Self {
            temperature: Some(0.1),
            ..Default::default()
        }
    }

    /// Layer `self` over `defaults`, field by field. `self` wins on conflict.
    pub fn merged_over(&self, defaults: &SamplingOptions) -> SamplingOptions {
        SamplingOptions {
            temperature: self.temperature.or(defaults.temperature),
            top_k: self.top_k.or(defaults.top_k),
            top_p: self.top_p.or(defaults.top_p),
            seed: self.seed.or(defaults.seed),
            num_ctx: self.num_ctx.or(defaults.num_ctx),
        }
    }
}

// ─── Request Types ──────────────────────────────────────────────────────────

/// Forced output format. Ollama currently accepts only `"json"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptFormat {
    Json,
}

/// A structured chat request, before default-merging.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Constrain the model to structured output (grammar-enforced JSON).
    pub format: Option<PromptFormat>,
    /// Per-call sampling overrides, layered over the persisted defaults.
    pub options: Option<SamplingOptions>,
    /// How long the model stays loaded after the call, e.g. `"5m"`.
    pub keep_alive: Option<String>,
    /// Continuation context from a previous legacy completion-style call.
    pub context: Option<Vec<i64>>,
}

impl PromptRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            format: None,
            options: None,
            keep_alive: None,
            context: None,
        }
    }

    /// Request grammar-enforced JSON output at classifier temperature.
    pub fn json(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            format: Some(PromptFormat::Json),
            options: Some(SamplingOptions::deterministic()),
            ..Self::new(model, messages)
        }
    }
}

/// Wire body for `POST /api/chat`. Built by the client from a
/// [`PromptRequest`] plus the merged sampling options; streaming is
/// always requested.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<PromptFormat>,
    pub options: SamplingOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    pub stream: bool,
}

// ─── Stream Frames ──────────────────────────────────────────────────────────

/// The `message` object inside a chat-endpoint frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameMessage {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: String,
}

/// One JSON object parsed from one line of a streaming response body.
///
/// Partial frames (`done == false`) carry a text fragment in
/// `message.content` (chat endpoint) or `response` (legacy generate
/// endpoint). The single terminal frame (`done == true`) carries cumulative
/// token/timing statistics and, for legacy calls, a continuation `context`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<FrameMessage>,
    /// Legacy completion-style content fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    /// Continuation context — terminal frames of legacy calls only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    // Cumulative statistics, terminal frames only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
}

impl StreamFrame {
    /// The text fragment this frame contributes, regardless of endpoint style.
    pub fn content(&self) -> &str {
        if let Some(ref msg) = self.message {
            return &msg.content;
        }
        self.response.as_deref().unwrap_or("")
    }
}

/// Fully parsed streaming response.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    /// Accumulated text across all partial frames.
    pub text: String,
    /// Continuation context from the terminal frame (empty if absent).
    pub context: Vec<i64>,
    /// The terminal frame, when the stream carried one.
    pub final_frame: Option<StreamFrame>,
}

// ─── Model Listing ──────────────────────────────────────────────────────────

/// An installed model, from `GET /api/tags`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Wire response for `GET /api/tags`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelListResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_request_field_overrides_default() {
        let defaults = SamplingOptions {
            temperature: Some(0.8),
            top_k: Some(40),
            ..Default::default()
        };
        let per_call = SamplingOptions {
            temperature: Some(0.1),
            ..Default::default()
        };

        let merged = per_call.merged_over(&defaults);
        assert_eq!(merged.temperature, Some(0.1), "request field wins");
        assert_eq!(merged.top_k, Some(40), "defaults-only field still included");
    }

    #[test]
    fn merge_unspecified_falls_back() {
        let defaults = SamplingOptions {
            top_p: Some(0.9),
            seed: Some(7),
            num_ctx: Some(4096),
            ..Default::default()
        };
        let merged = SamplingOptions::default().merged_over(&defaults);
        assert_eq!(merged.top_p, Some(0.9));
        assert_eq!(merged.seed, Some(7));
        assert_eq!(merged.num_ctx, Some(4096));
        assert!(merged.temperature.is_none());
    }

    #[test]
    fn sampling_options_omit_none_fields() {
        let opts = SamplingOptions {
            temperature: Some(0.1),
            ..Default::default()
        };
        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("temperature"));
        assert!(!json.contains("top_k"), "unset fields are omitted");
    }

    #[test]
    fn frame_content_prefers_message() {
        let frame = StreamFrame {
            message: Some(FrameMessage {
                role: Some(Role::Assistant),
                content: "chat".into(),
            }),
            response: Some("generate".into()),
            ..Default::default()
        };
        assert_eq!(frame.content(), "chat");
    }

    #[test]
    fn frame_content_falls_back_to_response() {
        let frame = StreamFrame {
            response: Some("legacy".into()),
            ..Default::default()
        };
        assert_eq!(frame.content(), "legacy");
    }

    #[test]
    fn terminal_frame_deserializes_stats() {
        let line = r#"{"model":"llama3:latest","done":true,"context":[1,2,3],"total_duration":123,"eval_count":42,"eval_duration":99}"#;
        let frame: StreamFrame = serde_json::from_str(line).unwrap();
        assert!(frame.done);
        assert_eq!(frame.context.as_deref(), Some(&[1, 2, 3][..]));
        assert_eq!(frame.eval_count, Some(42));
        assert_eq!(frame.content(), "");
    }

    #[test]
    fn chat_body_serializes_format_and_stream() {
        let body = ChatRequestBody {
            model: "llama3:latest".into(),
            messages: vec![ChatMessage::user("hi")],
            format: Some(PromptFormat::Json),
            options: SamplingOptions::deterministic(),
            keep_alive: Some("5m".into()),
            context: None,
            stream: true,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"format\":\"json\""));
        assert!(json.contains("\"stream\":true"));
        assert!(json.contains("\"keep_alive\":\"5m\""));
        assert!(!json.contains("\"context\""));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
