//! HTTP client for the local model server.
//!
//! Sends chat requests to an Ollama-compatible endpoint and returns the raw
//! byte stream for the frame parser. Persisted sampling defaults are merged
//! under per-call options before every request.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client as HttpClient;
use tokio_util::sync::CancellationToken;

use super::config::GollamaConfig;
use super::errors::InferenceError;
use super::streaming::{parse_chat_stream, ByteStream};
use super::types::{
    ChatRequestBody, ModelInfo, ModelListResponse, ParsedResponse, PromptRequest,
};
use crate::store::SettingsStore;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout for non-streaming calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Total request timeout for streaming calls.
///
/// A cold model has to load before the first token, and large contexts take
/// a while to prefill. A 30s cap here kills streams that were going to
/// finish fine.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// ─── Request Options ────────────────────────────────────────────────────────

/// Per-call transport options.
#[derive(Default)]
pub struct RequestOptions {
    /// When set, cancelling the token aborts the in-flight request; the
    /// returned stream then yields [`InferenceError::Aborted`].
    pub cancel: Option<CancellationToken>,
}

// ─── PromptClient ────────────────────────────────────────────────────────────

/// Client for the local model server (`/api/chat`, `/api/tags`).
///
/// Holds the host URL, the fallback keep-alive value, and a handle to the
/// settings store so persisted sampling defaults apply to every request.
pub struct PromptClient {
    /// HTTP client for non-streaming requests (30s timeout).
    http: HttpClient,
    /// HTTP client for streaming requests (180s timeout).
    http_stream: HttpClient,
    /// Server base URL, e.g. `http://localhost:11434`.
    host: String,
    /// Keep-alive used when a request doesn't set one.
    keep_alive: Option<String>,
    /// Persisted sampling defaults.
    settings: Arc<dyn SettingsStore>,
}

impl PromptClient {
    /// Create a client from the loaded configuration.
    ///
    /// Does NOT check connectivity — that happens on the first request.
    pub fn new(
        config: &GollamaConfig,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.host.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_stream = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(STREAM_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.host.clone(),
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            http_stream,
            host: config.host.clone(),
            keep_alive: config.keep_alive.clone(),
            settings,
        })
    }

    /// The base URL of the model server.
    pub fn host(&self) -> &str {
        &self.host
    }

    // ─── Chat ─────────────────────────────────────────────────────────────

    /// Send a chat request and return the raw streaming body.
    ///
    /// The request's sampling options are layered over the persisted
    /// defaults field by field before sending. The returned stream is
    /// consumed by [`parse_chat_stream`]; callers that just want the final
    /// text use [`complete`](Self::complete).
    pub async fn send_prompt(
        &self,
        request: PromptRequest,
        opts: RequestOptions,
    ) -> Result<ByteStream, InferenceError> {
        let url = format!("{}/api/chat", self.host);
        let body = self.build_body(request);

        // Log request metadata, not the message contents.
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            format = ?body.format,
            "sending chat request"
        );

        let pending = self.http_stream.post(&url).json(&body).send();

        let response = match opts.cancel {
            Some(ref token) => tokio::select! {
                _ = token.cancelled() => return Err(InferenceError::Aborted),
                resp = pending => resp,
            },
            None => pending.await,
        }
        .map_err(|e| self.map_send_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let bytes = response
            .bytes_stream()
            .map(|r| {
                r.map_err(|e| InferenceError::StreamError {
                    reason: e.to_string(),
                })
            })
            .boxed();

        Ok(match opts.cancel {
            Some(token) => cancellable(bytes, token),
            None => bytes,
        })
    }

    /// Send a chat request and parse the whole response, no token callback.
    ///
    /// Used for classifier-style calls (evaluation, keyword extraction)
    /// where only the final text matters.
    pub async fn complete(
        &self,
        request: PromptRequest,
    ) -> Result<ParsedResponse, InferenceError> {
        let stream = self.send_prompt(request, RequestOptions::default()).await?;
        parse_chat_stream(stream, None).await
    }

    /// Build the wire body: merge persisted defaults under the request's
    /// options, fall back to the client keep-alive.
    fn build_body(&self, request: PromptRequest) -> ChatRequestBody {
        let defaults = self.settings.default_sampling();
        let options = request.options.unwrap_or_default().merged_over(&defaults);

        ChatRequestBody {
            model: request.model,
            messages: request.messages,
            format: request.format,
            options,
            keep_alive: request.keep_alive.or_else(|| self.keep_alive.clone()),
            context: request.context,
            stream: true,
        }
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout {
                duration_secs: STREAM_REQUEST_TIMEOUT.as_secs(),
            }
        } else {
            InferenceError::ConnectionFailed {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }
        }
    }

    // ─── Models ───────────────────────────────────────────────────────────

    /// List the models installed on the server (`GET /api/tags`).
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, InferenceError> {
        let url = format!("{}/api/tags", self.host);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let listing: ModelListResponse =
            response
                .json()
                .await
                .map_err(|e| InferenceError::StreamError {
                    reason: format!("failed to decode model listing: {e}"),
                })?;
        Ok(listing.models)
    }

    /// Check whether the server is reachable. Does not load a model.
    pub async fn health_check(&self) -> bool {
        match self.http.get(&self.host).timeout(CONNECT_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

// ─── Cancellation ────────────────────────────────────────────────────────────

/// Wrap a byte stream so that cancelling the token ends it with a single
/// [`InferenceError::Aborted`] item. The underlying connection drops when
/// the inner stream does.
fn cancellable(inner: ByteStream, token: CancellationToken) -> ByteStream {
    futures::stream::unfold(
        (inner, token, false),
        |(mut inner, token, finished)| async move {
            if finished {
                return None;
            }
            tokio::select! {
                _ = token.cancelled() => {
                    Some((Err(InferenceError::Aborted), (inner, token, true)))
                }
                next = inner.next() => {
                    next.map(|item| (item, (inner, token, false)))
                }
            }
        },
    )
    .boxed()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::{ChatMessage, SamplingOptions};
    use crate::store::MemorySettings;
    use bytes::Bytes;

    fn test_client(defaults: SamplingOptions) -> PromptClient {
        let config = GollamaConfig {
            host: "http://localhost:11434".into(),
            keep_alive: Some("5m".into()),
            ..Default::default()
        };
        PromptClient::new(&config, Arc::new(MemorySettings::new(defaults))).unwrap()
    }

    #[test]
    fn build_body_merges_defaults_under_request_options() {
        let client = test_client(SamplingOptions {
            temperature: Some(0.8),
            top_k: Some(40),
            ..Default::default()
        });

        let mut request =
            PromptRequest::new("llama3:latest", vec![ChatMessage::user("hi")]);
        request.options = Some(SamplingOptions {
            temperature: Some(0.1),
            ..Default::default()
        });

        let body = client.build_body(request);
        assert_eq!(body.options.temperature, Some(0.1), "request wins");
        assert_eq!(body.options.top_k, Some(40), "defaults fill the gaps");
        assert!(body.stream);
    }

    #[test]
    fn build_body_uses_defaults_when_request_has_no_options() {
        let client = test_client(SamplingOptions {
            num_ctx: Some(4096),
            ..Default::default()
        });
        let request = PromptRequest::new("llama3:latest", vec![ChatMessage::user("hi")]);
        let body = client.build_body(request);
        assert_eq!(body.options.num_ctx, Some(4096));
    }

    #[test]
    fn build_body_keep_alive_falls_back_to_client_default() {
        let client = test_client(SamplingOptions::default());

        let request = PromptRequest::new("llama3:latest", vec![]);
        assert_eq!(client.build_body(request).keep_alive.as_deref(), Some("5m"));

        let mut request = PromptRequest::new("llama3:latest", vec![]);
        request.keep_alive = Some("0".into());
        assert_eq!(client.build_body(request).keep_alive.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn cancellable_stream_yields_aborted_on_cancel() {
        let inner: ByteStream = futures::stream::pending().boxed();
        let token = CancellationToken::new();
        let mut wrapped = cancellable(inner, token.clone());

        token.cancel();
        let first = wrapped.next().await.unwrap();
        assert!(matches!(first, Err(InferenceError::Aborted)));
        assert!(wrapped.next().await.is_none(), "stream ends after abort");
    }

    #[tokio::test]
    async fn cancellable_stream_passes_items_through() {
        let inner: ByteStream =
            futures::stream::iter(vec![Ok(Bytes::from_static(b"abc"))]).boxed();
        let mut wrapped = cancellable(inner, CancellationToken::new());

        let first = wrapped.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"abc");
        assert!(wrapped.next().await.is_none());
    }
}
