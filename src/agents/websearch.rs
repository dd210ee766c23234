//! Web-search agent.
//!
//! Three phases: extract search keywords from the trailing user message via
//! a JSON-only classifier call, query the search endpoint for candidate
//! links, then visit candidates one by one until the evaluator judges a
//! page's text usable. Result-page extraction is best-effort; a layout
//! change degrades to "no results", it is not a parser to harden.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Node, Selector};
use serde::Deserialize;
use url::Url;

use super::{AgentError, AgentParams, RetrievedData, SearchLink, ToolAgent};
use crate::inference::{ChatMessage, PromptClient, PromptRequest, Role};
use crate::notify::{Notification, SharedSink};
use crate::retrieval::evaluator::ExchangeEvaluator;
use crate::text::{collapse_whitespace, truncate_utf8};

// ─── Constants ───────────────────────────────────────────────────────────────

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

const REFERER: &str = "https://html.duckduckgo.com/html/";

/// The search endpoint serves a captcha page to non-browser user agents.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Byte cap on the raw-text digest built from the results page.
const DIGEST_CAP: usize = 10_000;

/// How many candidate pages to visit before giving up on finding a usable one.
const PAGE_ATTEMPTS: usize = 4;

/// How much of a URL to show in progress notifications.
const URL_PREVIEW_LEN: usize = 24;

const KEYWORD_SYSTEM_PROMPT: &str = "Your job is to extract and return the keywords that should be used to search the web in order to answer the user's query. Return a JSON object containing the keywords in the following format: {\"keywords\": \"the search term\"}\nReturn only the JSON. Include no other text or commentary.";

const KEYWORD_INSTRUCTION: &str = "Provide the search term I should use to find this information on the web. Return JSON in the format: {\"keywords\": \"the search term\"}\nReturn no other text or commentary.";

#[derive(Deserialize)]
struct KeywordReply {
    keywords: String,
}

/// Parsed search results page.
struct SearchResults {
    links: Vec<SearchLink>,
    /// Raw-text digest of the whole results page, capped at [`DIGEST_CAP`].
    digest: String,
}

// ─── Page fetching ───────────────────────────────────────────────────────────

/// Fetches a URL and returns the response body as text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, AgentError>;
}

/// Production fetcher: browser-shaped `reqwest` client with a referer header.
struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client");
        Self { http }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, AgentError> {
        let response = self
            .http
            .get(url)
            .header("referer", REFERER)
            .send()
            .await
            .map_err(|e| AgentError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        response.text().await.map_err(|e| AgentError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

// ─── WebSearchAgent ──────────────────────────────────────────────────────────

/// Agent that answers a question by searching the web and reading results.
pub struct WebSearchAgent {
    client: Arc<PromptClient>,
    model: String,
    /// Only the trailing user message: prior turns are excluded to keep the
    /// search query focused.
    messages: Vec<ChatMessage>,
    notifier: SharedSink,
    evaluator: Arc<dyn ExchangeEvaluator>,
    fetcher: Arc<dyn PageFetcher>,
}

impl WebSearchAgent {
    pub fn new(client: Arc<PromptClient>, model: String, params: AgentParams) -> Self {
        let messages = params
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .cloned()
            .into_iter()
            .collect();

        Self {
            client,
            model,
            messages,
            notifier: params.notifier,
            evaluator: params.evaluator,
            fetcher: Arc::new(HttpFetcher::new()),
        }
    }

    /// Swap the page fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    fn notify(&self, message: impl Into<String>) {
        self.notifier
            .notify(Notification::info("WebSearch", message));
    }

    fn notify_danger(&self, message: impl Into<String>) {
        self.notifier
            .notify(Notification::danger("WebSearch", message));
    }

    // ─── Keyword extraction ───────────────────────────────────────────────

    /// Ask the model for a search term covering the trailing user message.
    async fn extract_keywords(&self) -> Result<String, AgentError> {
        let mut convo = vec![ChatMessage::system(KEYWORD_SYSTEM_PROMPT)];
        convo.extend_from_slice(&self.messages);
        convo.push(ChatMessage::user(KEYWORD_INSTRUCTION));

        let request = PromptRequest::json(self.model.clone(), convo);
        let parsed = self.client.complete(request).await?;

        let reply: KeywordReply =
            serde_json::from_str(&parsed.text).map_err(|e| AgentError::KeywordParse {
                reason: e.to_string(),
                raw: parsed.text.clone(),
            })?;
        Ok(reply.keywords)
    }

    // ─── Search ───────────────────────────────────────────────────────────

    /// Submit the search term and parse the results page.
    async fn search(&self, term: &str) -> Result<SearchResults, AgentError> {
        let query = normalize_query(term);
        let url = format!("{SEARCH_ENDPOINT}?q={query}");
        tracing::info!(term, "searching");

        let html = self.fetcher.fetch_text(&url).await?;
        Ok(parse_search_page(&html))
    }

    // ─── Page evaluation loop ─────────────────────────────────────────────

    /// Visit candidate links until the evaluator judges one usable.
    ///
    /// Bounded to [`PAGE_ATTEMPTS`] visits. Exhausting the bound returns the
    /// last visited page regardless of verdict — callers treat an
    /// unusable-but-returned result as a soft failure.
    async fn check_results(&mut self, results: SearchResults) -> Result<RetrievedData, AgentError> {
        let mut last: Option<String> = None;
        let mut last_error: Option<AgentError> = None;

        for link in results.links.iter().take(PAGE_ATTEMPTS) {
            let page = match self.visit(&link.url).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(url = %link.url, error = %e, "page fetch failed");
                    last_error = Some(e);
                    continue;
                }
            };

            let verdict = self.evaluator.evaluate_data(&self.messages, &page).await;
            let usable = verdict.is_satisfied();
            last = Some(page);
            if usable {
                break;
            }
        }

        self.notify("Handing over data...");
        match last {
            Some(data) => Ok(RetrievedData {
                data,
                links: Some(results.links),
            }),
            // Every visit failed: fall back to the results-page digest when
            // there is one, otherwise surface the last fetch error.
            None if !results.digest.is_empty() => Ok(RetrievedData {
                data: results.digest,
                links: Some(results.links),
            }),
            None => Err(last_error.unwrap_or(AgentError::NoResults)),
        }
    }

    /// Fetch one candidate page and extract its visible text.
    async fn visit(&self, url: &str) -> Result<String, AgentError> {
        self.notify(format!("Visiting {}", preview_url(url)));

        let html = self.fetcher.fetch_text(url).await.map_err(|e| {
            self.notify_danger(format!("Failed visiting {}", preview_url(url)));
            e
        })?;

        self.notify("Got data from website");
        Ok(visible_text(&html))
    }
}

#[async_trait]
impl ToolAgent for WebSearchAgent {
    fn name(&self) -> &str {
        "websearch"
    }

    async fn run(&mut self) -> Result<RetrievedData, AgentError> {
        self.notify("Running web search");

        let keywords = self.extract_keywords().await?;
        let results = self.search(&keywords).await?;
        self.notify("Got search results");

        if results.links.is_empty() {
            self.notify_danger("Couldn't retrieve search results");
            return Err(AgentError::NoResults);
        }

        self.check_results(results).await
    }
}

// ─── HTML extraction ─────────────────────────────────────────────────────────

/// Percent-encode the search term, joining whitespace runs with `+`.
fn normalize_query(term: &str) -> String {
    term.split_whitespace()
        .map(|word| urlencoding::encode(word).into_owned())
        .collect::<Vec<_>>()
        .join("+")
}

/// Extract result links and a raw-text digest from the results page.
///
/// Sponsored entries (`ad_domain=` in the href) are skipped. Result hrefs
/// are redirect links through the search engine; the real destination sits
/// in the `uddg` query parameter.
fn parse_search_page(html: &str) -> SearchResults {
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    let mut digest_parts = Vec::new();

    let container = Selector::parse("#links .links_main").expect("valid selector");
    let anchor = Selector::parse(".result__a").expect("valid selector");

    for result in document.select(&container) {
        let Some(a) = result.select(&anchor).next() else {
            continue;
        };
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        if href.contains("ad_domain=") {
            continue;
        }

        links.push(SearchLink {
            url: resolve_result_href(href),
            text: collapse_whitespace(&a.text().collect::<Vec<_>>().join(" ")),
        });
        digest_parts.push(collapse_whitespace(
            &result.text().collect::<Vec<_>>().join(" "),
        ));
    }

    let digest = digest_parts.join("\n");
    let digest = truncate_utf8(&digest, DIGEST_CAP).to_string();
    SearchResults { links, digest }
}

/// Unwrap the engine's redirect URL to the real destination.
fn resolve_result_href(href: &str) -> String {
    if !href.contains("duckduckgo.com") {
        return href.to_string();
    }

    // Hrefs come scheme-relative ("//duckduckgo.com/l/?uddg=...").
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    match Url::parse(&absolute) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
            .unwrap_or(absolute),
        Err(_) => absolute,
    }
}

/// Extract whitespace-normalized visible text from a fetched page,
/// skipping script/style/image/svg subtrees.
fn visible_text(html: &str) -> String {
    const SKIP: [&str; 6] = ["script", "style", "img", "image", "svg", "noscript"];

    let document = Html::parse_document(html);
    let mut out = String::new();
    let mut stack = vec![document.tree.root()];

    while let Some(node) = stack.pop() {
        if let Node::Element(element) = node.value() {
            if SKIP.contains(&element.name()) {
                continue;
            }
        }
        if let Node::Text(text) = node.value() {
            out.push_str(text);
            out.push(' ');
        }
        // Children are pushed in reverse so the pop order matches document
        // order.
        let children: Vec<_> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }

    collapse_whitespace(&out)
}

fn preview_url(url: &str) -> String {
    if url.len() > URL_PREVIEW_LEN {
        format!("{}...", truncate_utf8(url, URL_PREVIEW_LEN))
    } else {
        url.to_string()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
