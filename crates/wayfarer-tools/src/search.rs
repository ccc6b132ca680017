//! Web search backends -- Brave Search API or DuckDuckGo HTML scraping.
//!
//! The finders consume a flat text blob (titles and snippets joined by
//! newlines) rather than structured results, because the downstream
//! extraction is heuristic line scanning either way. `BraveBackend` is
//! preferred when an API key is available; `DuckDuckGoBackend` needs no
//! key and scrapes the HTML endpoint.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ToolError};

/// DuckDuckGo HTML search endpoint.
const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

/// Brave Search API endpoint.
const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Maximum number of raw results flattened into the text blob.
const MAX_RAW_RESULTS: usize = 10;

/// Realistic browser User-Agent to avoid being blocked.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// A pluggable free-text web search.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run `query` and return result titles and snippets as one text
    /// blob, newline-separated, blank line between results.
    async fn search(&self, query: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// DuckDuckGo
// ---------------------------------------------------------------------------

/// Keyless backend scraping the DuckDuckGo HTML endpoint.
pub struct DuckDuckGoBackend {
    client: reqwest::Client,
}

impl DuckDuckGoBackend {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    async fn search(&self, query: &str) -> Result<String> {
        debug!(query, engine = "duckduckgo", "running web search");

        // POST with form data is more reliable than GET for DDG.
        let response = self
            .client
            .post(DUCKDUCKGO_HTML_URL)
            .form(&[("q", query), ("kl", ""), ("df", "")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ToolError::SearchFailed {
                reason: format!("DuckDuckGo returned status {}", response.status()),
            });
        }

        let html = response.text().await?;
        Ok(flatten_duckduckgo_results(&html, MAX_RAW_RESULTS))
    }
}

// ---------------------------------------------------------------------------
// Brave Search API
// ---------------------------------------------------------------------------

/// Backend for the Brave Search API. Requires a subscription token.
pub struct BraveBackend {
    client: reqwest::Client,
    api_key: String,
}

impl BraveBackend {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SearchBackend for BraveBackend {
    async fn search(&self, query: &str) -> Result<String> {
        debug!(query, engine = "brave", "running web search");

        let response = self
            .client
            .get(BRAVE_SEARCH_URL)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &MAX_RAW_RESULTS.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ToolError::SearchFailed {
                reason: format!("Brave Search returned status {}", response.status()),
            });
        }

        let body: Value = response.json().await?;
        let mut blocks = Vec::new();
        if let Some(web_results) = body.pointer("/web/results").and_then(|v| v.as_array()) {
            for item in web_results.iter().take(MAX_RAW_RESULTS) {
                let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("");
                let snippet = item
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if !title.is_empty() || !snippet.is_empty() {
                    blocks.push(format!(
                        "{}\n{}",
                        strip_html_tags(title),
                        strip_html_tags(snippet)
                    ));
                }
            }
        }
        Ok(blocks.join("\n\n"))
    }
}

// ---------------------------------------------------------------------------
// DuckDuckGo HTML parsing
// ---------------------------------------------------------------------------

/// Scan the DuckDuckGo result markup and flatten result titles and
/// snippets into one text blob, blank line between results.
fn flatten_duckduckgo_results(html: &str, max_results: usize) -> String {
    let title_marker = "class=\"result__a\"";
    let snippet_marker = "class=\"result__snippet\"";

    let mut title_positions: Vec<usize> = Vec::new();
    let mut search_from = 0;
    while let Some(pos) = html[search_from..].find(title_marker) {
        title_positions.push(search_from + pos);
        search_from = search_from + pos + title_marker.len();
    }

    let mut snippet_positions: Vec<usize> = Vec::new();
    search_from = 0;
    while let Some(pos) = html[search_from..].find(snippet_marker) {
        snippet_positions.push(search_from + pos);
        search_from = search_from + pos + snippet_marker.len();
    }

    let mut blocks = Vec::new();
    for (i, &title_pos) in title_positions.iter().enumerate() {
        if blocks.len() >= max_results {
            break;
        }

        let after_marker = &html[title_pos + title_marker.len()..];
        let title = strip_html_tags(&extract_tag_text(after_marker, "</a>"));

        let snippet = if i < snippet_positions.len() {
            let after_snippet = &html[snippet_positions[i] + snippet_marker.len()..];
            strip_html_tags(&extract_tag_text(after_snippet, "</"))
        } else {
            String::new()
        };

        let title = title.trim();
        let snippet = snippet.trim();
        if !title.is_empty() || !snippet.is_empty() {
            blocks.push(format!("{title}\n{snippet}"));
        }
    }

    blocks.join("\n\n")
}

fn extract_tag_text(html_after_marker: &str, end_marker: &str) -> String {
    let closing_bracket = match html_after_marker.find('>') {
        Some(pos) => pos,
        None => return String::new(),
    };
    let content = &html_after_marker[closing_bracket + 1..];
    let end = match content.find(end_marker) {
        Some(pos) => pos,
        None => content.len(),
    };
    content[..end].to_string()
}

/// Strip HTML tags from a string and decode common HTML entities.
pub fn strip_html_tags(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut inside_tag = false;

    for ch in input.chars() {
        match ch {
            '<' => inside_tag = true,
            '>' => inside_tag = false,
            _ if !inside_tag => result.push(ch),
            _ => {}
        }
    }

    result
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
