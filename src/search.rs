//! Web search behind a swappable provider.
//!
//! The default provider scrapes the DuckDuckGo HTML endpoint. Parsing is
//! best-effort: markup changes yield fewer (or zero) results, never an error.

use crate::convert::{read_error_detail, ERROR_BODY_LIMIT};
use crate::error::{Error, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Serialize;
use std::time::Duration;

/// Hard cap on results per query
pub const MAX_RESULTS: i64 = 10;

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Anything that can turn a query into search hits
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// Clamp a requested result count into `1..=MAX_RESULTS`. Zero and
/// negative requests yield one result.
pub fn clamp_max_results(requested: i64) -> usize {
    requested.clamp(1, MAX_RESULTS) as usize
}

/// Scrapes `html.duckduckgo.com/html/` (or a compatible endpoint)
pub struct DuckDuckGoHtml {
    http: reqwest::Client,
    endpoint: String,
    user_agent: String,
    timeout: Duration,
}

impl DuckDuckGoHtml {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoHtml {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        tracing::debug!(query, max_results, "searching DuckDuckGo");

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query)])
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteStatus {
                status: status.as_u16(),
                detail: read_error_detail(response, ERROR_BODY_LIMIT).await?,
            });
        }

        let html = response.text().await?;
        Ok(parse_ddg_html(&html, max_results))
    }
}

/// Extract results from the DuckDuckGo HTML layout.
///
/// Each result block (`.result`) holds an `a.result__a` title link and a
/// `.result__snippet` element. Pages without result blocks fall back to
/// pairing title links with snippets in document order.
pub fn parse_ddg_html(html: &str, max_results: usize) -> Vec<SearchHit> {
    use scraper::{Html, Selector};

    let (Ok(block_selector), Ok(link_selector), Ok(snippet_selector)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let text_of = |el: scraper::ElementRef| {
        el.text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut pairs = Vec::new();
    for block in document.select(&block_selector) {
        if let Some(link) = block.select(&link_selector).next() {
            let snippet = block.select(&snippet_selector).next();
            pairs.push((link, snippet));
        }
    }

    if pairs.is_empty() {
        let snippets: Vec<_> = document.select(&snippet_selector).collect();
        pairs = document
            .select(&link_selector)
            .enumerate()
            .map(|(i, link)| (link, snippets.get(i).copied()))
            .collect();
    }

    pairs
        .into_iter()
        .filter_map(|(link, snippet)| {
            let title = text_of(link);
            let url = link.value().attr("href").unwrap_or("").trim().to_string();
            if title.is_empty() || url.is_empty() {
                return None;
            }
            Some(SearchHit {
                title,
                url: unwrap_redirect(&url),
                snippet: snippet.map(text_of).unwrap_or_default(),
            })
        })
        .take(max_results)
        .collect()
}

/// DuckDuckGo wraps targets as `//duckduckgo.com/l/?uddg=<encoded>`; return the target.
fn unwrap_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    url::Url::parse(&absolute)
        .ok()
        .filter(|u| u.path() == "/l/")
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_else(|| href.to_string())
}
