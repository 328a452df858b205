use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("static title selector"));

/// A retrieved page. `success = false` is a terminal answer for this attempt;
/// retrying is up to handlers, not the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchResult {
    pub success: bool,
    pub html: String,
    pub markdown: String,
    pub title: String,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl FetchResult {
    pub fn page(html: impl Into<String>, markdown: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            success: true,
            html: html.into(),
            markdown: markdown.into(),
            title: title.into(),
            status_code: Some(200),
            error: None,
        }
    }

    pub fn failed(status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError>;
}

/// Plain HTTP fetcher: GET the page, convert the body to markdown.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build page fetch http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, "daily-crawl/0.1")
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|err| FetchError::new(url, format!("GET failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url, status = status.as_u16(), "non-success status");
            return Ok(FetchResult::failed(
                Some(status.as_u16()),
                format!("HTTP {}", status.as_u16()),
            ));
        }

        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            let content_type = content_type.to_ascii_lowercase();
            if !(content_type.starts_with("text/html")
                || content_type.starts_with("application/xhtml+xml"))
            {
                return Ok(FetchResult::failed(
                    Some(status.as_u16()),
                    format!("unsupported content type: {content_type}"),
                ));
            }
        }

        let html = read_text_limited(response, MAX_BODY_BYTES)
            .await
            .map_err(|err| FetchError::new(url, format!("{err:#}")))?;

        let title = extract_title(&html);
        let markdown = html2md::parse_html(&html);
        Ok(FetchResult {
            success: true,
            html,
            markdown,
            title,
            status_code: Some(status.as_u16()),
            error: None,
        })
    }
}

async fn read_text_limited(mut resp: reqwest::Response, limit: usize) -> anyhow::Result<String> {
    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = resp.chunk().await.context("read response chunk")? {
        if out.len() + chunk.len() > limit {
            let remaining = limit.saturating_sub(out.len());
            out.extend_from_slice(&chunk[..remaining]);
            tracing::debug!(limit, "response body truncated");
            break;
        }
        out.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

pub fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_trimmed_text_of_first_title_element() {
        let html = "<html><head><title>\n  Plans &amp; Rates </title></head><body></body></html>";
        assert_eq!(extract_title(html), "Plans & Rates");
    }

    #[test]
    fn missing_title_is_empty() {
        assert_eq!(extract_title("<p>no head</p>"), "");
    }

    #[test]
    fn failed_result_carries_status_and_message() {
        let result = FetchResult::failed(Some(404), "HTTP 404");
        assert!(!result.success);
        assert_eq!(result.status_code, Some(404));
        assert_eq!(result.error.as_deref(), Some("HTTP 404"));
        assert!(result.html.is_empty());
    }
}
