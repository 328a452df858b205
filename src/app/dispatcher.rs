use std::sync::Arc;
use std::time::Duration;

use crate::app::scheduler::SchedulerConfig;
use crate::catalog::InputUrlRecord;
use crate::error::CrawlError;
use crate::fetch::Fetcher;
use crate::handlers::{HandlerKind, HandlerOutput, HandlerRegistry, SingleResult, invoke};

/// Raw result of crawling one target, before preprocessing.
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub url: String,
    pub mobile_url: Option<String>,
    /// `None` when the generic fetcher produced the page.
    pub handler_name: Option<String>,
    pub output: HandlerOutput,
}

/// Routes one target to its handler, or to the generic fetcher, under the
/// per-item timeout.
pub struct ItemDispatcher {
    registry: Arc<HandlerRegistry>,
    fetcher: Arc<dyn Fetcher>,
    config: SchedulerConfig,
}

impl ItemDispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        fetcher: Arc<dyn Fetcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            fetcher,
            config,
        }
    }

    /// Multi-page handlers run unbounded; everything else is capped by the
    /// single-page timeout, itself never above the default ceiling.
    pub fn timeout_for(&self, kind: Option<HandlerKind>) -> Option<Duration> {
        match kind {
            Some(HandlerKind::MultiPage) => None,
            Some(HandlerKind::SinglePage) | None => Some(
                self.config
                    .single_page_timeout
                    .min(self.config.default_timeout),
            ),
        }
    }

    pub async fn dispatch(&self, input: &InputUrlRecord) -> Result<CrawledPage, CrawlError> {
        let url = input.pc_url.as_str();
        let matched = self.registry.lookup(url);
        let limit = self.timeout_for(matched.as_ref().map(|m| m.kind()));
        let handler_name = matched.as_ref().map(|m| m.name().to_string());

        let work = async {
            match matched {
                Some(matched) => {
                    let menu = Some(input.menu_path.as_str()).filter(|m| !m.is_empty());
                    invoke(matched, url, Arc::clone(&self.fetcher), menu).await
                }
                None => self.fetch_generic(url).await,
            }
        };
        let output = match limit {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| CrawlError::Timeout(limit))??,
            None => work.await?,
        };

        Ok(CrawledPage {
            url: input.pc_url.clone(),
            mobile_url: input.mobile_url.clone(),
            handler_name,
            output,
        })
    }

    async fn fetch_generic(&self, url: &str) -> Result<HandlerOutput, CrawlError> {
        tracing::debug!(url, "no handler matched; using generic fetcher");
        let result = self.fetcher.fetch(url).await?;
        if !result.success {
            let message = match (result.error, result.status_code) {
                (Some(err), _) if !err.trim().is_empty() => err,
                (_, Some(status)) => format!("fetch failed (HTTP {status})"),
                _ => "fetch failed".to_string(),
            };
            return Err(CrawlError::FetchFailed(message));
        }
        Ok(HandlerOutput::Single(SingleResult {
            title: result.title,
            markdown: result.markdown,
            html: result.html,
            hierarchy: None,
        }))
    }
}
