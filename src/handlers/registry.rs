use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use regex::Regex;

use super::{FnHandler, HandlerKind, HandlerOutput, PageHandler};
use crate::error::CrawlError;
use crate::fetch::Fetcher;

struct Route {
    pattern: String,
    regex: Regex,
    handler: Arc<dyn PageHandler>,
}

/// Ordered URL-pattern table. Built once at startup; read-only afterwards.
#[derive(Default)]
pub struct HandlerRegistry {
    routes: Vec<Route>,
}

#[derive(Clone, Copy)]
pub struct HandlerMatch<'a> {
    pub pattern: &'a str,
    pub handler: &'a Arc<dyn PageHandler>,
}

impl HandlerMatch<'_> {
    pub fn name(&self) -> &str {
        self.handler.name()
    }

    pub fn kind(&self) -> HandlerKind {
        self.handler.kind()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route. Patterns match at the start of the URL only.
    pub fn register(
        &mut self,
        pattern: &str,
        handler: Arc<dyn PageHandler>,
    ) -> anyhow::Result<()> {
        let regex = Regex::new(&format!("^(?:{pattern})"))
            .with_context(|| format!("compile handler pattern: {pattern}"))?;
        tracing::debug!(pattern, handler = handler.name(), "registered page handler");
        self.routes.push(Route {
            pattern: pattern.to_string(),
            regex,
            handler,
        });
        Ok(())
    }

    pub fn register_fn<F, Fut>(&mut self, pattern: &str, name: &str, func: F) -> anyhow::Result<()>
    where
        F: Fn(String, Arc<dyn Fetcher>, Option<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HandlerOutput>> + Send + 'static,
    {
        self.register(pattern, Arc::new(FnHandler::new(name, func)))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// `(pattern, handler name, kind)` in registration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, HandlerKind)> {
        self.routes
            .iter()
            .map(|route| (route.pattern.as_str(), route.handler.name(), route.handler.kind()))
    }

    /// First registered route whose pattern matches wins.
    pub fn lookup(&self, url: &str) -> Option<HandlerMatch<'_>> {
        self.routes
            .iter()
            .find(|route| route.regex.is_match(url))
            .map(|route| HandlerMatch {
                pattern: &route.pattern,
                handler: &route.handler,
            })
    }

    /// Runs the matching handler. `None` means no route matched and the caller
    /// should fall back to the generic fetcher.
    pub async fn route(
        &self,
        url: &str,
        fetcher: Arc<dyn Fetcher>,
        menu: Option<&str>,
    ) -> Option<Result<HandlerOutput, CrawlError>> {
        let matched = self.lookup(url)?;
        Some(invoke(matched, url, fetcher, menu).await)
    }
}

pub(crate) async fn invoke(
    matched: HandlerMatch<'_>,
    url: &str,
    fetcher: Arc<dyn Fetcher>,
    menu: Option<&str>,
) -> Result<HandlerOutput, CrawlError> {
    let name = matched.name();
    tracing::debug!(url, handler = name, pattern = matched.pattern, "handler matched");
    let output = matched
        .handler
        .handle(url, fetcher, menu)
        .await
        .map_err(|err| CrawlError::handler(name, format!("{err:#}")))?;
    if let Some(reason) = output.shape_error() {
        return Err(CrawlError::handler(name, reason));
    }
    Ok(output)
}
