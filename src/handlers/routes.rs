use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;

use super::{HandlerKind, HandlerOutput, HandlerRegistry, PageHandler, SingleResult};
use crate::fetch::Fetcher;

/// One entry of a route file:
///
/// ```json
/// [{"pattern": "https://shop\\.example\\.com/", "name": "shop_detail"},
///  {"pattern": "https://event\\.example\\.com/", "name": "event_list", "kind": "multi_page"}]
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RouteEntry {
    pub pattern: String,
    pub name: String,
    #[serde(default)]
    pub kind: Option<HandlerKind>,
}

/// Fetches the page through the shared fetcher under its own route name.
pub struct FetchHandler {
    name: String,
    kind: HandlerKind,
}

impl FetchHandler {
    pub fn new(name: impl Into<String>, kind: Option<HandlerKind>) -> Self {
        let name = name.into();
        let kind = kind.unwrap_or_else(|| HandlerKind::from_name(&name));
        Self { name, kind }
    }
}

#[async_trait]
impl PageHandler for FetchHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> HandlerKind {
        self.kind
    }

    async fn handle(
        &self,
        url: &str,
        fetcher: Arc<dyn Fetcher>,
        _menu: Option<&str>,
    ) -> anyhow::Result<HandlerOutput> {
        let page = fetcher.fetch(url).await?;
        if !page.success {
            anyhow::bail!(
                "{}",
                page.error.unwrap_or_else(|| "fetch failed".to_string())
            );
        }
        Ok(HandlerOutput::Single(SingleResult {
            title: page.title,
            markdown: page.markdown,
            html: page.html,
            hierarchy: None,
        }))
    }
}

pub fn registry_from_entries(entries: &[RouteEntry]) -> anyhow::Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    for entry in entries {
        registry.register(
            &entry.pattern,
            Arc::new(FetchHandler::new(&entry.name, entry.kind)),
        )?;
    }
    Ok(registry)
}

pub fn load_routes(path: &Path) -> anyhow::Result<HandlerRegistry> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read route file: {}", path.display()))?;
    let entries: Vec<RouteEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("parse route file: {}", path.display()))?;
    registry_from_entries(&entries)
}
