mod registry;
pub mod routes;

pub use registry::{HandlerMatch, HandlerRegistry};
pub(crate) use registry::invoke;
pub use routes::{FetchHandler, RouteEntry, load_routes};

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fetch::Fetcher;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    SinglePage,
    /// Walks many pages with its own inner timeouts; no outer cap.
    MultiPage,
}

const MULTI_PAGE_NAME_MARKERS: [&str; 5] = [
    "_main",
    "_list",
    "gigagenie_faq",
    "gigagenie_news",
    "winner_announcements",
];

impl HandlerKind {
    pub fn from_name(name: &str) -> Self {
        if MULTI_PAGE_NAME_MARKERS
            .iter()
            .any(|marker| name.contains(marker))
        {
            Self::MultiPage
        } else {
            Self::SinglePage
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SingleResult {
    pub title: String,
    pub markdown: String,
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub title: String,
    pub markdown: String,
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuHint {
    pub menu: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    Single(SingleResult),
    /// `menus[i]` describes `datas[i]`; items past the end of `menus` inherit
    /// the parent's hierarchy.
    Multi {
        datas: Vec<ItemRecord>,
        menus: Vec<MenuHint>,
    },
}

impl HandlerOutput {
    pub fn single(title: impl Into<String>, markdown: impl Into<String>, html: impl Into<String>) -> Self {
        Self::Single(SingleResult {
            title: title.into(),
            markdown: markdown.into(),
            html: html.into(),
            hierarchy: None,
        })
    }

    pub fn shape_error(&self) -> Option<&'static str> {
        match self {
            Self::Single(single) if single.markdown.trim().is_empty() && single.html.trim().is_empty() => {
                Some("handler returned an empty page")
            }
            Self::Multi { datas, .. } if datas.is_empty() => Some("handler returned no items"),
            _ => None,
        }
    }
}

#[async_trait]
pub trait PageHandler: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> HandlerKind {
        HandlerKind::from_name(self.name())
    }

    async fn handle(
        &self,
        url: &str,
        fetcher: Arc<dyn Fetcher>,
        menu: Option<&str>,
    ) -> anyhow::Result<HandlerOutput>;
}

pub struct FnHandler<F> {
    name: String,
    kind: HandlerKind,
    func: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(String, Arc<dyn Fetcher>, Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<HandlerOutput>> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        let name = name.into();
        let kind = HandlerKind::from_name(&name);
        Self { name, kind, func }
    }

    pub fn with_kind(mut self, kind: HandlerKind) -> Self {
        self.kind = kind;
        self
    }
}

#[async_trait]
impl<F, Fut> PageHandler for FnHandler<F>
where
    F: Fn(String, Arc<dyn Fetcher>, Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<HandlerOutput>> + Send,
{
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
        menu: Option<&str>,
    ) -> anyhow::Result<HandlerOutput> {
        (self.func)(url.to_string(), fetcher, menu.map(str::to_string)).await
    }
}
