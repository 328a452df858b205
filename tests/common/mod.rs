#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt as _;

use daily_crawl::app::dispatcher::ItemDispatcher;
use daily_crawl::app::events::{JobEvent, StreamConfig};
use daily_crawl::app::manager::{JobManager, ManagerConfig};
use daily_crawl::app::runner::CrawlContext;
use daily_crawl::app::scheduler::SchedulerConfig;
use daily_crawl::catalog::{InputUrlRecord, MemoryInputUrlRepository};
use daily_crawl::error::FetchError;
use daily_crawl::fetch::{FetchResult, Fetcher};
use daily_crawl::handlers::HandlerRegistry;
use daily_crawl::menu_links::{MemoryMenuLinkRepository, MenuLinkRepository};
use daily_crawl::preprocess::Preprocessor;
use daily_crawl::record::MobileUrlRule;
use daily_crawl::sink::JsonSink;

/// Serves canned pages; unknown URLs get a 404. Tracks peak concurrency.
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<String, FetchResult>,
    delay: Duration,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: FetchResult) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchResult::failed(Some(404), "HTTP 404 Not Found")))
    }
}

pub struct Harness {
    pub manager: Arc<JobManager>,
    pub catalog: Arc<MemoryInputUrlRepository>,
    pub menu_links: Arc<MemoryMenuLinkRepository>,
    pub fetcher: Arc<StubFetcher>,
    pub out: tempfile::TempDir,
}

pub fn fast_config() -> ManagerConfig {
    ManagerConfig {
        cleanup_delay: Duration::from_secs(300),
        drain_delay: Duration::from_millis(10),
        stream: StreamConfig {
            grace: Duration::from_millis(50),
            heartbeat: Duration::from_secs(30),
        },
        ..ManagerConfig::default()
    }
}

pub fn harness(rows: Vec<InputUrlRecord>, registry: HandlerRegistry, fetcher: StubFetcher) -> Harness {
    harness_with(rows, registry, fetcher, None, fast_config())
}

pub fn harness_with(
    rows: Vec<InputUrlRecord>,
    registry: HandlerRegistry,
    fetcher: StubFetcher,
    menu_links_override: Option<Arc<dyn MenuLinkRepository>>,
    config: ManagerConfig,
) -> Harness {
    let out = tempfile::tempdir().expect("tempdir");
    let catalog = Arc::new(MemoryInputUrlRepository::new(rows));
    let menu_links = Arc::new(MemoryMenuLinkRepository::default());
    let fetcher = Arc::new(fetcher);
    let context = CrawlContext {
        inputs: catalog.clone(),
        menu_links: menu_links_override.unwrap_or_else(|| menu_links.clone()),
        dispatcher: Arc::new(ItemDispatcher::new(
            Arc::new(registry),
            fetcher.clone(),
            SchedulerConfig::default(),
        )),
        preprocessor: Preprocessor::default(),
        mobile_rule: MobileUrlRule::default(),
        sink: JsonSink::new(out.path().join("result")),
    };
    Harness {
        manager: JobManager::new(context, config),
        catalog,
        menu_links,
        fetcher,
        out,
    }
}

/// Subscribes and collects until the stream closes.
pub async fn collect_events(manager: &JobManager, job_id: &str) -> Vec<JobEvent> {
    tokio::time::timeout(
        Duration::from_secs(600),
        manager.subscribe(job_id).collect::<Vec<_>>(),
    )
    .await
    .expect("event stream did not close")
}

pub fn names(events: &[JobEvent]) -> Vec<&'static str> {
    events.iter().map(JobEvent::name).collect()
}

pub fn read_output(path: &str) -> Vec<serde_json::Value> {
    let text = std::fs::read_to_string(Path::new(path)).expect("read output file");
    serde_json::from_str(&text).expect("parse output file")
}

pub fn row(id: i64, url: &str, menu_path: &str) -> InputUrlRecord {
    InputUrlRecord::new(id, url, menu_path)
}
