use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt as _;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::app::dispatcher::{CrawledPage, ItemDispatcher};
use crate::app::events::Progress;
use crate::app::model::SchedulerMode;
use crate::catalog::InputUrlRecord;
use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Cap for single-page handlers and the generic fetcher.
    pub single_page_timeout: Duration,
    /// Ceiling applied to any bounded item.
    pub default_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            single_page_timeout: Duration::from_secs(180),
            default_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
pub enum CrawlOutcome {
    Success {
        input: InputUrlRecord,
        page: CrawledPage,
    },
    Failure {
        input: InputUrlRecord,
        kind: ErrorKind,
        message: String,
    },
    /// Never started because the job was cancelled first.
    Skipped { input: InputUrlRecord },
}

impl CrawlOutcome {
    pub fn input(&self) -> &InputUrlRecord {
        match self {
            Self::Success { input, .. } | Self::Failure { input, .. } | Self::Skipped { input } => {
                input
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

#[derive(Debug, Default)]
struct Counters {
    processed: usize,
    success: usize,
    failed: usize,
}

impl Counters {
    fn record(&mut self, outcome: &CrawlOutcome) {
        self.processed += 1;
        if outcome.is_success() {
            self.success += 1;
        } else {
            self.failed += 1;
        }
    }
}

pub struct Scheduler {
    dispatcher: Arc<ItemDispatcher>,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<ItemDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Crawls every input and returns outcomes in input order.
    pub async fn run(
        &self,
        job_id: &str,
        inputs: Vec<InputUrlRecord>,
        mode: SchedulerMode,
        concurrency: usize,
        cancel: &CancellationToken,
        progress: ProgressFn,
    ) -> Vec<CrawlOutcome> {
        tracing::info!(job_id, total = inputs.len(), mode = mode.as_str(), concurrency, "crawl phase started");
        match mode {
            SchedulerMode::Sequential => self.run_sequential(job_id, inputs, cancel, progress).await,
            SchedulerMode::Parallel => {
                self.run_parallel(job_id, inputs, concurrency, cancel, progress)
                    .await
            }
        }
    }

    async fn run_sequential(
        &self,
        job_id: &str,
        inputs: Vec<InputUrlRecord>,
        cancel: &CancellationToken,
        progress: ProgressFn,
    ) -> Vec<CrawlOutcome> {
        let total = inputs.len();
        let mut counters = Counters::default();
        let mut outcomes = Vec::with_capacity(total);

        for (idx, input) in inputs.into_iter().enumerate() {
            if cancel.is_cancelled() {
                outcomes.push(CrawlOutcome::Skipped { input });
                continue;
            }
            let current = idx + 1;
            progress(Progress {
                current,
                total,
                success: counters.success,
                failed: counters.failed,
                url: Some(input.pc_url.clone()),
                message: format!("crawling {current}/{total}"),
            });

            let outcome = crawl_one(job_id, &self.dispatcher, input).await;
            counters.record(&outcome);
            progress(Progress {
                current,
                total,
                success: counters.success,
                failed: counters.failed,
                url: Some(outcome.input().pc_url.clone()),
                message: format!("crawled {current}/{total}"),
            });
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_parallel(
        &self,
        job_id: &str,
        inputs: Vec<InputUrlRecord>,
        concurrency: usize,
        cancel: &CancellationToken,
        progress: ProgressFn,
    ) -> Vec<CrawlOutcome> {
        let total = inputs.len();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let counters = Arc::new(Mutex::new(Counters::default()));
        let mut tasks = JoinSet::new();
        let mut launched = 0;

        for (idx, input) in inputs.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            if cancel.is_cancelled() {
                break;
            }

            let dispatcher = Arc::clone(&self.dispatcher);
            let counters = Arc::clone(&counters);
            let progress = Arc::clone(&progress);
            let job_id = job_id.to_string();
            let input = input.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = crawl_one(&job_id, &dispatcher, input).await;

                let mut counters = counters.lock().unwrap_or_else(|e| e.into_inner());
                counters.record(&outcome);
                progress(Progress {
                    current: counters.processed,
                    total,
                    success: counters.success,
                    failed: counters.failed,
                    url: Some(outcome.input().pc_url.clone()),
                    message: format!("crawled {}/{total}", counters.processed),
                });
                drop(counters);
                (idx, outcome)
            });
            launched = idx + 1;
        }

        let mut slots: Vec<Option<CrawlOutcome>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(err) => tracing::error!(job_id, %err, "crawl worker aborted"),
            }
        }

        slots
            .into_iter()
            .zip(inputs)
            .enumerate()
            .map(|(idx, (slot, input))| match slot {
                Some(outcome) => outcome,
                None if idx < launched => CrawlOutcome::Failure {
                    input,
                    kind: ErrorKind::HandlerFailed,
                    message: "crawl worker aborted".to_string(),
                },
                None => CrawlOutcome::Skipped { input },
            })
            .collect()
    }
}

/// Dispatches one item; a panicking handler becomes a failure outcome.
async fn crawl_one(job_id: &str, dispatcher: &ItemDispatcher, input: InputUrlRecord) -> CrawlOutcome {
    let result = AssertUnwindSafe(dispatcher.dispatch(&input))
        .catch_unwind()
        .await;
    match result {
        Ok(Ok(page)) => {
            tracing::info!(job_id, input_id = input.id, url = %input.pc_url, handler = page.handler_name.as_deref().unwrap_or("generic"), "crawl succeeded");
            CrawlOutcome::Success { input, page }
        }
        Ok(Err(err)) => {
            tracing::warn!(job_id, input_id = input.id, url = %input.pc_url, kind = %err.kind(), error = %err, "crawl failed");
            CrawlOutcome::Failure {
                input,
                kind: err.kind(),
                message: err.to_string(),
            }
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            tracing::warn!(job_id, input_id = input.id, url = %input.pc_url, error = %message, "crawl panicked");
            CrawlOutcome::Failure {
                input,
                kind: ErrorKind::HandlerFailed,
                message: format!("handler panicked: {message}"),
            }
        }
    }
}
