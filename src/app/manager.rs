use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt as _;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::app::events::{self, EventLog, JobEvent, NOT_FOUND_MESSAGE, StreamConfig};
use crate::app::model::{JobCreated, JobParams, JobState};
use crate::app::queue::InProcessQueue;
use crate::app::runner::{CrawlContext, JobRunner};
use crate::catalog::CatalogStats;
use crate::error::{CrawlError, StorageError};

#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// How long a finished job's event log stays subscribable.
    pub cleanup_delay: Duration,
    /// Pause between the last event and scheduling cleanup.
    pub drain_delay: Duration,
    pub stream: StreamConfig,
    pub event_capacity: usize,
    pub max_concurrent_jobs: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cleanup_delay: Duration::from_secs(300),
            drain_delay: Duration::from_secs(1),
            stream: StreamConfig::default(),
            event_capacity: 1024,
            max_concurrent_jobs: 4,
        }
    }
}

struct JobEntry {
    seq: u64,
    state: JobState,
    events: Option<Arc<EventLog>>,
    cancel: CancellationToken,
}

/// Process-wide job registry. Every operation holds the lock briefly and
/// never across I/O.
pub struct JobTable {
    config: ManagerConfig,
    inner: Mutex<TableInner>,
}

#[derive(Default)]
struct TableInner {
    next_seq: u64,
    jobs: HashMap<String, JobEntry>,
}

impl JobTable {
    fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(TableInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, state: JobState, cancel: CancellationToken) {
        let events = EventLog::new(self.config.event_capacity);
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.insert(
            state.job_id.clone(),
            JobEntry {
                seq,
                state,
                events: Some(events),
                cancel,
            },
        );
    }

    pub fn update<R>(&self, job_id: &str, f: impl FnOnce(&mut JobState) -> R) -> Option<R> {
        let mut inner = self.lock();
        inner.jobs.get_mut(job_id).map(|entry| f(&mut entry.state))
    }

    pub fn get(&self, job_id: &str) -> Option<JobState> {
        self.lock().jobs.get(job_id).map(|entry| entry.state.clone())
    }

    /// Appends to the job's event log; dropped once the log is cleaned up.
    pub fn emit(&self, job_id: &str, event: JobEvent) {
        let log = self
            .lock()
            .jobs
            .get(job_id)
            .and_then(|entry| entry.events.clone());
        match log {
            Some(log) => log.push(event),
            None => tracing::debug!(job_id, event = event.name(), "no event log; event dropped"),
        }
    }

    fn is_finished(&self, job_id: &str) -> bool {
        self.lock()
            .jobs
            .get(job_id)
            .is_none_or(|entry| entry.state.status.is_terminal())
    }

    /// Removes the event log after the drain and cleanup delays. Job state
    /// stays queryable.
    pub fn schedule_cleanup(self: &Arc<Self>, job_id: &str) {
        let table = Arc::clone(self);
        let job_id = job_id.to_string();
        let delay = self.config.drain_delay + self.config.cleanup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(entry) = table.lock().jobs.get_mut(&job_id) {
                entry.events = None;
            }
            tracing::debug!(job_id = %job_id, "event log cleaned up");
        });
    }

    fn attach(&self, job_id: &str) -> Option<Arc<EventLog>> {
        let mut inner = self.lock();
        let entry = inner.jobs.get_mut(job_id)?;
        match &entry.events {
            Some(log) => Some(Arc::clone(log)),
            None if !entry.state.status.is_terminal() => {
                let log = EventLog::new(self.config.event_capacity);
                entry.events = Some(Arc::clone(&log));
                Some(log)
            }
            None => None,
        }
    }
}

/// Owns the job registry and starts one driver per submitted job.
pub struct JobManager {
    table: Arc<JobTable>,
    runner: Arc<JobRunner>,
    context: Arc<CrawlContext>,
    queue: InProcessQueue,
}

impl JobManager {
    pub fn new(context: CrawlContext, config: ManagerConfig) -> Arc<Self> {
        let table = Arc::new(JobTable::new(config));
        let context = Arc::new(context);
        let runner = Arc::new(JobRunner::new(Arc::clone(&table), Arc::clone(&context)));
        Arc::new(Self {
            table,
            runner,
            context,
            queue: InProcessQueue::new(config.max_concurrent_jobs),
        })
    }

    pub async fn create(&self, params: JobParams) -> Result<JobCreated, CrawlError> {
        let params = params.normalized()?;
        let total_urls = self
            .context
            .load_inputs(&params)
            .await?
            .len();

        let job_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        self.table
            .insert(JobState::pending(job_id.clone(), params.clone()), cancel.clone());
        tracing::info!(job_id = %job_id, total_urls, mode = params.mode.as_str(), "job created");

        let runner = Arc::clone(&self.runner);
        let id = job_id.clone();
        self.queue.spawn(async move {
            runner.run_job(&id, params, cancel).await;
        });

        Ok(JobCreated {
            task_id: job_id,
            total_urls,
            message: "daily crawl started".to_string(),
        })
    }

    pub fn get(&self, job_id: &str) -> Option<JobState> {
        self.table.get(job_id)
    }

    /// Newest first.
    pub fn list(&self, limit: usize) -> Vec<JobState> {
        let inner = self.table.lock();
        let mut entries: Vec<&JobEntry> = inner.jobs.values().collect();
        entries.sort_by(|a, b| {
            b.state
                .created_at
                .cmp(&a.state.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries
            .into_iter()
            .take(limit)
            .map(|entry| entry.state.clone())
            .collect()
    }

    pub fn subscribe(&self, job_id: &str) -> BoxStream<'static, JobEvent> {
        let Some(log) = self.table.attach(job_id) else {
            return futures::stream::once(async { JobEvent::error(NOT_FOUND_MESSAGE) }).boxed();
        };
        let table = Arc::clone(&self.table);
        let job_id = job_id.to_string();
        events::follow(log, self.table.config.stream, move || {
            table.is_finished(&job_id)
        })
        .boxed()
    }

    /// Stops new items from starting. `None` for an unknown job; a job that
    /// already finished reports its state unchanged.
    pub fn cancel(&self, job_id: &str) -> Option<JobState> {
        let inner = self.table.lock();
        let entry = inner.jobs.get(job_id)?;
        if !entry.state.status.is_terminal() {
            tracing::info!(job_id, "job cancellation requested");
            entry.cancel.cancel();
        }
        Some(entry.state.clone())
    }

    pub async fn stats(&self) -> Result<CatalogStats, StorageError> {
        self.context.inputs.stats().await
    }
}
