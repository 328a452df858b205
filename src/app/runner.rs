use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::app::dispatcher::{CrawledPage, ItemDispatcher};
use crate::app::events::{JobEvent, Progress, StatusUpdate, Summary};
use crate::app::manager::JobTable;
use crate::app::model::{FailedItem, JobParams, JobResult, JobStatus, SchedulerMode};
use crate::app::scheduler::{CrawlOutcome, ProgressFn, Scheduler};
use crate::catalog::{CrawlStatus, InputUrlRecord, InputUrlRepository};
use crate::error::{CrawlError, StorageError};
use crate::menu_links::MenuLinkRepository;
use crate::preprocess::Preprocessor;
use crate::record::{self, MobileUrlRule, OutputRecord};
use crate::sink::JsonSink;

/// DB-phase status is reported every this many items.
const DB_STATUS_EVERY: usize = 10;

/// Everything a job driver talks to.
pub struct CrawlContext {
    pub inputs: Arc<dyn InputUrlRepository>,
    pub menu_links: Arc<dyn MenuLinkRepository>,
    pub dispatcher: Arc<ItemDispatcher>,
    pub preprocessor: Preprocessor,
    pub mobile_rule: MobileUrlRule,
    pub sink: JsonSink,
}

impl CrawlContext {
    /// Inputs a job with `params` would crawl right now.
    pub async fn load_inputs(&self, params: &JobParams) -> Result<Vec<InputUrlRecord>, StorageError> {
        if params.url_ids.is_empty() {
            self.inputs
                .load_active(params.force_recrawl, params.limit)
                .await
        } else {
            self.inputs.load_by_ids(&params.url_ids).await
        }
    }
}

#[derive(Default)]
struct Tally {
    success: usize,
    failed: usize,
    skipped: usize,
    failed_items: Vec<FailedItem>,
    records: Vec<OutputRecord>,
    seen_doc_ids: HashSet<String>,
}

impl Tally {
    fn fail(&mut self, input: &InputUrlRecord, error: String) {
        self.failed += 1;
        self.failed_items.push(FailedItem {
            id: input.id,
            url: input.pc_url.clone(),
            error,
        });
    }

    fn append(&mut self, job_id: &str, records: Vec<OutputRecord>) {
        for record in records {
            if !record.doc_id.is_empty() && !self.seen_doc_ids.insert(record.doc_id.clone()) {
                tracing::warn!(job_id, doc_id = %record.doc_id, url = %record.url, "duplicate docId dropped");
                continue;
            }
            self.records.push(record);
        }
    }
}

pub struct JobRunner {
    table: Arc<JobTable>,
    context: Arc<CrawlContext>,
}

impl JobRunner {
    pub fn new(table: Arc<JobTable>, context: Arc<CrawlContext>) -> Self {
        Self { table, context }
    }

    pub async fn run_job(&self, job_id: &str, params: JobParams, cancel: CancellationToken) {
        if let Err(err) = self.try_run_job(job_id, &params, &cancel).await {
            tracing::error!(job_id, ?err, "job failed");
            self.mark_error(job_id, format!("{err:#}"));
        }
        self.table.schedule_cleanup(job_id);
    }

    async fn try_run_job(
        &self,
        job_id: &str,
        params: &JobParams,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        let mode = params.mode;
        let concurrency = params.effective_concurrency();
        self.mark_running(job_id, mode);

        let inputs = self
            .context
            .load_inputs(params)
            .await
            .context("load input urls")?;
        let total = inputs.len();
        if total == 0 {
            return self.finish_empty(job_id);
        }

        self.table.update(job_id, |state| {
            state.total_urls = Some(total);
            state.message = format!("crawling {total} urls");
        });
        self.table.emit(
            job_id,
            JobEvent::Status(StatusUpdate {
                mode: Some(mode.as_str().to_string()),
                total_urls: Some(total),
                concurrency: Some(concurrency),
                ..StatusUpdate::new(
                    format!("crawling {total} urls ({} mode, concurrency {concurrency})", mode.as_str()),
                    "active",
                )
            }),
        );

        let progress: ProgressFn = {
            let table = Arc::clone(&self.table);
            let job_id = job_id.to_string();
            Arc::new(move |p: Progress| table.emit(&job_id, JobEvent::Progress(p)))
        };
        let outcomes = Scheduler::new(Arc::clone(&self.context.dispatcher))
            .run(job_id, inputs, mode, concurrency, cancel, progress)
            .await;

        let phase = if params.update_menu_links {
            "updating database"
        } else {
            "processing results (menu link update skipped)"
        };
        self.table
            .emit(job_id, JobEvent::Status(StatusUpdate::new(phase, "active")));

        let tally = self.reconcile(job_id, outcomes, params).await;

        let json_file = self
            .context
            .sink
            .write(job_id, &tally.records)
            .await?
            .map(|path| path.display().to_string());

        let result = JobResult {
            json_file,
            success: tally.success,
            failed: tally.failed,
            skipped: tally.skipped,
            total,
            failed_items: tally.failed_items,
        };
        let message = format!(
            "daily crawl finished: {} succeeded, {} failed, {} skipped",
            result.success, result.failed, result.skipped
        );
        tracing::info!(job_id, total, success = result.success, failed = result.failed, skipped = result.skipped, "job completed");
        let summary = Summary::from_result(&result, message.clone());
        self.table.update(job_id, |state| {
            state.status = JobStatus::Completed;
            state.completed_at = Some(Utc::now());
            state.message = message;
            state.result = Some(result);
        });
        self.table.emit(job_id, JobEvent::Final(summary.clone()));
        self.table.emit(job_id, JobEvent::Complete(summary));
        Ok(())
    }

    fn mark_running(&self, job_id: &str, mode: SchedulerMode) {
        tracing::info!(job_id, mode = mode.as_str(), "job started");
        self.table.update(job_id, |state| {
            state.status = JobStatus::Running;
            state.started_at = Some(Utc::now());
            state.message = "starting".to_string();
        });
        self.table.emit(
            job_id,
            JobEvent::Status(StatusUpdate {
                mode: Some(mode.as_str().to_string()),
                ..StatusUpdate::new(format!("daily crawl started ({} mode)", mode.as_str()), "active")
            }),
        );
    }

    fn finish_empty(&self, job_id: &str) -> anyhow::Result<()> {
        tracing::info!(job_id, "no urls to crawl");
        let message = "no URLs to crawl".to_string();
        let result = JobResult {
            total: 0,
            ..JobResult::default()
        };
        let summary = Summary::from_result(&result, message.clone());
        self.table.emit(
            job_id,
            JobEvent::Status(StatusUpdate::new(message.clone(), "completed")),
        );
        self.table.update(job_id, |state| {
            state.status = JobStatus::Completed;
            state.completed_at = Some(Utc::now());
            state.total_urls = Some(0);
            state.message = message;
            state.result = Some(result);
        });
        self.table.emit(job_id, JobEvent::Complete(summary));
        Ok(())
    }

    fn mark_error(&self, job_id: &str, message: String) {
        self.table.update(job_id, |state| {
            state.status = JobStatus::Failed;
            state.completed_at = Some(Utc::now());
            state.message = "failed".to_string();
            state.error = Some(message.clone());
        });
        self.table.emit(job_id, JobEvent::error(message));
    }

    async fn reconcile(
        &self,
        job_id: &str,
        outcomes: Vec<CrawlOutcome>,
        params: &JobParams,
    ) -> Tally {
        let total = outcomes.len();
        let mut tally = Tally::default();
        let repo = &self.context.inputs;

        for (idx, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                CrawlOutcome::Success { input, page } => {
                    let built = self.build_records(&page, &input, params.update_menu_links).await;
                    let stored = match built {
                        Ok(records) => repo
                            .update_status(input.id, CrawlStatus::Success, None, page.handler_name.as_deref())
                            .await
                            .map(|()| records)
                            .map_err(CrawlError::from),
                        Err(err) => Err(err),
                    };
                    match stored {
                        Ok(records) => {
                            tally.success += 1;
                            tally.append(job_id, records);
                        }
                        Err(err) => {
                            tracing::warn!(job_id, input_id = input.id, kind = %err.kind(), error = %err, "result reconciliation failed");
                            let message = err.to_string();
                            self.record_failure(job_id, &input, &message).await;
                            tally.fail(&input, message);
                        }
                    }
                }
                CrawlOutcome::Failure { input, message, .. } => {
                    self.record_failure(job_id, &input, &message).await;
                    tally.fail(&input, message);
                }
                CrawlOutcome::Skipped { input } => {
                    if let Err(err) = repo
                        .update_status(input.id, CrawlStatus::Skipped, Some("job cancelled"), None)
                        .await
                    {
                        tracing::warn!(job_id, input_id = input.id, %err, "could not mark input skipped");
                    }
                    tally.skipped += 1;
                }
            }

            let processed = idx + 1;
            if processed % DB_STATUS_EVERY == 0 || processed == total {
                self.table.emit(
                    job_id,
                    JobEvent::Status(StatusUpdate {
                        total_urls: Some(total),
                        processed: Some(processed),
                        ..StatusUpdate::new(format!("db update: {processed}/{total}"), "active")
                    }),
                );
            }
        }
        tally
    }

    /// All output records for one input. Any child failure fails the whole item.
    async fn build_records(
        &self,
        page: &CrawledPage,
        input: &InputUrlRecord,
        update_menu_links: bool,
    ) -> Result<Vec<OutputRecord>, CrawlError> {
        let preprocessed = self.context.preprocessor.preprocess(page, input);
        let parts = record::split(preprocessed, input, &self.context.mobile_rule);

        let mut records = Vec::with_capacity(parts.len());
        for part in &parts {
            let document_id = if update_menu_links {
                let menu_path = record::menu_path_for(part, input);
                let mobile_url = part
                    .mobile_url
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
                    .or(input.mobile_url.as_deref());
                Some(
                    self.context
                        .menu_links
                        .upsert(&menu_path, &part.url, mobile_url)
                        .await?,
                )
            } else {
                None
            };
            records.push(record::build(part, input, document_id.as_deref()));
        }
        Ok(records)
    }

    async fn record_failure(&self, job_id: &str, input: &InputUrlRecord, message: &str) {
        if let Err(err) = self
            .context
            .inputs
            .update_status(input.id, CrawlStatus::Failed, Some(message), None)
            .await
        {
            tracing::warn!(job_id, input_id = input.id, %err, "could not mark input failed");
        }
    }
}
