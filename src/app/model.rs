use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerMode {
    Sequential,
    #[default]
    Parallel,
}

impl SchedulerMode {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "" | "parallel" => Ok(Self::Parallel),
            other => anyhow::bail!("unsupported scheduler mode: {other}"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        }
    }
}

impl std::str::FromStr for SchedulerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Job submission parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobParams {
    #[serde(default = "JobParams::default_force_recrawl")]
    pub force_recrawl: bool,
    /// Ignored when `url_ids` is non-empty.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub url_ids: Vec<i64>,
    #[serde(default)]
    pub mode: SchedulerMode,
    /// Clamped into `[1, 10]` rather than rejected.
    #[serde(default = "JobParams::default_concurrency")]
    pub concurrency: i64,
    #[serde(default = "JobParams::default_update_menu_links")]
    pub update_menu_links: bool,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            force_recrawl: Self::default_force_recrawl(),
            limit: None,
            url_ids: Vec::new(),
            mode: SchedulerMode::default(),
            concurrency: Self::default_concurrency(),
            update_menu_links: Self::default_update_menu_links(),
        }
    }
}

impl JobParams {
    pub fn default_force_recrawl() -> bool {
        true
    }
    pub fn default_concurrency() -> i64 {
        3
    }
    pub fn default_update_menu_links() -> bool {
        true
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency
            .clamp(MIN_CONCURRENCY as i64, MAX_CONCURRENCY as i64) as usize
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.limit == Some(0) {
            return Err(CrawlError::InvalidInput(
                "limit must be at least 1 when given".to_string(),
            ));
        }
        if let Some(id) = self.url_ids.iter().find(|id| **id <= 0) {
            return Err(CrawlError::InvalidInput(format!(
                "url_ids must be positive, got {id}"
            )));
        }
        Ok(())
    }

    /// Validated copy with `concurrency` clamped.
    pub fn normalized(mut self) -> Result<Self, CrawlError> {
        self.validate()?;
        self.concurrency = self.effective_concurrency() as i64;
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedItem {
    pub id: i64,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobResult {
    pub json_file: Option<String>,
    pub success: usize,
    pub failed: usize,
    /// Targets never started because the job was cancelled.
    #[serde(default)]
    pub skipped: usize,
    pub total: usize,
    pub failed_items: Vec<FailedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub status: JobStatus,
    pub params: JobParams,
    pub message: String,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub total_urls: Option<usize>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl JobState {
    pub fn pending(job_id: String, params: JobParams) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            params,
            message: "queued".to_string(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            total_urls: None,
            result: None,
            error: None,
        }
    }
}

/// Response to a job submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobCreated {
    pub task_id: String,
    pub total_urls: usize,
    pub message: String,
}
