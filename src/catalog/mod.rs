//! Catalog of crawl targets (`input_urls` table).

mod memory;
mod postgres;

pub use memory::MemoryInputUrlRepository;
pub use postgres::PgInputUrlRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Success,
    Failed,
    Skipped,
}

impl CrawlStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputUrlRecord {
    pub id: i64,
    pub pc_url: String,
    #[serde(default)]
    pub mobile_url: Option<String>,
    #[serde(default)]
    pub menu_path: String,
    #[serde(default)]
    pub handler_name: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub last_crawled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_status: Option<CrawlStatus>,
    #[serde(default)]
    pub last_error: Option<String>,
}

fn default_active() -> bool {
    true
}

impl InputUrlRecord {
    pub fn new(id: i64, pc_url: impl Into<String>, menu_path: impl Into<String>) -> Self {
        Self {
            id,
            pc_url: pc_url.into(),
            mobile_url: None,
            menu_path: menu_path.into(),
            handler_name: None,
            priority: 0,
            is_active: true,
            last_crawled_at: None,
            last_status: None,
            last_error: None,
        }
    }

    /// `menu_path` split on `^`, trimmed, empty segments dropped.
    pub fn hierarchy(&self) -> Vec<String> {
        split_menu_path(&self.menu_path)
    }

    pub fn is_eligible(&self, force_recrawl: bool) -> bool {
        self.is_active && (force_recrawl || self.last_status != Some(CrawlStatus::Success))
    }
}

pub fn split_menu_path(menu_path: &str) -> Vec<String> {
    menu_path
        .split('^')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogStats {
    pub total: i64,
    pub active: i64,
    pub success: i64,
    pub failed: i64,
    /// Active rows never crawled.
    pub pending: i64,
}

#[async_trait]
pub trait InputUrlRepository: Send + Sync {
    /// Eligible rows ordered by `priority DESC, id ASC`.
    async fn load_active(
        &self,
        force_recrawl: bool,
        limit: Option<usize>,
    ) -> Result<Vec<InputUrlRecord>, StorageError>;

    /// Rows ordered by `id ASC`; unknown ids are ignored.
    async fn load_by_ids(&self, ids: &[i64]) -> Result<Vec<InputUrlRecord>, StorageError>;

    /// Stamps `last_crawled_at = now()`. `handler_name` is only written when given.
    async fn update_status(
        &self,
        id: i64,
        status: CrawlStatus,
        error: Option<&str>,
        handler_name: Option<&str>,
    ) -> Result<(), StorageError>;

    async fn stats(&self) -> Result<CatalogStats, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_trims_and_drops_empty_segments() {
        let record = InputUrlRecord::new(1, "https://ex.test/a", " 상품 ^ 요금제^^5G ");
        assert_eq!(record.hierarchy(), vec!["상품", "요금제", "5G"]);
        assert!(InputUrlRecord::new(2, "u", "").hierarchy().is_empty());
    }

    #[test]
    fn eligibility_excludes_successes_unless_forced() {
        let mut record = InputUrlRecord::new(1, "u", "A");
        assert!(record.is_eligible(false));
        record.last_status = Some(CrawlStatus::Success);
        assert!(!record.is_eligible(false));
        assert!(record.is_eligible(true));
        record.last_status = Some(CrawlStatus::Failed);
        assert!(record.is_eligible(false));
        record.is_active = false;
        assert!(!record.is_eligible(true));
    }

    #[test]
    fn seed_rows_default_to_active() {
        let record: InputUrlRecord =
            serde_json::from_str(r#"{"id": 3, "pc_url": "https://ex.test/"}"#).unwrap();
        assert!(record.is_active);
        assert_eq!(record.priority, 0);
        assert_eq!(record.last_status, None);
    }
}
