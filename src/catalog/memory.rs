use std::path::Path;
use std::sync::Mutex;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::Utc;

use super::{CatalogStats, CrawlStatus, InputUrlRecord, InputUrlRepository};
use crate::error::StorageError;

/// Catalog held in process memory. Used by the CLI `--seed` mode and tests.
#[derive(Debug, Default)]
pub struct MemoryInputUrlRepository {
    rows: Mutex<Vec<InputUrlRecord>>,
}

impl MemoryInputUrlRepository {
    pub fn new(rows: Vec<InputUrlRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    /// Loads a JSON array of catalog rows.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read seed file: {}", path.display()))?;
        let rows: Vec<InputUrlRecord> = serde_json::from_str(&text)
            .with_context(|| format!("parse seed file: {}", path.display()))?;
        Ok(Self::new(rows))
    }

    pub fn snapshot(&self) -> Vec<InputUrlRecord> {
        self.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn get(&self, id: i64) -> Option<InputUrlRecord> {
        self.lock()
            .ok()
            .and_then(|rows| rows.iter().find(|row| row.id == id).cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<InputUrlRecord>>, StorageError> {
        self.rows
            .lock()
            .map_err(|_| StorageError::Unavailable("catalog lock poisoned".to_string()))
    }
}

#[async_trait]
impl InputUrlRepository for MemoryInputUrlRepository {
    async fn load_active(
        &self,
        force_recrawl: bool,
        limit: Option<usize>,
    ) -> Result<Vec<InputUrlRecord>, StorageError> {
        let rows = self.lock()?;
        let mut selected: Vec<InputUrlRecord> = rows
            .iter()
            .filter(|row| row.is_eligible(force_recrawl))
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }

    async fn load_by_ids(&self, ids: &[i64]) -> Result<Vec<InputUrlRecord>, StorageError> {
        let rows = self.lock()?;
        let mut selected: Vec<InputUrlRecord> = rows
            .iter()
            .filter(|row| ids.contains(&row.id))
            .cloned()
            .collect();
        selected.sort_by_key(|row| row.id);
        Ok(selected)
    }

    async fn update_status(
        &self,
        id: i64,
        status: CrawlStatus,
        error: Option<&str>,
        handler_name: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut rows = self.lock()?;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "input_url",
                key: id.to_string(),
            })?;
        row.last_crawled_at = Some(Utc::now());
        row.last_status = Some(status);
        row.last_error = error.map(str::to_string);
        if let Some(name) = handler_name {
            row.handler_name = Some(name.to_string());
        }
        Ok(())
    }

    async fn stats(&self) -> Result<CatalogStats, StorageError> {
        let rows = self.lock()?;
        let mut stats = CatalogStats {
            total: rows.len() as i64,
            ..CatalogStats::default()
        };
        for row in rows.iter().filter(|row| row.is_active) {
            stats.active += 1;
            match row.last_status {
                Some(CrawlStatus::Success) => stats.success += 1,
                Some(CrawlStatus::Failed) => stats.failed += 1,
                Some(CrawlStatus::Skipped) => {}
                None => stats.pending += 1,
            }
        }
        Ok(stats)
    }
}
