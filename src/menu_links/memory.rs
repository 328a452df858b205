use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{MenuLinkRecord, MenuLinkRepository, WRITER, document_number, format_document_id};
use crate::error::StorageError;

/// Menu links held in process memory. The mutex serializes id allocation.
#[derive(Debug, Default)]
pub struct MemoryMenuLinkRepository {
    rows: Mutex<Vec<MenuLinkRecord>>,
}

impl MemoryMenuLinkRepository {
    pub fn new(rows: Vec<MenuLinkRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub fn snapshot(&self) -> Vec<MenuLinkRecord> {
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MenuLinkRepository for MemoryMenuLinkRepository {
    async fn upsert(
        &self,
        menu_path: &str,
        pc_url: &str,
        mobile_url: Option<&str>,
    ) -> Result<String, StorageError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StorageError::Unavailable("menu link lock poisoned".to_string()))?;

        let existing = if menu_path.is_empty() || pc_url.is_empty() {
            None
        } else {
            rows.iter_mut()
                .find(|row| row.menu_path == menu_path && row.pc_url == pc_url)
        };
        if let Some(row) = existing {
            if let Some(mobile_url) = mobile_url {
                row.mobile_url = Some(mobile_url.to_string());
            }
            row.updated_by = Some(WRITER.to_string());
            row.updated_at = Some(Utc::now());
            tracing::debug!(document_id = %row.document_id, "menu link updated");
            return Ok(row.document_id.clone());
        }

        let next = rows
            .iter()
            .filter_map(|row| document_number(&row.document_id))
            .max()
            .unwrap_or(0)
            + 1;
        let document_id = format_document_id(next);
        rows.push(MenuLinkRecord {
            document_id: document_id.clone(),
            menu_path: menu_path.to_string(),
            pc_url: pc_url.to_string(),
            mobile_url: mobile_url.map(str::to_string),
            created_by: WRITER.to_string(),
            created_at: Utc::now(),
            updated_by: None,
            updated_at: None,
        });
        tracing::debug!(document_id = %document_id, "menu link created");
        Ok(document_id)
    }
}
