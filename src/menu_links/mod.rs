//! Menu-link catalog (`menu_links` table): one live row per `(menu_path, pc_url)`,
//! each owning a stable `ktcom_<N>` document id.

mod memory;
mod postgres;

pub use memory::MemoryMenuLinkRepository;
pub use postgres::PgMenuLinkRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub const DOCUMENT_ID_PREFIX: &str = "ktcom_";

/// Written to `created_by` / `updated_by`.
pub const WRITER: &str = "daily_crawling";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuLinkRecord {
    pub document_id: String,
    pub menu_path: String,
    pub pc_url: String,
    pub mobile_url: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait MenuLinkRepository: Send + Sync {
    /// Returns the document id for `(menu_path, pc_url)`, allocating the next
    /// `ktcom_<N>` when no row matches. `mobile_url` only overwrites when given.
    async fn upsert(
        &self,
        menu_path: &str,
        pc_url: &str,
        mobile_url: Option<&str>,
    ) -> Result<String, StorageError>;
}

/// `N` of a well-formed `ktcom_<N>` id.
pub fn document_number(document_id: &str) -> Option<u64> {
    let digits = document_id.strip_prefix(DOCUMENT_ID_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn format_document_id(number: u64) -> String {
    format!("{DOCUMENT_ID_PREFIX}{number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_number_accepts_only_ktcom_digits() {
        assert_eq!(document_number("ktcom_12"), Some(12));
        assert_eq!(document_number("ktcom_"), None);
        assert_eq!(document_number("ktcom_12a"), None);
        assert_eq!(document_number("xktcom_3"), None);
        assert_eq!(document_number("ktcom_-1"), None);
        assert_eq!(format_document_id(7), "ktcom_7");
    }
}
