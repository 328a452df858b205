use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{MenuLinkRepository, WRITER, format_document_id};
use crate::error::StorageError;

/// Key for `pg_advisory_xact_lock`; serializes document-id allocation across
/// every process sharing the database.
const ALLOCATION_LOCK_KEY: i64 = 0x6b74_636f_6d5f;

pub struct PgMenuLinkRepository {
    pool: PgPool,
}

impl PgMenuLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MenuLinkRepository for PgMenuLinkRepository {
    async fn upsert(
        &self,
        menu_path: &str,
        pc_url: &str,
        mobile_url: Option<&str>,
    ) -> Result<String, StorageError> {
        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ALLOCATION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        if !menu_path.is_empty() && !pc_url.is_empty() {
            let existing = sqlx::query(
                r#"
                UPDATE menu_links
                SET mobile_url = COALESCE($3, mobile_url),
                    updated_by = $4,
                    updated_at = NOW()
                WHERE menu_path = $1 AND pc_url = $2
                RETURNING document_id
                "#,
            )
            .bind(menu_path)
            .bind(pc_url)
            .bind(mobile_url)
            .bind(WRITER)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(r) = existing {
                let document_id: String = r.try_get("document_id")?;
                tx.commit().await?;
                tracing::debug!(document_id = %document_id, "menu link updated");
                return Ok(document_id);
            }
        }

        let r = sqlx::query(
            r#"
            SELECT COALESCE(MAX(substring(document_id FROM '^ktcom_([0-9]+)$')::bigint), 0) AS max_num
            FROM menu_links
            WHERE document_id ~ '^ktcom_[0-9]+$'
            "#,
        )
        .fetch_one(&mut *tx)
        .await?;
        let max_num: i64 = r.try_get("max_num")?;
        let document_id = format_document_id(max_num.max(0) as u64 + 1);

        sqlx::query(
            r#"
            INSERT INTO menu_links (document_id, menu_path, pc_url, mobile_url, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(&document_id)
        .bind(menu_path)
        .bind(pc_url)
        .bind(mobile_url)
        .bind(WRITER)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::debug!(document_id = %document_id, "menu link created");
        Ok(document_id)
    }
}
