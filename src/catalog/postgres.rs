use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::{CatalogStats, CrawlStatus, InputUrlRecord, InputUrlRepository};
use crate::error::StorageError;

const SELECT_COLUMNS: &str = r#"
    SELECT id::bigint AS id, pc_url, mobile_url, COALESCE(menu_path, '') AS menu_path,
           handler_name, COALESCE(priority, 0)::int4 AS priority, is_active,
           last_crawled_at, last_status, last_error
    FROM input_urls
"#;

pub struct PgInputUrlRepository {
    pool: PgPool,
}

impl PgInputUrlRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(r: &PgRow) -> Result<InputUrlRecord, sqlx::Error> {
    let last_status: Option<String> = r.try_get("last_status")?;
    Ok(InputUrlRecord {
        id: r.try_get("id")?,
        pc_url: r.try_get("pc_url")?,
        mobile_url: r.try_get("mobile_url")?,
        menu_path: r.try_get("menu_path")?,
        handler_name: r.try_get("handler_name")?,
        priority: r.try_get("priority")?,
        is_active: r.try_get("is_active")?,
        last_crawled_at: r.try_get("last_crawled_at")?,
        last_status: last_status.as_deref().and_then(CrawlStatus::parse),
        last_error: r.try_get("last_error")?,
    })
}

#[async_trait]
impl InputUrlRepository for PgInputUrlRepository {
    async fn load_active(
        &self,
        force_recrawl: bool,
        limit: Option<usize>,
    ) -> Result<Vec<InputUrlRecord>, StorageError> {
        let sql = format!(
            r#"{SELECT_COLUMNS}
            WHERE is_active = TRUE
              AND ($1 OR last_status IS NULL OR last_status <> 'success')
            ORDER BY priority DESC, id ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(force_recrawl)
            .bind(limit.map(|n| n as i64))
            .fetch_all(&self.pool)
            .await?;
        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(count = records.len(), force_recrawl, "loaded active input urls");
        Ok(records)
    }

    async fn load_by_ids(&self, ids: &[i64]) -> Result<Vec<InputUrlRecord>, StorageError> {
        let sql = format!(
            r#"{SELECT_COLUMNS}
            WHERE id = ANY($1)
            ORDER BY id ASC
            "#
        );
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn update_status(
        &self,
        id: i64,
        status: CrawlStatus,
        error: Option<&str>,
        handler_name: Option<&str>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE input_urls
            SET last_crawled_at = NOW(),
                last_status = $2,
                last_error = $3,
                handler_name = COALESCE($4, handler_name),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(handler_name)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "input_url",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    async fn stats(&self) -> Result<CatalogStats, StorageError> {
        let r = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE is_active) AS active,
                COUNT(*) FILTER (WHERE is_active AND last_status = 'success') AS success,
                COUNT(*) FILTER (WHERE is_active AND last_status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE is_active AND last_status IS NULL) AS pending
            FROM input_urls
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(CatalogStats {
            total: r.try_get("total")?,
            active: r.try_get("active")?,
            success: r.try_get("success")?,
            failed: r.try_get("failed")?,
            pending: r.try_get("pending")?,
        })
    }
}
