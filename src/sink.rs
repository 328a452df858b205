use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Local;
use tokio::fs;

use crate::record::OutputRecord;

/// Writes one `data_YYYY-MM-DD_HHMMSS.json` per job.
#[derive(Debug, Clone)]
pub struct JsonSink {
    output_dir: PathBuf,
}

impl JsonSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Returns `None` without touching the filesystem when there is nothing to write.
    pub async fn write(
        &self,
        job_id: &str,
        records: &[OutputRecord],
    ) -> anyhow::Result<Option<PathBuf>> {
        if records.is_empty() {
            tracing::info!(job_id, "no records collected; skipping output file");
            return Ok(None);
        }
        let file_name = format!("data_{}.json", Local::now().format("%Y-%m-%d_%H%M%S"));
        let path = self.output_dir.join(file_name);
        write_json_atomic(&path, &records)
            .await
            .with_context(|| format!("write output file: {}", path.display()))?;
        tracing::info!(job_id, path = %path.display(), count = records.len(), "output file written");
        Ok(Some(path))
    }
}

/// Pretty JSON (two-space indent, non-ASCII kept literal) via tmp file + rename.
pub async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
