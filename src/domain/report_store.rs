//! ReportStore: the single cached snapshot behind `--save`, `--cached` and
//! `diff`. Atomic writes, SHA-256 verified reads, optional age limit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::warn;

use super::report::StoredReport;

pub struct ReportStore {
    path: PathBuf,
}

impl ReportStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize to a `.tmp` sibling, then rename over the final path so a
    /// reader never sees a partial file.
    pub async fn write(&self, stored: &StoredReport) -> Result<()> {
        let content =
            serde_json::to_string_pretty(stored).context("failed to serialize StoredReport")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &content)
            .await
            .with_context(|| format!("writing temp file {}", tmp_path.display()))?;

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| {
                format!(
                    "renaming {} to {}",
                    tmp_path.display(),
                    self.path.display()
                )
            })?;

        Ok(())
    }

    /// Read a StoredReport from disk and verify its checksum.
    pub async fn read(&self) -> Result<StoredReport> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;

        let stored: StoredReport = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", self.path.display()))?;

        if !stored.verify() {
            warn!(path = %self.path.display(), "report file checksum mismatch");
            bail!("checksum verification failed for {}", self.path.display());
        }

        Ok(stored)
    }

    /// Like `read`, but a snapshot older than `max_age` is an error rather
    /// than a silently outdated report.
    pub async fn read_fresh(&self, max_age: Option<Duration>) -> Result<StoredReport> {
        let stored = self.read().await?;
        if let Some(max_age) = max_age {
            let age = u64::try_from(stored.age_secs()).unwrap_or(0);
            if age > max_age.as_secs() {
                bail!(
                    "cached report {} is {}s old (limit {}s); run `hostscan report --save` to refresh it",
                    self.path.display(),
                    age,
                    max_age.as_secs()
                );
            }
        }
        Ok(stored)
    }
}
