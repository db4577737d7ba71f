//! Persistence of the cloud resources created by a run.
//!
//! `VmRecordStore` keeps a `VmRecord` as JSON in the artifact directory.
//! Writes go through a temp file and a rename so a crash mid-write never
//! leaves a truncated record behind.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::VmRecord;

/// JSON file holding the `VmRecord` of the current run.
#[derive(Debug, Clone)]
pub struct VmRecordStore {
    path: PathBuf,
}

impl VmRecordStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, or `None` if no run left one behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(&self) -> Result<Option<VmRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading VM record {}", self.path.display()));
            }
        };
        let record = serde_json::from_str(&content)
            .with_context(|| format!("parsing VM record {}", self.path.display()))?;
        Ok(Some(record))
    }

    /// Atomically replace the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save(&self, record: &VmRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(record).context("serializing VM record")?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("finalizing VM record {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), ?record, "VM record saved");
        Ok(())
    }

    /// Remove the record. Missing is fine.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("removing VM record {}", self.path.display()))
            }
        }
    }
}
