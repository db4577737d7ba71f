//! Files the harness leaves in the artifact directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Log file name for a remote binary: `wmcb_unit_test.exe` → `wmcb_unit_test.log`.
#[must_use]
pub fn log_file_name(remote_name: &str) -> String {
    let stem = Path::new(remote_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("remote_test");
    format!("{stem}.log")
}

/// Write the captured remote output to `<artifact_dir>/<stem>.log`.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub async fn save_output_log(
    artifact_dir: &Path,
    remote_name: &str,
    output: &str,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(artifact_dir)
        .await
        .with_context(|| format!("creating artifact dir {}", artifact_dir.display()))?;
    let path = artifact_dir.join(log_file_name(remote_name));
    tokio::fs::write(&path, output)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = output.len(), "remote output saved");
    Ok(path)
}
