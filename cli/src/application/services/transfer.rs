//! Copy the test binary onto the VM.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::path::Path;

use anyhow::Context;

use crate::application::ports::FileTransfer;
use crate::domain::HarnessError;

/// Upload `local` to `remote` through an open transfer session.
///
/// The local path is validated first so a missing binary never reaches the
/// remote side.
///
/// # Errors
///
/// Returns `HarnessError::Transfer` if `local` is empty, is not a regular
/// file, or the copy fails.
pub async fn transfer_binary(
    transfer: &impl FileTransfer,
    local: &Path,
    remote: &str,
) -> Result<u64, HarnessError> {
    if local.as_os_str().is_empty() {
        return Err(HarnessError::Transfer(anyhow::anyhow!(
            "no binary given; pass --binary-to-be-transferred <PATH>"
        )));
    }
    let metadata = tokio::fs::metadata(local)
        .await
        .with_context(|| format!("error opening binary {}", local.display()))
        .map_err(HarnessError::Transfer)?;
    if !metadata.is_file() {
        return Err(HarnessError::Transfer(anyhow::anyhow!(
            "{} is not a regular file",
            local.display()
        )));
    }

    let bytes = transfer
        .upload(local, remote)
        .await
        .with_context(|| format!("error copying {} to {remote}", local.display()))
        .map_err(HarnessError::Transfer)?;
    tracing::info!(local = %local.display(), remote, bytes, "binary transferred");
    Ok(bytes)
}
