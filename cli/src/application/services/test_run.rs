//! Execute the uploaded test binary and judge its output.

use anyhow::Context;

use crate::application::ports::RemoteShell;
use crate::application::services::remote_access::run_captured;
use crate::domain::powershell::run_test_binary_command;
use crate::domain::{HarnessError, TestOutcome};

/// Run `remote_binary --test.v` on the VM and capture everything it prints.
///
/// Output is collected into in-memory buffers handed to the shell, so the
/// process's own stdout is never redirected.
///
/// # Errors
///
/// Returns `HarnessError::RemoteExecution` if the command cannot be run.
pub async fn execute_test_binary(
    shell: &impl RemoteShell,
    remote_binary: &str,
) -> Result<TestOutcome, HarnessError> {
    let command = run_test_binary_command(remote_binary);
    tracing::info!(%command, "executing test binary");
    let captured = run_captured(shell, &command)
        .await
        .context("error while executing the test binary remotely")
        .map_err(HarnessError::RemoteExecution)?;
    let outcome = TestOutcome::new(captured.combined(), captured.exit_code);
    tracing::info!(
        exit_code = outcome.exit_code,
        verdict = ?outcome.verdict,
        output_bytes = outcome.output.len(),
        "test binary finished"
    );
    Ok(outcome)
}
