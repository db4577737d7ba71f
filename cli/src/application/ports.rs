//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncWrite;

use crate::domain::Credentials;

// ── Cloud Port ────────────────────────────────────────────────────────────────

/// Creates and destroys the Windows VM for a run.
#[allow(async_fn_in_trait)]
pub trait CloudProvisioner {
    /// Create exactly one Windows VM and return its access credentials.
    async fn create_windows_vm(&self) -> Result<Credentials>;
    /// Destroy every VM created by this run. A no-op when none were created.
    async fn destroy_windows_vms(&self) -> Result<()>;
}

// ── Remote Access Ports ───────────────────────────────────────────────────────

/// Runs command lines on the VM.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    /// Run `command`, streaming its output into the given writers, and
    /// return the remote exit code once the command completes.
    ///
    /// # Errors
    ///
    /// Returns an error on any transport or authentication failure.
    async fn run<O, E>(&self, command: &str, stdout: &mut O, stderr: &mut E) -> Result<i32>
    where
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send;
}

/// Copies local files onto the VM.
#[allow(async_fn_in_trait)]
pub trait FileTransfer {
    /// Create `remote`, copy the full contents of `local` into it, and close
    /// the remote handle before returning. Returns the bytes copied.
    async fn upload(&self, local: &Path, remote: &str) -> Result<u64>;
    /// Close the transfer session and its underlying connection.
    async fn close(self) -> Result<()>;
}

/// Opens the two remote-access sessions for a VM.
#[allow(async_fn_in_trait)]
pub trait SessionFactory {
    type Shell: RemoteShell;
    type Transfer: FileTransfer;

    /// Build the command client. No network traffic until the first `run`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be constructed.
    fn command_client(&self, credentials: &Credentials) -> Result<Self::Shell>;

    /// Connect, authenticate, and open a file-transfer session.
    async fn transfer_session(&self, credentials: &Credentials) -> Result<Self::Transfer>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait, no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}
