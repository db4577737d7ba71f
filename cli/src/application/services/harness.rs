//! Application service: the end-to-end test driver.
//!
//! `Harness` is the context object for one run: it owns the settings and
//! borrows the injected ports, and drives setup → execute → teardown.
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::path::PathBuf;

use crate::application::ports::{
    CloudProvisioner, FileTransfer, ProgressReporter, SessionFactory,
};
use crate::application::services::remote_access::{self, ReadinessPolicy};
use crate::application::services::{test_run, transfer};
use crate::domain::config::{DEFAULT_REMOTE_NAME, REMOTE_DIR};
use crate::domain::powershell::remote_path;
use crate::domain::{HarnessError, TestOutcome};

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct HarnessSettings {
    /// Local binary to transfer and execute.
    pub binary: PathBuf,
    /// Remote working directory.
    pub remote_dir: String,
    /// File name of the binary on the VM.
    pub remote_name: String,
    pub readiness: ReadinessPolicy,
}

impl HarnessSettings {
    #[must_use]
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            remote_dir: REMOTE_DIR.to_string(),
            remote_name: DEFAULT_REMOTE_NAME.to_string(),
            readiness: ReadinessPolicy::default(),
        }
    }

    /// Full remote path of the transferred binary.
    #[must_use]
    pub fn remote_binary(&self) -> String {
        remote_path(&self.remote_dir, &self.remote_name)
    }
}

/// Result of the run itself and of the teardown that followed it.
#[derive(Debug)]
pub struct RunReport {
    pub result: Result<TestOutcome, HarnessError>,
    pub teardown: Result<(), HarnessError>,
}

impl RunReport {
    /// The test outcome, if the binary ran.
    #[must_use]
    pub fn outcome(&self) -> Option<&TestOutcome> {
        self.result.as_ref().ok()
    }

    /// Collapse into one result. A run error takes precedence over a
    /// teardown error.
    ///
    /// # Errors
    ///
    /// Returns the run error, else the teardown error.
    pub fn into_result(self) -> Result<TestOutcome, HarnessError> {
        let outcome = self.result?;
        self.teardown?;
        Ok(outcome)
    }
}

/// Sessions opened during setup and consumed by `execute`.
pub struct RemoteSession<Sh, T> {
    shell: Sh,
    transfer: T,
}

/// One harness run.
pub struct Harness<'a, P, S, R> {
    provisioner: &'a P,
    sessions: &'a S,
    reporter: &'a R,
    settings: HarnessSettings,
}

impl<'a, P, S, R> Harness<'a, P, S, R>
where
    P: CloudProvisioner,
    S: SessionFactory,
    R: ProgressReporter,
{
    pub fn new(provisioner: &'a P, sessions: &'a S, reporter: &'a R, settings: HarnessSettings) -> Self {
        Self {
            provisioner,
            sessions,
            reporter,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Run setup and the remote test, then tear down.
    ///
    /// Teardown runs exactly once whatever happened before it. When both
    /// the run and the teardown fail, the run's error is returned and the
    /// teardown error is logged.
    ///
    /// # Errors
    ///
    /// Returns the first `HarnessError` of setup or execution, or the
    /// teardown error if everything before it succeeded.
    pub async fn run(&self) -> Result<TestOutcome, HarnessError> {
        self.run_to_completion().await.into_result()
    }

    /// Like [`Harness::run`], but keeps the test outcome even when teardown
    /// fails afterwards.
    pub async fn run_to_completion(&self) -> RunReport {
        let result = match self.setup().await {
            Ok(session) => self.execute(session).await,
            Err(e) => Err(e),
        };
        let teardown = self.tear_down().await;
        if let (Err(_), Err(teardown_err)) = (&result, &teardown) {
            tracing::error!(error = %teardown_err, "teardown failed after an earlier error");
            self.reporter.warn(&teardown_err.to_string());
        }
        RunReport { result, teardown }
    }

    /// Provision the VM and open both remote sessions.
    ///
    /// # Errors
    ///
    /// Every failure here is fatal to the run.
    pub async fn setup(&self) -> Result<RemoteSession<S::Shell, S::Transfer>, HarnessError> {
        self.reporter.step("creating Windows VM...");
        let credentials = self
            .provisioner
            .create_windows_vm()
            .await
            .map_err(HarnessError::Provisioning)?;
        tracing::info!(address = credentials.address(), "Windows VM created");
        self.reporter
            .success(&format!("Windows VM ready at {}", credentials.address()));

        let shell = self
            .sessions
            .command_client(&credentials)
            .map_err(HarnessError::RemoteExecution)?;
        remote_access::configure_openssh(&shell, self.reporter, self.settings.readiness).await?;

        self.reporter
            .step(&format!("creating {}...", self.settings.remote_dir));
        remote_access::create_remote_dir(&shell, &self.settings.remote_dir).await?;

        self.reporter.step("opening SSH session...");
        let transfer = self
            .sessions
            .transfer_session(&credentials)
            .await
            .map_err(HarnessError::Transfer)?;
        self.reporter.success("remote access configured");
        Ok(RemoteSession { shell, transfer })
    }

    /// Transfer the binary, close the transfer session, run the binary.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Transfer` or `HarnessError::RemoteExecution`.
    /// A failing test is not an error here; inspect `TestOutcome::verdict`.
    pub async fn execute(
        &self,
        session: RemoteSession<S::Shell, S::Transfer>,
    ) -> Result<TestOutcome, HarnessError> {
        let RemoteSession { shell, transfer } = session;
        let remote_binary = self.settings.remote_binary();

        self.reporter.step("transferring test binary...");
        let uploaded =
            transfer::transfer_binary(&transfer, &self.settings.binary, &remote_binary).await;
        if let Err(e) = transfer.close().await {
            tracing::warn!(error = %e, "failed to close transfer session");
        }
        let bytes = uploaded?;
        self.reporter
            .success(&format!("transferred {bytes} bytes to {remote_binary}"));

        self.reporter.step("running test binary...");
        let outcome = test_run::execute_test_binary(&shell, &remote_binary).await?;
        if outcome.verdict.passed() {
            self.reporter.success("remote tests passed");
        } else {
            self.reporter.warn("remote tests failed");
        }
        Ok(outcome)
    }

    /// Destroy the VMs created by this run.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Teardown` if destruction fails.
    pub async fn tear_down(&self) -> Result<(), HarnessError> {
        self.reporter.step("destroying Windows VM...");
        self.provisioner
            .destroy_windows_vms()
            .await
            .map_err(HarnessError::Teardown)?;
        self.reporter.success("Windows VM destroyed");
        Ok(())
    }
}
