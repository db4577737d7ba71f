//! Remote access configuration: OpenSSH services and the working directory.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use anyhow::Context;
use tokio::time::Instant;

use crate::application::ports::{ProgressReporter, RemoteShell};
use crate::domain::HarnessError;
use crate::domain::powershell::{
    self, OPENSSH_SERVICES, ServiceStatus, SetupCommand, parse_service_statuses,
};

/// Bounds for polling remote service state.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    /// Give up after this long.
    pub timeout: Duration,
    /// Delay between two status queries.
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            interval: Duration::from_secs(10),
        }
    }
}

/// State a set of services must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCondition {
    /// Present in the service list, in any state.
    Registered,
    Running,
}

impl ServiceCondition {
    fn holds(self, status: Option<&ServiceStatus>) -> bool {
        match self {
            Self::Registered => status.is_some(),
            Self::Running => status == Some(&ServiceStatus::Running),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Running => "Running",
        }
    }
}

/// Output of one remote command, captured in memory.
#[derive(Debug, Default)]
pub struct Captured {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Captured {
    /// stdout followed by stderr, lossily decoded.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// Run `command` and collect its output into memory.
///
/// # Errors
///
/// Returns an error if the remote shell reports a transport failure.
pub async fn run_captured(shell: &impl RemoteShell, command: &str) -> anyhow::Result<Captured> {
    let mut captured = Captured::default();
    captured.exit_code = shell
        .run(command, &mut captured.stdout, &mut captured.stderr)
        .await?;
    Ok(captured)
}

/// Run one setup step; a non-zero exit code fails the step.
///
/// # Errors
///
/// Returns `HarnessError::RemoteExecution` on transport failure or non-zero exit.
pub async fn run_setup_command(
    shell: &impl RemoteShell,
    step: &SetupCommand,
) -> Result<(), HarnessError> {
    tracing::debug!(command = %step.command, "running remote setup command");
    let captured = run_captured(shell, &step.command)
        .await
        .with_context(|| format!("failed to {}", step.description))
        .map_err(HarnessError::RemoteExecution)?;
    if captured.exit_code != 0 {
        return Err(HarnessError::RemoteExecution(anyhow::anyhow!(
            "failed to {} (exit code {}):\n{}",
            step.description,
            captured.exit_code,
            captured.combined().trim()
        )));
    }
    tracing::debug!(step = step.description, output = %captured.combined().trim(), "setup step done");
    Ok(())
}

/// Poll `Get-Service` until every service in `services` meets `condition`.
///
/// Transport errors are not retried; only the service state is polled.
///
/// # Errors
///
/// Returns `HarnessError::Timeout` when `policy.timeout` elapses first, or
/// `HarnessError::RemoteExecution` if a query cannot be delivered.
pub async fn wait_for_services(
    shell: &impl RemoteShell,
    services: &[&str],
    condition: ServiceCondition,
    policy: ReadinessPolicy,
) -> Result<(), HarnessError> {
    let query = powershell::service_status_query(services);
    let started = Instant::now();
    let deadline = started + policy.timeout;
    loop {
        let captured = run_captured(shell, &query)
            .await
            .context("querying service status")
            .map_err(HarnessError::RemoteExecution)?;
        let statuses = parse_service_statuses(&String::from_utf8_lossy(&captured.stdout));
        let pending: Vec<&str> = services
            .iter()
            .copied()
            .filter(|name| !condition.holds(statuses.get(*name)))
            .collect();
        if pending.is_empty() {
            tracing::info!(
                services = %services.join(","),
                condition = condition.describe(),
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "services ready"
            );
            return Ok(());
        }
        tracing::debug!(pending = %pending.join(","), "services not ready yet");
        if Instant::now() >= deadline {
            return Err(HarnessError::Timeout {
                what: format!("{} to be {}", pending.join(", "), condition.describe()),
                waited_secs: policy.timeout.as_secs(),
            });
        }
        tokio::time::sleep(policy.interval).await;
    }
}

/// Enable and start the OpenSSH server on the VM.
///
/// The VM image installs OpenSSH at boot; the services appear in the
/// service list some time after WinRM becomes reachable.
///
/// # Errors
///
/// Returns an error if any step fails or the services never come up.
pub async fn configure_openssh(
    shell: &impl RemoteShell,
    reporter: &impl ProgressReporter,
    policy: ReadinessPolicy,
) -> Result<(), HarnessError> {
    reporter.step("waiting for OpenSSH services to register...");
    wait_for_services(shell, &OPENSSH_SERVICES, ServiceCondition::Registered, policy).await?;

    for step in powershell::openssh_setup_commands() {
        reporter.step(&format!("{}...", step.description));
        run_setup_command(shell, &step).await?;
    }

    wait_for_services(shell, &OPENSSH_SERVICES, ServiceCondition::Running, policy).await?;
    reporter.success("OpenSSH server running");
    Ok(())
}

/// Create the directory that receives the test binary.
///
/// # Errors
///
/// Returns `HarnessError::RemoteExecution` if the directory cannot be created.
pub async fn create_remote_dir(shell: &impl RemoteShell, dir: &str) -> Result<(), HarnessError> {
    run_setup_command(shell, &powershell::create_dir_command(dir)).await
}
