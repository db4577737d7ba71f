//! Run command: provision a VM, run the remote tests, tear the VM down.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::{CloudProvisioner, ProgressReporter, SessionFactory};
use crate::application::services::harness::{Harness, HarnessSettings, RunReport};
use crate::application::services::remote_access::ReadinessPolicy;
use crate::domain::config::{DEFAULT_REMOTE_NAME, validate_remote_name};
use crate::domain::TestOutcome;
use crate::infra::artifacts;
use crate::infra::aws::AwsCliProvisioner;
use crate::infra::config::load_provision_config;
use crate::infra::sessions::RemoteSessions;
use crate::output::TerminalReporter;
use crate::output::json::RunSummary;

/// Arguments for a harness run (the default command).
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Absolute path of the test binary to copy to the Windows VM
    #[arg(long, value_name = "PATH", required = true)]
    pub binary_to_be_transferred: Option<PathBuf>,

    /// File name given to the binary under C:\Temp on the VM
    #[arg(long, value_name = "NAME", default_value = DEFAULT_REMOTE_NAME)]
    pub remote_name: String,

    /// Seconds to wait for the OpenSSH services to appear and start
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub readiness_timeout: u64,
}

impl RunArgs {
    /// Check the arguments before any cloud resource is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary path is missing, not a file, or the
    /// remote name is not a plain `.exe` file name.
    pub fn harness_settings(&self) -> Result<HarnessSettings> {
        let binary = self
            .binary_to_be_transferred
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .context("--binary-to-be-transferred is required")?;
        preflight_binary(&binary)?;
        validate_remote_name(&self.remote_name)?;

        let mut settings = HarnessSettings::new(binary);
        settings.remote_name.clone_from(&self.remote_name);
        settings.readiness = ReadinessPolicy {
            timeout: Duration::from_secs(self.readiness_timeout),
            ..ReadinessPolicy::default()
        };
        Ok(settings)
    }
}

fn preflight_binary(binary: &Path) -> Result<()> {
    let meta = std::fs::metadata(binary)
        .with_context(|| format!("test binary {} does not exist", binary.display()))?;
    anyhow::ensure!(meta.is_file(), "test binary {} is not a file", binary.display());
    Ok(())
}

/// Entry point for a harness run.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, any harness phase fails,
/// or the remote tests failed.
pub async fn run(app: &AppContext, args: &RunArgs) -> Result<()> {
    let settings = args.harness_settings()?;
    let config = load_provision_config()?;
    let artifact_dir = config.artifact_dir.clone();
    let provisioner = AwsCliProvisioner::from_config(config);
    let reporter = TerminalReporter::new(&app.output);

    app.output.header("winvm-e2e");
    app.output.kv("binary", &settings.binary.display().to_string());
    app.output.kv("artifacts", &artifact_dir.display().to_string());

    let run_report =
        run_harness(&provisioner, &RemoteSessions, &reporter, settings.clone()).await;
    drop(reporter);
    finish(app, &settings, &artifact_dir, run_report).await
}

/// Drive one harness run over the given ports.
pub async fn run_harness<P, S, R>(
    provisioner: &P,
    sessions: &S,
    reporter: &R,
    settings: HarnessSettings,
) -> RunReport
where
    P: CloudProvisioner,
    S: SessionFactory,
    R: ProgressReporter,
{
    let harness = Harness::new(provisioner, sessions, reporter, settings);
    let run_report = harness.run_to_completion().await;
    for e in [run_report.result.as_ref().err(), run_report.teardown.as_ref().err()]
        .into_iter()
        .flatten()
    {
        tracing::error!(kind = e.kind(), error = %e, "harness run failed");
    }
    run_report
}

/// Report the test outcome, if there is one, then turn the run into the
/// command's result.
///
/// The output log is saved and the verdict shown even when teardown failed
/// after the test ran.
///
/// # Errors
///
/// Returns the run or teardown error, or an assertion error when the
/// remote tests failed.
pub async fn finish(
    app: &AppContext,
    settings: &HarnessSettings,
    artifact_dir: &Path,
    run_report: RunReport,
) -> Result<()> {
    if let Some(outcome) = run_report.outcome() {
        report(app, settings, artifact_dir, outcome).await?;
    }
    let outcome = run_report.into_result()?;
    outcome.ensure_passed()?;
    Ok(())
}

async fn report(
    app: &AppContext,
    settings: &HarnessSettings,
    artifact_dir: &Path,
    outcome: &TestOutcome,
) -> Result<()> {
    let saved =
        artifacts::save_output_log(artifact_dir, &settings.remote_name, &outcome.output).await;
    let log_file = match saved {
        Ok(path) => Some(path.display().to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "could not save remote output");
            app.output.warn(&format!("could not save remote output: {e:#}"));
            None
        }
    };

    let remote_binary = settings.remote_binary();
    if app.is_json() {
        println!("{}", RunSummary::new(outcome, &remote_binary, log_file).to_json()?);
        return Ok(());
    }
    app.output.block("remote output", &outcome.output);
    if let Some(path) = &log_file {
        app.output.kv("log", path);
    }
    app.output.kv("exit code", &outcome.exit_code.to_string());
    if outcome.verdict.passed() {
        app.output.success("PASS");
    } else {
        app.output.warn("FAIL");
    }
    Ok(())
}
