//! Cleanup command: destroy cloud resources left behind by an aborted run.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::app::AppContext;
use crate::application::ports::{CloudProvisioner, CommandRunner};
use crate::infra::aws::{AwsCliProvisioner, describe_record};
use crate::infra::config::load_provision_config;

/// What `cleanup` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    /// `true` when recorded resources were destroyed.
    pub cleaned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<String>,
}

impl CleanupSummary {
    /// Serialize to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("JSON serialization failed")
    }
}

/// Entry point for `winvm-e2e cleanup`.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, the VM record is
/// unreadable, or destroying the recorded resources fails.
pub async fn run(app: &AppContext) -> Result<()> {
    let config = load_provision_config()?;
    let provisioner = AwsCliProvisioner::from_config(config);
    let summary = clean_up(&provisioner).await?;

    if app.is_json() {
        println!("{}", summary.to_json()?);
    } else if let Some(resources) = &summary.resources {
        app.output.kv("destroyed", resources);
        app.output.success("recorded resources destroyed");
    } else {
        app.output.success("nothing to clean up");
    }
    Ok(())
}

/// Destroy whatever the record file lists, then remove the file.
///
/// An empty record file is removed without any cloud call.
///
/// # Errors
///
/// Returns an error if the record is unreadable or a destroy step fails;
/// the record then keeps what is left.
pub async fn clean_up<R: CommandRunner>(
    provisioner: &AwsCliProvisioner<R>,
) -> Result<CleanupSummary> {
    let record = provisioner.adopt_recorded().await?;
    let resources = record
        .as_ref()
        .filter(|r| !r.is_empty())
        .map(describe_record);
    provisioner.destroy_windows_vms().await?;
    Ok(CleanupSummary {
        cleaned: resources.is_some(),
        resources,
    })
}
