//! Environment-backed configuration loading.
//!
//! Required variables are read without a prefix; optional provisioning
//! overrides come from `WINVM_*`.

use anyhow::{Context, Result};

use crate::domain::config::{HarnessEnv, ProvisionConfig, ProvisionOverrides};
use crate::domain::error::ConfigError;

/// Prefix of the optional override variables.
pub const OVERRIDE_PREFIX: &str = "WINVM_";

/// Environment variables every run needs, in the order they are reported.
pub const REQUIRED_VARS: [&str; 4] = [
    "KUBECONFIG",
    "AWS_SHARED_CREDENTIALS_FILE",
    "ARTIFACT_DIR",
    "KUBE_SSH_KEY_PATH",
];

/// Read the required environment.
///
/// # Errors
///
/// Returns `ConfigError::MissingVar` naming the first unset variable.
pub fn load_harness_env() -> Result<HarnessEnv> {
    match envy::from_env::<HarnessEnv>() {
        Ok(env) => Ok(env),
        Err(envy::Error::MissingValue(field)) => Err(ConfigError::MissingVar {
            name: var_name(&field),
        }
        .into()),
        Err(e) => Err(e).context("reading harness environment"),
    }
}

/// Read the `WINVM_*` overrides. Unset variables keep their defaults.
///
/// # Errors
///
/// Returns an error if a variable is set to a value of the wrong shape.
pub fn load_overrides() -> Result<ProvisionOverrides> {
    envy::prefixed(OVERRIDE_PREFIX)
        .from_env()
        .context("reading WINVM_* overrides")
}

/// Required environment merged with the overrides.
///
/// # Errors
///
/// Propagates the errors of [`load_harness_env`], [`load_overrides`] and
/// [`ProvisionConfig::resolve`].
pub fn load_provision_config() -> Result<ProvisionConfig> {
    let env = load_harness_env()?;
    let overrides = load_overrides()?;
    let config = ProvisionConfig::resolve(env, overrides)?;
    tracing::debug!(
        artifact_dir = %config.artifact_dir.display(),
        image = %config.image_id,
        instance_type = %config.instance_type,
        profile = %config.aws_profile,
        "configuration loaded"
    );
    Ok(config)
}

fn var_name(field: &str) -> &'static str {
    REQUIRED_VARS
        .iter()
        .find(|name| name.eq_ignore_ascii_case(field))
        .copied()
        .unwrap_or("a required environment variable")
}
