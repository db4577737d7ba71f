//! Domain types and validators for harness configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

/// Windows Server 2019 with containers, us-east-1.
pub const DEFAULT_IMAGE_ID: &str = "ami-0b8d82dea356226d3";
pub const DEFAULT_INSTANCE_TYPE: &str = "m4.large";
pub const DEFAULT_SSH_KEY_NAME: &str = "libra";
pub const DEFAULT_AWS_PROFILE: &str = "default";

/// Directory on the Windows VM that receives the transferred binary.
pub const REMOTE_DIR: &str = r"C:\Temp";
pub const DEFAULT_REMOTE_NAME: &str = "wmcb_unit_test.exe";

/// Account used for both WinRM and SSH.
pub const REMOTE_USER: &str = "Administrator";
pub const WINRM_HTTPS_PORT: u16 = 5986;
pub const SSH_PORT: u16 = 22;
pub const RDP_PORT: u16 = 3389;

/// File in the artifact directory that records the cloud resources of a run.
pub const VM_RECORD_FILE: &str = "winvm-e2e.json";

// ── Config schema ────────────────────────────────────────────────────────────

/// Environment required by every run, read without a prefix.
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessEnv {
    /// `KUBECONFIG`: cluster the VM is attached to.
    pub kubeconfig: PathBuf,
    /// `AWS_SHARED_CREDENTIALS_FILE`
    pub aws_shared_credentials_file: PathBuf,
    /// `ARTIFACT_DIR`: where the VM record and captured output are written.
    pub artifact_dir: PathBuf,
    /// `KUBE_SSH_KEY_PATH`: private key matching the EC2 key pair, used to
    /// decrypt the Administrator password.
    pub kube_ssh_key_path: PathBuf,
}

/// Optional `WINVM_*` overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionOverrides {
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub ssh_key_name: Option<String>,
    pub aws_profile: Option<String>,
    pub allowed_cidr: Option<String>,
}

/// Fully resolved provisioning parameters.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub kubeconfig: PathBuf,
    pub aws_credentials: PathBuf,
    pub artifact_dir: PathBuf,
    pub private_key: PathBuf,
    pub image_id: String,
    pub instance_type: String,
    pub ssh_key_name: String,
    pub aws_profile: String,
    /// Source CIDR for the VM security group. `None` means "the caller's
    /// public IP", resolved at provisioning time.
    pub allowed_cidr: Option<String>,
}

impl ProvisionConfig {
    /// Merge the required environment with the optional overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if `allowed_cidr` is set but malformed.
    pub fn resolve(env: HarnessEnv, overrides: ProvisionOverrides) -> Result<Self> {
        if let Some(cidr) = overrides.allowed_cidr.as_deref() {
            validate_cidr(cidr)?;
        }
        Ok(Self {
            kubeconfig: env.kubeconfig,
            aws_credentials: env.aws_shared_credentials_file,
            artifact_dir: env.artifact_dir,
            private_key: env.kube_ssh_key_path,
            image_id: overrides
                .image_id
                .unwrap_or_else(|| DEFAULT_IMAGE_ID.to_string()),
            instance_type: overrides
                .instance_type
                .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string()),
            ssh_key_name: overrides
                .ssh_key_name
                .unwrap_or_else(|| DEFAULT_SSH_KEY_NAME.to_string()),
            aws_profile: overrides
                .aws_profile
                .unwrap_or_else(|| DEFAULT_AWS_PROFILE.to_string()),
            allowed_cidr: overrides.allowed_cidr,
        })
    }

    /// Path of the VM record inside the artifact directory.
    #[must_use]
    pub fn record_path(&self) -> PathBuf {
        self.artifact_dir.join(VM_RECORD_FILE)
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates an IPv4 CIDR block such as `203.0.113.7/32`.
///
/// # Errors
///
/// Returns an error if the address or prefix length is malformed.
pub fn validate_cidr(cidr: &str) -> Result<()> {
    let invalid = || ConfigError::InvalidCidr(cidr.to_string());
    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    addr.parse::<std::net::Ipv4Addr>().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid().into());
    }
    Ok(())
}

/// Validates the name the binary is given on the VM.
///
/// The name is joined onto `C:\Temp` and executed through PowerShell, so it
/// must be a bare file name with no separators or shell metacharacters.
///
/// # Errors
///
/// Returns an error if the name is empty, contains a path separator or a
/// character outside `[A-Za-z0-9._-]`, or does not end in `.exe`.
pub fn validate_remote_name(name: &str) -> Result<()> {
    let ok = name.len() > 4
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && name.to_ascii_lowercase().ends_with(".exe");
    if !ok {
        return Err(ConfigError::InvalidRemoteName(name.to_string()).into());
    }
    Ok(())
}
