//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

// ── Harness errors ────────────────────────────────────────────────────────────

/// Errors raised by the phases of a harness run.
///
/// Each variant wraps the underlying `anyhow` chain so the full context
/// (`aws ec2 run-instances: ...`) is preserved in the rendered message.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to provision the Windows VM: {0:#}")]
    Provisioning(anyhow::Error),

    #[error("remote command failed: {0:#}")]
    RemoteExecution(anyhow::Error),

    #[error("file transfer failed: {0:#}")]
    Transfer(anyhow::Error),

    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("timed out after {waited_secs}s waiting for {what}")]
    Timeout { what: String, waited_secs: u64 },

    #[error("failed tearing down the Windows VM: {0:#}")]
    Teardown(anyhow::Error),
}

impl HarnessError {
    /// Short phase label used in logs and the JSON summary.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provisioning(_) => "provisioning",
            Self::RemoteExecution(_) => "remote_execution",
            Self::Transfer(_) => "transfer",
            Self::Assertion(_) => "assertion",
            Self::Timeout { .. } => "timeout",
            Self::Teardown(_) => "teardown",
        }
    }
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to harness configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not set. Export it before running the harness.")]
    MissingVar { name: &'static str },

    #[error("Invalid CIDR block '{0}': expected a.b.c.d/n")]
    InvalidCidr(String),

    #[error("Invalid remote file name '{0}': must be a bare file name ending in .exe")]
    InvalidRemoteName(String),
}
