//! Domain layer: pure types, validation, and parsing.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod cloud;
pub mod config;
pub mod credentials;
pub mod error;
pub mod powershell;
pub mod verdict;

pub use cloud::{ClusterInfo, Subnet, VmRecord};
pub use config::{HarnessEnv, ProvisionConfig, ProvisionOverrides};
pub use credentials::Credentials;
pub use error::{ConfigError, HarnessError};
pub use verdict::{TestOutcome, Verdict};
