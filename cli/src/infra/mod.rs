//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the AWS
//! and `kubectl` CLIs, WinRM, SSH/SFTP, and the on-disk VM record.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod artifacts;
pub mod aws;
pub mod command_runner;
pub mod config;
pub mod network;
pub mod sessions;
pub mod sftp;
#[cfg(test)]
pub(crate) mod test_support;
pub mod vm_record;
pub mod winrm;
