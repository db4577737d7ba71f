//! Shared test helpers for the CLI-driving adapters.
//!
//! `ScriptedRunner` answers `kubectl`/`aws` invocations from canned replies
//! and records every command line it was asked to run.

#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::CommandRunner;
use crate::domain::config::{HarnessEnv, ProvisionOverrides};
use crate::domain::ProvisionConfig;
use crate::infra::command_runner::DEFAULT_CMD_TIMEOUT;

/// Build an `ExitStatus` from a logical exit code (cross-platform).
#[cfg(unix)]
pub fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    std::process::ExitStatus::from_raw(code as u32)
}

pub fn output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Replies are matched by needle against the full command line; each reply
/// is consumed once. An unmatched command is an error.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    replies: Arc<Mutex<VecDeque<(&'static str, Output)>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn reply(&self, needle: &'static str, out: Output) -> &Self {
        self.replies.lock().expect("lock").push_back((needle, out));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, DEFAULT_CMD_TIMEOUT).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        _timeout: Duration,
    ) -> Result<Output> {
        let line = format!("{program} {}", args.join(" "));
        self.calls.lock().expect("lock").push(line.clone());
        let mut replies = self.replies.lock().expect("lock");
        let pos = replies
            .iter()
            .position(|(needle, _)| line.contains(needle))
            .ok_or_else(|| anyhow::anyhow!("unexpected command: {line}"))?;
        let (_, out) = replies.remove(pos).expect("position is valid");
        Ok(out)
    }
}

/// Provisioning config rooted at `artifact_dir`, with a fixed allowed CIDR
/// so no test reaches the IP lookup service.
pub fn config(artifact_dir: &Path) -> ProvisionConfig {
    let env = HarnessEnv {
        kubeconfig: PathBuf::from("/tmp/kubeconfig"),
        aws_shared_credentials_file: PathBuf::from("/tmp/aws-creds"),
        artifact_dir: artifact_dir.to_path_buf(),
        kube_ssh_key_path: PathBuf::from("/tmp/libra.pem"),
    };
    let overrides = ProvisionOverrides {
        allowed_cidr: Some("198.51.100.4/32".to_string()),
        ..ProvisionOverrides::default()
    };
    ProvisionConfig::resolve(env, overrides).expect("config")
}
