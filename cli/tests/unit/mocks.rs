//! Shared recording mocks of the harness ports.
//!
//! Every mock appends to one [`EventLog`] so tests can assert on the order
//! of calls across provisioner, shell and transfer.

#![allow(clippy::expect_used, dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use winvm_e2e::application::ports::{
    CloudProvisioner, FileTransfer, ProgressReporter, RemoteShell, SessionFactory,
};
use winvm_e2e::domain::Credentials;

// ── Event log ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CreateVm,
    DestroyVm,
    CommandClient,
    Run(String),
    TransferSession,
    Upload(String),
    CloseTransfer,
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().expect("lock").push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().expect("lock").clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    /// Index of the first event matching `pred`.
    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(pred)
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.position(|e| matches!(e, Event::Run(c) if c.contains(needle)))
            .is_some()
    }
}

// ── Provisioner ──────────────────────────────────────────────────────────────

pub struct MockProvisioner {
    pub log: EventLog,
    pub fail_create: bool,
    pub fail_destroy: bool,
}

impl MockProvisioner {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            fail_create: false,
            fail_destroy: false,
        }
    }
}

impl CloudProvisioner for MockProvisioner {
    async fn create_windows_vm(&self) -> Result<Credentials> {
        self.log.push(Event::CreateVm);
        if self.fail_create {
            anyhow::bail!("aws ec2 run-instances: InsufficientInstanceCapacity");
        }
        Ok(Credentials::new("203.0.113.9", "s3cret"))
    }

    async fn destroy_windows_vms(&self) -> Result<()> {
        self.log.push(Event::DestroyVm);
        if self.fail_destroy {
            anyhow::bail!("aws ec2 terminate-instances: throttled");
        }
        Ok(())
    }
}

// ── Shell ────────────────────────────────────────────────────────────────────

/// Answers service queries with both OpenSSH services running, the test
/// binary with `test_output`, and everything else with empty success.
#[derive(Clone)]
pub struct MockShell {
    pub log: EventLog,
    pub test_output: &'static str,
    pub test_exit_code: i32,
    /// Commands containing this text exit with code 1.
    pub fail_matching: Option<&'static str>,
}

impl RemoteShell for MockShell {
    async fn run<O, E>(&self, command: &str, stdout: &mut O, _stderr: &mut E) -> Result<i32>
    where
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        self.log.push(Event::Run(command.to_string()));
        if self.fail_matching.is_some_and(|needle| command.contains(needle)) {
            stdout.write_all(b"Access is denied.").await?;
            return Ok(1);
        }
        if command.contains("-EncodedCommand") {
            stdout.write_all(b"sshd=Running\r\nssh-agent=Running\r\n").await?;
            return Ok(0);
        }
        if command.contains("--test.v") {
            stdout.write_all(self.test_output.as_bytes()).await?;
            return Ok(self.test_exit_code);
        }
        Ok(0)
    }
}

// ── Transfer ─────────────────────────────────────────────────────────────────

pub struct MockTransfer {
    log: EventLog,
}

impl FileTransfer for MockTransfer {
    async fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
        self.log.push(Event::Upload(remote.to_string()));
        let bytes = std::fs::metadata(local)?.len();
        Ok(bytes)
    }

    async fn close(self) -> Result<()> {
        self.log.push(Event::CloseTransfer);
        Ok(())
    }
}

// ── Session factory ──────────────────────────────────────────────────────────

pub struct MockSessions {
    pub shell: MockShell,
    pub fail_transfer_session: bool,
}

impl MockSessions {
    pub fn new(log: &EventLog, test_output: &'static str) -> Self {
        Self {
            shell: MockShell {
                log: log.clone(),
                test_output,
                test_exit_code: i32::from(test_output.contains("FAIL")),
                fail_matching: None,
            },
            fail_transfer_session: false,
        }
    }
}

impl SessionFactory for MockSessions {
    type Shell = MockShell;
    type Transfer = MockTransfer;

    fn command_client(&self, credentials: &Credentials) -> Result<MockShell> {
        assert_eq!(credentials.address(), "203.0.113.9");
        self.shell.log.push(Event::CommandClient);
        Ok(self.shell.clone())
    }

    async fn transfer_session(&self, _credentials: &Credentials) -> Result<MockTransfer> {
        self.shell.log.push(Event::TransferSession);
        if self.fail_transfer_session {
            anyhow::bail!("connecting to 203.0.113.9:22: connection refused");
        }
        Ok(MockTransfer {
            log: self.shell.log.clone(),
        })
    }
}

// ── Reporter ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn warnings(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("lock")
            .iter()
            .filter_map(|m| m.strip_prefix("warn: ").map(str::to_string))
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.messages.lock().expect("lock").push(format!("step: {message}"));
    }

    fn success(&self, message: &str) {
        self.messages.lock().expect("lock").push(format!("ok: {message}"));
    }

    fn warn(&self, message: &str) {
        self.messages.lock().expect("lock").push(format!("warn: {message}"));
    }
}
