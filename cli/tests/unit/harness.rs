//! Harness run ordering and teardown guarantees over mocked ports.

#![allow(clippy::expect_used)]

use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;
use winvm_e2e::application::services::harness::{Harness, HarnessSettings};
use winvm_e2e::application::services::remote_access::ReadinessPolicy;
use winvm_e2e::commands::run::run_harness;
use winvm_e2e::domain::{HarnessError, Verdict};

use crate::mocks::{Event, EventLog, MockProvisioner, MockSessions, RecordingReporter};

const PASSING_OUTPUT: &str = "=== RUN   TestBootstrap\n--- PASS: TestBootstrap (1.20s)\nPASS\n";
const FAILING_OUTPUT: &str = "=== RUN   TestBootstrap\n--- FAIL: TestBootstrap (0.40s)\nFAIL\n";

fn test_binary() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tempfile");
    file.write_all(b"MZ\x90\x00fake-pe").expect("write");
    file
}

fn settings(binary: PathBuf) -> HarnessSettings {
    let mut settings = HarnessSettings::new(binary);
    settings.readiness = ReadinessPolicy {
        timeout: Duration::from_millis(200),
        interval: Duration::from_millis(1),
    };
    settings
}

#[tokio::test]
async fn passing_run_creates_and_destroys_exactly_once() {
    let log = EventLog::default();
    let binary = test_binary();
    let provisioner = MockProvisioner::new(&log);
    let sessions = MockSessions::new(&log, PASSING_OUTPUT);
    let reporter = RecordingReporter::default();

    let outcome = run_harness(
        &provisioner,
        &sessions,
        &reporter,
        settings(binary.path().to_path_buf()),
    )
    .await
    .into_result()
    .expect("run succeeds");

    assert_eq!(outcome.verdict, Verdict::Passed);
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.output.contains("--- PASS: TestBootstrap"));
    assert_eq!(log.count(&Event::CreateVm), 1);
    assert_eq!(log.count(&Event::DestroyVm), 1);
    assert_eq!(log.events().last(), Some(&Event::DestroyVm));
}

#[tokio::test]
async fn failing_tests_are_an_outcome_not_an_error() {
    let log = EventLog::default();
    let binary = test_binary();
    let provisioner = MockProvisioner::new(&log);
    let sessions = MockSessions::new(&log, FAILING_OUTPUT);
    let reporter = RecordingReporter::default();

    let outcome = run_harness(
        &provisioner,
        &sessions,
        &reporter,
        settings(binary.path().to_path_buf()),
    )
    .await
    .into_result()
    .expect("harness itself succeeds");

    assert_eq!(outcome.verdict, Verdict::Failed);
    assert_eq!(outcome.exit_code, 1);
    let err = outcome.ensure_passed().expect_err("FAIL in output");
    assert!(matches!(err, HarnessError::Assertion(_)));
    assert_eq!(log.count(&Event::CreateVm), 1);
    assert_eq!(log.count(&Event::DestroyVm), 1);
}

#[tokio::test]
async fn exit_code_alone_does_not_fail_the_run() {
    let log = EventLog::default();
    let binary = test_binary();
    let provisioner = MockProvisioner::new(&log);
    let mut sessions = MockSessions::new(&log, PASSING_OUTPUT);
    sessions.shell.test_exit_code = 3;
    let reporter = RecordingReporter::default();

    let outcome = run_harness(
        &provisioner,
        &sessions,
        &reporter,
        settings(binary.path().to_path_buf()),
    )
    .await
    .into_result()
    .expect("run");

    assert_eq!(outcome.exit_code, 3);
    assert!(outcome.verdict.passed());
}

#[tokio::test]
async fn remote_dir_is_created_before_upload_and_upload_closed_before_exec() {
    let log = EventLog::default();
    let binary = test_binary();
    let provisioner = MockProvisioner::new(&log);
    let sessions = MockSessions::new(&log, PASSING_OUTPUT);
    let reporter = RecordingReporter::default();

    run_harness(
        &provisioner,
        &sessions,
        &reporter,
        settings(binary.path().to_path_buf()),
    )
    .await
    .into_result()
    .expect("run");

    let mkdir = log
        .position(|e| matches!(e, Event::Run(c) if c.contains("New-Item -ItemType Directory")))
        .expect("mkdir ran");
    let sshd = log
        .position(|e| matches!(e, Event::Run(c) if c.ends_with("Start-Service sshd")))
        .expect("sshd started");
    let upload = log
        .position(|e| matches!(e, Event::Upload(_)))
        .expect("upload");
    let close = log
        .position(|e| *e == Event::CloseTransfer)
        .expect("close");
    let exec = log
        .position(|e| matches!(e, Event::Run(c) if c.contains("--test.v")))
        .expect("exec");

    assert!(sshd < mkdir);
    assert!(mkdir < upload);
    assert!(upload < close);
    assert!(close < exec);
    assert!(log.events().contains(&Event::Upload(r"C:\Temp\wmcb_unit_test.exe".to_string())));
}

#[tokio::test]
async fn missing_binary_fails_transfer_and_still_tears_down() {
    let log = EventLog::default();
    let provisioner = MockProvisioner::new(&log);
    let sessions = MockSessions::new(&log, PASSING_OUTPUT);
    let reporter = RecordingReporter::default();
    let harness = Harness::new(
        &provisioner,
        &sessions,
        &reporter,
        settings(PathBuf::from("/nonexistent/wmcb_unit_test.exe")),
    );

    let err = harness.run().await.expect_err("missing binary");

    assert!(matches!(err, HarnessError::Transfer(_)), "{err:?}");
    assert!(!log.ran("--test.v"));
    assert_eq!(log.count(&Event::CloseTransfer), 1);
    assert_eq!(log.count(&Event::DestroyVm), 1);
}

#[tokio::test]
async fn empty_binary_path_is_a_transfer_error() {
    let log = EventLog::default();
    let provisioner = MockProvisioner::new(&log);
    let sessions = MockSessions::new(&log, PASSING_OUTPUT);
    let reporter = RecordingReporter::default();
    let harness = Harness::new(&provisioner, &sessions, &reporter, settings(PathBuf::new()));

    let err = harness.run().await.expect_err("empty path");

    assert!(matches!(err, HarnessError::Transfer(_)), "{err:?}");
    assert!(log.position(|e| matches!(e, Event::Upload(_))).is_none());
    assert_eq!(log.count(&Event::DestroyVm), 1);
}

#[tokio::test]
async fn provisioning_failure_still_tears_down() {
    let log = EventLog::default();
    let binary = test_binary();
    let mut provisioner = MockProvisioner::new(&log);
    provisioner.fail_create = true;
    let sessions = MockSessions::new(&log, PASSING_OUTPUT);
    let reporter = RecordingReporter::default();

    let err = run_harness(
        &provisioner,
        &sessions,
        &reporter,
        settings(binary.path().to_path_buf()),
    )
    .await
    .into_result()
    .expect_err("create fails");

    assert_eq!(err.kind(), "provisioning");
    assert_eq!(log.events(), vec![Event::CreateVm, Event::DestroyVm]);
}

#[tokio::test]
async fn failed_setup_step_stops_before_transfer() {
    let log = EventLog::default();
    let binary = test_binary();
    let provisioner = MockProvisioner::new(&log);
    let mut sessions = MockSessions::new(&log, PASSING_OUTPUT);
    sessions.shell.fail_matching = Some("Install-Module");
    let reporter = RecordingReporter::default();

    let err = run_harness(
        &provisioner,
        &sessions,
        &reporter,
        settings(binary.path().to_path_buf()),
    )
    .await
    .into_result()
    .expect_err("setup fails");

    assert!(matches!(err, HarnessError::RemoteExecution(_)), "{err:?}");
    assert!(err.to_string().contains("Access is denied"), "{err}");
    assert_eq!(log.count(&Event::TransferSession), 0);
    assert_eq!(log.count(&Event::DestroyVm), 1);
}

#[tokio::test]
async fn transfer_session_failure_is_a_transfer_error() {
    let log = EventLog::default();
    let binary = test_binary();
    let provisioner = MockProvisioner::new(&log);
    let mut sessions = MockSessions::new(&log, PASSING_OUTPUT);
    sessions.fail_transfer_session = true;
    let reporter = RecordingReporter::default();

    let err = run_harness(
        &provisioner,
        &sessions,
        &reporter,
        settings(binary.path().to_path_buf()),
    )
    .await
    .into_result()
    .expect_err("ssh refused");

    assert_eq!(err.kind(), "transfer");
    assert!(!log.ran("--test.v"));
    assert_eq!(log.count(&Event::DestroyVm), 1);
}

#[tokio::test]
async fn teardown_error_is_returned_when_run_succeeded() {
    let log = EventLog::default();
    let binary = test_binary();
    let mut provisioner = MockProvisioner::new(&log);
    provisioner.fail_destroy = true;
    let sessions = MockSessions::new(&log, PASSING_OUTPUT);
    let reporter = RecordingReporter::default();

    let err = run_harness(
        &provisioner,
        &sessions,
        &reporter,
        settings(binary.path().to_path_buf()),
    )
    .await
    .into_result()
    .expect_err("teardown fails");

    assert!(matches!(err, HarnessError::Teardown(_)), "{err:?}");
    assert!(log.ran("--test.v"));
}

#[tokio::test]
async fn earlier_error_wins_over_teardown_error() {
    let log = EventLog::default();
    let mut provisioner = MockProvisioner::new(&log);
    provisioner.fail_create = true;
    provisioner.fail_destroy = true;
    let sessions = MockSessions::new(&log, PASSING_OUTPUT);
    let reporter = RecordingReporter::default();

    let err = run_harness(&provisioner, &sessions, &reporter, settings(PathBuf::new()))
        .await
        .into_result()
        .expect_err("both fail");

    assert!(matches!(err, HarnessError::Provisioning(_)), "{err:?}");
    let warnings = reporter.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("throttled"), "{warnings:?}");
}

#[tokio::test]
async fn outcome_survives_a_failed_teardown() {
    let log = EventLog::default();
    let binary = test_binary();
    let mut provisioner = MockProvisioner::new(&log);
    provisioner.fail_destroy = true;
    let sessions = MockSessions::new(&log, FAILING_OUTPUT);
    let reporter = RecordingReporter::default();

    let run_report = run_harness(
        &provisioner,
        &sessions,
        &reporter,
        settings(binary.path().to_path_buf()),
    )
    .await;

    let outcome = run_report.outcome().expect("test binary ran");
    assert_eq!(outcome.verdict, Verdict::Failed);
    assert!(outcome.output.contains("--- FAIL: TestBootstrap"));
    assert!(matches!(run_report.teardown, Err(HarnessError::Teardown(_))));
    assert_eq!(log.count(&Event::DestroyVm), 1);
}
