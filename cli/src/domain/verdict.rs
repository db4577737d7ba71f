//! Pass/fail evaluation of captured remote test output.

use serde::Serialize;

use crate::domain::error::HarnessError;

/// Literal marker emitted by the Go test runner for any failing test.
pub const FAILURE_MARKER: &str = "FAIL";

/// Outcome of the remote test binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    /// Evaluate captured output: any occurrence of [`FAILURE_MARKER`] fails.
    #[must_use]
    pub fn from_output(output: &str) -> Self {
        if output.contains(FAILURE_MARKER) {
            Self::Failed
        } else {
            Self::Passed
        }
    }

    #[must_use]
    pub fn passed(self) -> bool {
        self == Self::Passed
    }
}

/// Everything observed from one remote test execution.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    /// Combined stdout and stderr, lossily decoded as UTF-8.
    pub output: String,
    /// Exit code of the remote process.
    pub exit_code: i32,
    pub verdict: Verdict,
}

impl TestOutcome {
    #[must_use]
    pub fn new(output: String, exit_code: i32) -> Self {
        let verdict = Verdict::from_output(&output);
        Self {
            output,
            exit_code,
            verdict,
        }
    }

    /// # Errors
    ///
    /// Returns `HarnessError::Assertion` when the verdict is `Failed`.
    pub fn ensure_passed(&self) -> Result<(), HarnessError> {
        if self.verdict.passed() {
            return Ok(());
        }
        Err(HarnessError::Assertion(format!(
            "remote test output contains \"{FAILURE_MARKER}\" (exit code {})",
            self.exit_code
        )))
    }
}
