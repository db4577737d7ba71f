//! JSON output for `--json` runs.
//!
//! A run prints exactly one object on stdout: either a [`RunSummary`] or an
//! error object from [`format_error`].

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::{TestOutcome, Verdict};

/// Result of a completed harness run.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub verdict: Verdict,
    pub exit_code: i32,
    pub remote_binary: &'a str,
    /// Path of the saved output log, when one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    pub output: &'a str,
}

impl<'a> RunSummary<'a> {
    #[must_use]
    pub fn new(outcome: &'a TestOutcome, remote_binary: &'a str, log_file: Option<String>) -> Self {
        Self {
            verdict: outcome.verdict,
            exit_code: outcome.exit_code,
            remote_binary,
            log_file,
            output: &outcome.output,
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("JSON serialization failed")
    }
}

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}
