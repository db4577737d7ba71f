//! `TerminalReporter`: Presentation-layer implementation of `ProgressReporter`.
//!
//! Wraps `&OutputContext` and implements the `application::ports::ProgressReporter`
//! trait so application services can emit progress events without depending on
//! any presentation type directly.

use std::cell::RefCell;

use indicatif::ProgressBar;
use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::{OutputContext, progress};

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// On a TTY each `step()` shows a spinner that the next `success()` or
/// `warn()` replaces with `✓` / `⚠`. Elsewhere lines are printed as
/// `"  → {message}"`, `"  ✓ {message}"` and `"  ⚠ {message}"`. Nothing is
/// printed when `ctx.quiet`.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    active: RefCell<Option<ProgressBar>>,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            active: RefCell::new(None),
        }
    }

    fn finish(&self, symbol: String, message: &str) -> bool {
        match self.active.borrow_mut().take() {
            Some(pb) => {
                progress::finish_with(&pb, &symbol, message);
                true
            }
            None => false,
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        if let Some(previous) = self.active.borrow_mut().take() {
            previous.finish_and_clear();
        }
        if self.ctx.show_progress() {
            *self.active.borrow_mut() = Some(progress::spinner(message));
        } else {
            println!("  {} {message}", "→".style(self.ctx.styles.step));
        }
    }

    fn success(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        let symbol = "✓".style(self.ctx.styles.success).to_string();
        if !self.finish(symbol.clone(), message) {
            println!("  {symbol} {message}");
        }
    }

    fn warn(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        let symbol = "⚠".style(self.ctx.styles.warning).to_string();
        if !self.finish(symbol.clone(), message) {
            println!("  {symbol} {message}");
        }
    }
}

impl Drop for TerminalReporter<'_> {
    fn drop(&mut self) {
        if let Some(pb) = self.active.get_mut().take() {
            pb.finish_and_clear();
        }
    }
}
