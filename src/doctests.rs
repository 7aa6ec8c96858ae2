#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turning doctest results into a check outcome.
//!
//! Running doctests is someone else's job; a check hands over the counts and
//! gets back a condition the formatter knows how to present.

use crate::outcome::Raised;

/// Counts produced by a doctest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoctestSummary {
    /// Examples that were executed.
    pub attempted: usize,
    /// Examples whose output did not match.
    pub failed:    usize,
}

impl DoctestSummary {
    /// Creates a summary.
    pub fn new(attempted: usize, failed: usize) -> Self {
        Self { attempted, failed }
    }
}

/// Raised when any doctest failed. The message is meant to be read on its own,
/// so diagnostics for it leave out the check's source.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Your code ran, but some of the doctests failed. Make sure to\ncheck the doctests by running \
     them on your own machine."
)]
pub struct DoctestFailure {
    /// The summary that triggered the failure.
    summary: DoctestSummary,
}

impl DoctestFailure {
    /// Counts behind this failure.
    pub fn summary(&self) -> DoctestSummary {
        self.summary
    }
}

/// Runs `doctests` and fails the check if any of them failed.
pub fn run(doctests: impl FnOnce() -> DoctestSummary) -> Result<(), Raised> {
    check(doctests())
}

/// Fails the check if `summary` records any failure.
pub fn check(summary: DoctestSummary) -> Result<(), Raised> {
    if summary.failed > 0 {
        tracing::info!(
            attempted = summary.attempted,
            failed = summary.failed,
            "doctests failed"
        );
        Err(DoctestFailure { summary }.into())
    } else {
        Ok(())
    }
}
