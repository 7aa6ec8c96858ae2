//! # autogradescope
//!
//! Runs grading checks against a student submission and writes the
//! `results.json` Gradescope reads: one entry per check with its score,
//! visibility and a diagnostic students can act on, or a single explanation
//! when the run could not start at all.
//!
//! Checks are registered explicitly in a [`Suite`] together with the run's
//! [`Settings`]; a [`Session`] runs them one at a time, each under its own hard
//! deadline.
//!
//! ```no_run
//! use autogradescope::{CheckBody, CheckDefinition, Session, Settings, Suite, verify_eq};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let suite = Suite::new(Settings::new()).check(
//!     CheckDefinition::builder()
//!         .function_name("test_add")
//!         .body(CheckBody::blocking(|_| {
//!             verify_eq!(1 + 2, 3);
//!             Ok(())
//!         }))
//!         .build(),
//! );
//! let report = Session::from_suite(suite).run().await;
//! report.write_to("results.json".as_ref())?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Check descriptors, bodies, suites and the module trait
pub mod check;
/// Environment-driven harness configuration
pub mod config;
/// Doctest results as check outcomes
pub mod doctests;
/// Error taxonomy for loading a check module
pub mod error;
/// Diagnostics for failed checks
pub mod format;
/// JSON check modules made of shell commands
pub mod manifest;
/// Raised conditions and per-check outcomes
pub mod outcome;
/// Subprocess helpers
pub mod process;
/// The results document
pub mod report;
/// Running a suite
pub mod session;
/// Run-wide settings
pub mod settings;
/// Deadlines around checks
pub mod timeout;

pub use check::{
    CheckBody, CheckContext, CheckDefinition, CheckModule, CheckResult, SourceListing, Suite,
    TimeLimit,
};
pub use doctests::{DoctestFailure, DoctestSummary};
pub use error::{CollectionError, LoadError, SettingsError};
pub use manifest::ManifestModule;
pub use outcome::{FailureLocation, Outcome, Raised};
pub use report::{CheckReport, FatalReason, LeaderboardEntry, RunReport};
pub use session::Session;
pub use settings::{Leaderboard, Settings, Visibility};
pub use timeout::TimeoutExceeded;
