#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::PathBuf;

/// Comma-separated list of the visibility values Gradescope accepts, quoted.
pub(crate) const VALID_VISIBILITIES: &str =
    "'hidden', 'visible', 'after_published', or 'after_due_date'";

/// Instructor-side configuration problems. Always fatal: no check runs.
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    /// The loaded check module carried no settings at all.
    #[error("Check module is missing Settings.")]
    Missing,
    /// `default_visibility` (or a per-check visibility) is not a known value.
    #[error("default_visibility must be one of {VALID_VISIBILITIES}; got '{0}'")]
    InvalidVisibility(String),
    /// `default_weight` is negative or not a finite number.
    #[error("default_weight must be a finite, non-negative number; got {0}")]
    InvalidWeight(f64),
    /// `default_timeout` is zero, negative or not finite.
    #[error("default_timeout must be a positive number of seconds or \"none\"; got {0}")]
    InvalidTimeout(String),
    /// A leaderboard category was seeded with something other than a finite
    /// number.
    #[error("leaderboard category \"{name}\" must map to a finite number, not {value}")]
    InvalidLeaderboard {
        /// Category name.
        name:  String,
        /// The offending value, as written.
        value: String,
    },
    /// A field that the settings object does not have.
    #[error("Settings has no field named \"{0}\".")]
    UnknownField(String),
    /// A per-check override failed validation.
    #[error("Check `{check}` is misconfigured: {reason}")]
    InvalidCheck {
        /// Function name of the offending check.
        check:  String,
        /// What was wrong with it.
        reason: String,
    },
    /// The check module could not be read from disk.
    #[error("Could not read check module {}: {source}", path.display())]
    Unreadable {
        /// Path that was read.
        path:   PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The check module was read but is not well-formed.
    #[error("Check module {} is malformed: {message}", path.display())]
    Malformed {
        /// Path that was parsed.
        path:    PathBuf,
        /// Parser message, including line and column.
        message: String,
    },
}

/// Problems loading the submission or its dependencies. Fatal, and phrased
/// for the student since they are the one who can fix it.
#[derive(thiserror::Error, Debug)]
pub enum CollectionError {
    /// A file the checks expect was not submitted.
    #[error("The autograder expected a file named '{0}', but it does not exist.")]
    MissingSubmission(String),
    /// A program or package the submission needs is not installed.
    #[error("No module named '{0}'")]
    MissingDependency(String),
    /// Anything else that stopped the checks from being collected.
    #[error("{0}")]
    Other(String),
}

/// Why a [`crate::check::CheckModule`] failed to produce a suite.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    /// Settings were invalid while the module was being loaded.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The module itself (or the submission it imports) could not be loaded.
    #[error(transparent)]
    Collection(#[from] CollectionError),
}
