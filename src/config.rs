#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Harness configuration read from the environment (and `.env`, which the
//! binary loads first).

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use anyhow::{Context, Result, bail};
use tracing::Level;

/// Where Gradescope expects the results file.
pub const GRADESCOPE_RESULTS_PATH: &str = "/autograder/results/results.json";

/// Where results go in debug mode.
pub const DEBUG_RESULTS_PATH: &str = "./results.json";

/// Runtime configuration shared across the crate.
#[derive(Debug, Clone)]
pub struct ConfigState {
    /// Destination of `results.json`.
    results_path: PathBuf,
    /// Whether the overview table is printed after a run.
    show_table:   bool,
    /// Log level for the binary's subscriber.
    log_level:    Level,
}

impl ConfigState {
    /// Construct a new configuration instance from the environment.
    fn new() -> Result<Self> {
        let debug = read_flag("AUTOGRADESCOPE_DEBUG")?.unwrap_or(false);
        let results_path = match std::env::var("AUTOGRADESCOPE_RESULTS_PATH") {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
            _ if debug => PathBuf::from(DEBUG_RESULTS_PATH),
            _ => PathBuf::from(GRADESCOPE_RESULTS_PATH),
        };

        let show_table = read_flag("AUTOGRADESCOPE_SHOW_TABLE")?.unwrap_or(true);
        let log_level = match std::env::var("AUTOGRADESCOPE_LOG") {
            Ok(level) if !level.trim().is_empty() => level
                .trim()
                .parse::<Level>()
                .with_context(|| format!("AUTOGRADESCOPE_LOG has an unknown level: {level}"))?,
            _ => Level::INFO,
        };

        Ok(Self {
            results_path,
            show_table,
            log_level,
        })
    }

    /// Returns the results destination.
    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    /// Returns whether the overview table should be printed.
    pub fn show_table(&self) -> bool {
        self.show_table
    }

    /// Returns the configured log level.
    pub fn log_level(&self) -> Level {
        self.log_level
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone, Debug)]
pub struct ConfigHandle(Arc<ConfigState>);

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Ensure the global configuration has been initialized and return a handle.
pub fn ensure_initialized() -> Result<ConfigHandle> {
    let mut guard = slot().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(cfg) = guard.as_ref() {
        return Ok(ConfigHandle(Arc::clone(cfg)));
    }

    let cfg = Arc::new(ConfigState::new()?);
    *guard = Some(Arc::clone(&cfg));
    Ok(ConfigHandle(cfg))
}

/// Parses a boolean environment variable; `None` when unset or empty.
fn read_flag(env: &str) -> Result<Option<bool>> {
    let Ok(value) = std::env::var(env) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => bail!("{env} must be true or false, not {other:?}"),
    }
}
