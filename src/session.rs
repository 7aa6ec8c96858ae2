#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Drives a grading run from a loaded suite to a finished report.

use std::{path::Path, sync::Arc, time::Instant};

use anyhow::Result;

use crate::{
    check::{CheckBody, CheckContext, CheckDefinition, CheckModule, Suite, TimeLimit},
    error::{CollectionError, LoadError, SettingsError},
    format,
    outcome::{Outcome, Raised},
    report::{CheckReport, FatalReason, LeaderboardEntry, RunReport, SuccessReport},
    settings::{Settings, validate_limit, validate_weight},
    timeout::{Interrupted, run_future_with_deadline, run_with_deadline},
};

/// A single grading run.
///
/// The session is handed whatever a check module produced, settings included;
/// it never goes looking for configuration on its own.
#[derive(Debug)]
pub struct Session {
    /// The suite, or why it could not be loaded.
    loaded: Result<Suite, LoadError>,
}

/// A suite that passed validation and is ready to run.
#[derive(Debug)]
struct Prepared {
    /// Settings every check falls back on.
    settings: Settings,
    /// Checks in collection order.
    checks:   Vec<CheckDefinition>,
}

impl Session {
    /// Creates a session from the result of loading a check module.
    pub fn new(loaded: Result<Suite, LoadError>) -> Self {
        Self { loaded }
    }

    /// Creates a session for an already built suite.
    pub fn from_suite(suite: Suite) -> Self {
        Self::new(Ok(suite))
    }

    /// Loads `module` and creates a session for whatever it produced.
    pub fn from_module(module: &impl CheckModule) -> Self {
        Self::new(module.load())
    }

    /// Validates the suite without running anything. Returns the number of
    /// checks, or the fatal report a run would have produced.
    pub fn validate(self) -> Result<usize, RunReport> {
        prepare(self.loaded).map(|prepared| prepared.checks.len())
    }

    /// Runs every check in order and assembles the report.
    ///
    /// Must be called from within a tokio runtime with timers enabled.
    pub async fn run(self) -> RunReport {
        let Prepared { settings, checks } = match prepare(self.loaded) {
            Ok(prepared) => prepared,
            Err(report) => return report,
        };

        tracing::info!("Running {} checks", checks.len());

        let mut tests = Vec::with_capacity(checks.len());
        for check in &checks {
            let outcome = run_check(check, &settings).await;
            tests.push(assemble(check, &outcome, &settings));
        }

        let leaderboard = settings.leaderboard().map(|board| {
            board
                .snapshot()
                .into_iter()
                .map(|(name, value)| LeaderboardEntry { name, value })
                .collect()
        });

        RunReport::Success(SuccessReport { tests, leaderboard })
    }

    /// Runs the session and writes the report to `path`.
    pub async fn run_and_write(self, path: &Path) -> Result<RunReport> {
        let report = self.run().await;
        report.write_to(path)?;
        Ok(report)
    }
}

/// Applies the fatal-error rules in order. The first one that matches decides
/// the report.
fn prepare(loaded: Result<Suite, LoadError>) -> Result<Prepared, RunReport> {
    let suite = loaded.map_err(|err| match err {
        LoadError::Settings(err) => misconfigured(&err),
        LoadError::Collection(err) => collection_failed(&err),
    })?;

    let (settings, checks) = suite.into_parts();
    let settings = settings.ok_or_else(|| misconfigured(&SettingsError::Missing))?;

    let unusable_seed = settings.leaderboard().and_then(|board| {
        board
            .snapshot()
            .into_iter()
            .find(|(_, value)| !value.is_finite())
    });
    if let Some((name, value)) = unusable_seed {
        return Err(misconfigured(&SettingsError::InvalidLeaderboard {
            name,
            value: value.to_string(),
        }));
    }

    if checks.is_empty() {
        tracing::warn!("No checks were collected");
        return Err(RunReport::fatal(FatalReason::NoChecks, ""));
    }

    for check in &checks {
        validate_overrides(check).map_err(|err| misconfigured(&err))?;
    }

    Ok(Prepared { settings, checks })
}

/// Checks the per-check overrides the same way settings are checked.
fn validate_overrides(check: &CheckDefinition) -> Result<(), SettingsError> {
    let invalid = |err: SettingsError| SettingsError::InvalidCheck {
        check:  check.function_name().to_string(),
        reason: err.to_string(),
    };

    if let Some(weight) = check.weight() {
        validate_weight(weight).map_err(invalid)?;
    }
    if let Some(TimeLimit::Limited(limit)) = check.timeout() {
        validate_limit(limit).map_err(invalid)?;
    }
    Ok(())
}

/// The fatal report for a configuration problem.
fn misconfigured(err: &SettingsError) -> RunReport {
    tracing::warn!("Autograder is misconfigured: {err}");
    RunReport::fatal(FatalReason::Misconfigured, err)
}

/// The fatal report for a submission that could not be loaded.
fn collection_failed(err: &CollectionError) -> RunReport {
    tracing::warn!("Could not collect checks: {err}");
    RunReport::fatal(FatalReason::CollectionFailed, err)
}

/// Runs one check under its deadline and records what happened.
async fn run_check(check: &CheckDefinition, settings: &Settings) -> Outcome {
    let limit = check.effective_timeout(settings);
    let ctx = CheckContext::new(settings.leaderboard().cloned());
    let started = Instant::now();

    let result = match check.body() {
        CheckBody::Blocking(body) => {
            let body = Arc::clone(body);
            let worker_ctx = ctx.clone();
            run_with_deadline(limit, move || body(&worker_ctx)).await
        }
        CheckBody::Future(factory) => run_future_with_deadline(limit, factory(ctx.clone())).await,
    };
    let elapsed = started.elapsed();

    let raised = match result {
        Ok(Ok(())) => None,
        Ok(Err(raised)) => Some(raised),
        Err(Interrupted::Timeout(exceeded)) => {
            ctx.cancel();
            Some(Raised::Timeout(exceeded))
        }
        Err(Interrupted::Panicked(panicked)) => {
            Some(Raised::from_panic(panicked.message, panicked.location))
        }
        Err(other) => Some(Raised::Unexpected {
            description: format!("HarnessError({:?})", other.to_string()),
            location:    None,
        }),
    };

    match raised {
        None => {
            tracing::info!("{} passed in {:.2?}", check.name(), elapsed);
            Outcome::passed(elapsed)
        }
        Some(raised) => {
            tracing::info!("{} failed in {:.2?}: {}", check.name(), elapsed, raised);
            Outcome::failed_with(raised, elapsed)
        }
    }
}

/// Builds the report entry for one check.
fn assemble(check: &CheckDefinition, outcome: &Outcome, settings: &Settings) -> CheckReport {
    let weight = check.effective_weight(settings);
    let max_score = if check.is_extra_credit() { 0.0 } else { weight };

    let (score, output) = if outcome.failed() {
        let rendered = format::render(check, outcome);
        let output = match settings.failure_message() {
            Some(formatter) => formatter(check, outcome, &rendered),
            None => rendered,
        };
        (0.0, output)
    } else {
        (weight, String::new())
    };

    CheckReport::builder()
        .name(check.name())
        .visibility(check.effective_visibility(settings))
        .max_score(max_score)
        .score(score)
        .output(output)
        .build()
}
