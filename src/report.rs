#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The `results.json` document Gradescope reads.
//!
//! A run produces exactly one of two shapes: per-check results (optionally
//! with leaderboard entries), or a single top-level error with a zero score.
//! Gradescope tells them apart by the presence of `tests`.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use bon::Builder;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};
use uuid::Uuid;

use crate::settings::Visibility;

/// Represents an individual test case.
#[derive(Serialize, Debug, Clone, PartialEq, Builder)]
pub struct CheckReport {
    /// Name of the check.
    #[builder(into)]
    pub name:       String,
    /// When students get to see this result.
    pub visibility: Visibility,
    /// Points this check adds to the maximum; zero for extra credit.
    pub max_score:  f64,
    /// Points earned.
    pub score:      f64,
    /// Diagnostic for a failed check, empty otherwise.
    #[builder(into, default)]
    pub output:     String,
}

/// Represents an entry in the leaderboard.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    /// Name of the leaderboard metric.
    pub name:  String,
    /// Value of the leaderboard metric.
    pub value: f64,
}

/// Per-check results of a run that got to execute its checks.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SuccessReport {
    /// One entry per collected check, in collection order.
    pub tests:       Vec<CheckReport>,
    /// Leaderboard entries in insertion order; absent when disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
}

/// Why a run could not produce per-check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    /// The settings (or check overrides) are invalid or missing.
    Misconfigured,
    /// The submission or a dependency could not be loaded.
    CollectionFailed,
    /// The check module contained no checks.
    NoChecks,
}

/// A run that never got to execute its checks.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FatalReport {
    /// Category of failure. Not part of the wire format; consumers there
    /// only see the message.
    #[serde(skip)]
    pub reason:            FatalReason,
    /// Always zero.
    pub score:             u32,
    /// Always visible, so students see the explanation.
    pub stdout_visibility: Visibility,
    /// Explanation of what went wrong.
    pub output:            String,
}

/// Represents the overall submission data.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RunReport {
    /// Checks ran.
    Success(SuccessReport),
    /// Checks did not run.
    Fatal(FatalReport),
}

impl RunReport {
    /// Builds a fatal report with the standard message for `reason`.
    /// `detail` is appended for misconfiguration and collection failures.
    pub fn fatal(reason: FatalReason, detail: impl std::fmt::Display) -> Self {
        let output = match reason {
            FatalReason::Misconfigured => format!(
                "The autograder appears to be misconfigured. Contact the instructor to let them \
                 know about this problem. The full error message is shown below.\n\n{detail}"
            ),
            FatalReason::CollectionFailed => format!(
                "The autograder ran into a problem when starting. This usually happens for one of \
                 two reasons: 1) Your submission is incorrectly named (check the spelling); 2) \
                 Your code is importing a module which does not exist on Gradescope. The exact \
                 cause is shown below.\n\n{detail}"
            ),
            FatalReason::NoChecks => "The autograder did not find any tests to run. This usually \
                                      happens when the test module is missing or the module is \
                                      empty."
                .to_string(),
        };

        RunReport::Fatal(FatalReport {
            reason,
            score: 0,
            stdout_visibility: Visibility::Visible,
            output,
        })
    }

    /// Whether checks failed to run at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunReport::Fatal(_))
    }

    /// The fatal category, if this is a fatal report.
    pub fn fatal_reason(&self) -> Option<FatalReason> {
        match self {
            RunReport::Fatal(fatal) => Some(fatal.reason),
            RunReport::Success(_) => None,
        }
    }

    /// Per-check reports; empty for a fatal report.
    pub fn tests(&self) -> &[CheckReport] {
        match self {
            RunReport::Success(success) => &success.tests,
            RunReport::Fatal(_) => &[],
        }
    }

    /// Leaderboard entries, if the run has any.
    pub fn leaderboard(&self) -> Option<&[LeaderboardEntry]> {
        match self {
            RunReport::Success(success) => success.leaderboard.as_deref(),
            RunReport::Fatal(_) => None,
        }
    }

    /// The top-level message of a fatal report.
    pub fn fatal_output(&self) -> Option<&str> {
        match self {
            RunReport::Fatal(fatal) => Some(&fatal.output),
            RunReport::Success(_) => None,
        }
    }

    /// Earned and attainable points over all checks.
    pub fn totals(&self) -> (f64, f64) {
        self.tests()
            .iter()
            .fold((0f64, 0f64), |acc, r| (acc.0 + r.score, acc.1 + r.max_score))
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize results")
    }

    /// Writes the report to `path`. The file is written under a temporary
    /// name and renamed into place, so readers never see a partial report.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }

        let file_name = path
            .file_name()
            .with_context(|| format!("{} does not name a file", path.display()))?
            .to_string_lossy();
        let staging = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let written = fs::write(&staging, self.to_json()?)
            .with_context(|| format!("Could not write {}", staging.display()))
            .and_then(|()| {
                fs::rename(&staging, path).with_context(|| {
                    format!("Could not move {} into place at {}", staging.display(), path.display())
                })
            });
        if written.is_err() {
            let _ = fs::remove_file(&staging);
        }
        written?;

        tracing::info!("Wrote results to {}", path.display());
        Ok(())
    }

    /// Renders a table summarizing the run for a terminal.
    pub fn overview_table(&self) -> String {
        let success = match self {
            RunReport::Success(success) => success,
            RunReport::Fatal(fatal) => {
                return Table::new([OverviewRow {
                    name:       "(run did not start)".to_string(),
                    visibility: fatal.stdout_visibility.to_string(),
                    score:      "0.00/0.00".to_string(),
                    status:     "FATAL",
                }])
                .with(Panel::header("Grading Overview"))
                .with(Style::modern())
                .to_string();
            }
        };

        let (grade, out_of) = self.totals();
        let rows = success.tests.iter().map(|test| OverviewRow {
            name:       test.name.clone(),
            visibility: test.visibility.to_string(),
            score:      format!("{:.2}/{:.2}", test.score, test.max_score),
            status:     if test.output.is_empty() { "passed" } else { "failed" },
        });

        let mut table = Table::new(rows)
            .with(Panel::header("Grading Overview"))
            .with(Panel::footer(format!("Total: {grade:.2}/{out_of:.2}")))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(32).keep_words(true)))
            .with(
                Modify::new(Rows::first())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(
                Modify::new(Rows::last())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(Style::modern())
            .to_string();

        if let Some(entries) = &success.leaderboard
            && !entries.is_empty()
        {
            let board = entries
                .iter()
                .map(|entry| format!("{}: {}", entry.name, entry.value))
                .collect::<Vec<_>>()
                .join("\n");
            table.push_str("\n\nLeaderboard\n");
            table.push_str(&board);
        }

        table
    }
}

/// A row of the terminal overview.
#[derive(Tabled)]
struct OverviewRow {
    /// Check name.
    #[tabled(rename = "Check")]
    name:       String,
    /// Visibility setting.
    #[tabled(rename = "Visibility")]
    visibility: String,
    /// `score/max_score`.
    #[tabled(rename = "Score")]
    score:      String,
    /// Whether the check passed.
    #[tabled(rename = "Status")]
    status:     &'static str,
}
