#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # autogradescope
//!
//! Grades a submission described by a JSON check manifest and writes
//! Gradescope's `results.json`.

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use autogradescope::{ManifestModule, Session, config};
use bpaf::*;
use dotenvy::dotenv;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Run every check in a manifest
    Run {
        /// Path to the manifest
        manifest: PathBuf,
        /// Where to write the results instead of the configured path
        results:  Option<PathBuf>,
        /// Skip the overview table
        no_table: bool,
    },
    /// Load and validate a manifest without running it
    Validate {
        /// Path to the manifest
        manifest: PathBuf,
    },
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the manifest path
    fn m() -> impl Parser<PathBuf> {
        positional("MANIFEST").help("Path to the JSON check manifest")
    }

    let manifest = m();
    let results = long("results")
        .short('r')
        .help("Write results.json here instead of the configured location")
        .argument::<PathBuf>("PATH")
        .optional();
    let no_table = long("no-table")
        .help("Do not print the grading overview")
        .switch();

    let run = construct!(Cmd::Run {
        no_table,
        results,
        manifest
    })
    .to_options()
    .command("run")
    .help("Run the checks in a manifest and write results.json");

    let manifest = m();
    let validate = construct!(Cmd::Validate { manifest })
        .to_options()
        .command("validate")
        .help("Check that a manifest loads without running it");

    let cmd = construct!([run, validate]);

    cmd.to_options()
        .descr("Gradescope autograder harness")
        .run()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    let config = config::ensure_initialized()?;

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let filter_layer = LevelFilter::from_level(config.log_level());
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let cmd = options();

    match cmd {
        Cmd::Run {
            manifest,
            results,
            no_table,
        } => {
            let path = results.unwrap_or_else(|| config.results_path().to_path_buf());
            let report = Session::from_module(&ManifestModule::new(&manifest))
                .run_and_write(&path)
                .await
                .with_context(|| format!("Failed to grade with {}", manifest.display()))?;

            if config.show_table() && !no_table {
                eprintln!("{}", report.overview_table());
            }
            if let Some(output) = report.fatal_output() {
                eprintln!("{output}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Validate { manifest } => {
            match Session::from_module(&ManifestModule::new(&manifest)).validate() {
                Ok(count) => {
                    println!("{}: {count} checks", manifest.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(report) => {
                    eprintln!("{}", report.fatal_output().unwrap_or_default());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
