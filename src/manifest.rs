#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! A check module described in JSON, whose checks are shell commands.
//!
//! ```json
//! {
//!   "settings": { "default_visibility": "visible", "default_timeout": 60 },
//!   "submission": ["submission.py"],
//!   "requires": ["python3"],
//!   "collect": ["python3", "-c", "import submission"],
//!   "checks": [
//!     { "name": "test_add", "description": "Adds two numbers",
//!       "run": ["python3", "-c", "import submission; assert submission.add(1, 2) == 3"],
//!       "weight": 2 }
//!   ]
//! }
//! ```
//!
//! Relative paths resolve against the manifest's directory, which is also the
//! working directory of every command.
//!
//! `collect` runs once while loading. If it cannot import the submission the
//! whole run is a collection failure instead of a column of failed checks.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;
use similar::{ChangeTag, TextDiff};

use crate::{
    check::{
        CheckBody, CheckContext, CheckDefinition, CheckModule, CheckResult, SourceListing, Suite,
        TimeLimit,
    },
    doctests::{self, DoctestSummary},
    error::{CollectionError, LoadError, SettingsError},
    outcome::Raised,
    process::{self, Collected, ProcessError, StdinSource},
    settings::{Settings, SettingsSpec, TimeLimitSpec, Visibility},
    timeout::TimeoutExceeded,
};

/// Prefix of stdout lines that record a leaderboard score.
const LEADERBOARD_PREFIX: &str = "leaderboard:";

/// How many trailing stderr lines a failed command reports.
const STDERR_TAIL_LINES: usize = 20;

/// Marker Python prints when an import fails.
const MISSING_MODULE_MARKER: &str = "No module named '";

/// The manifest as written.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ManifestSpec {
    /// Run-wide settings; a manifest without them is misconfigured.
    settings:   Option<SettingsSpec>,
    /// Files the student must submit.
    #[serde(default)]
    submission: Vec<String>,
    /// Programs that must be installed.
    #[serde(default)]
    requires:   Vec<String>,
    /// Command that loads the submission before any check runs.
    collect:    Option<Vec<String>>,
    /// Checks in the order they run.
    #[serde(default)]
    checks:     Vec<CommandCheckSpec>,
}

/// One check as written.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct CommandCheckSpec {
    /// Function-style name, used when there is no description.
    name:            String,
    /// Description; its first line names the check.
    description:     Option<String>,
    /// Program and arguments.
    run:             Vec<String>,
    /// Text fed to stdin.
    stdin:           Option<String>,
    /// Exact stdout the command must produce.
    expected_stdout: Option<String>,
    /// A failing exit means the doctests failed.
    #[serde(default)]
    doctest:         bool,
    /// Weight override.
    weight:          Option<f64>,
    /// Visibility override.
    visibility:      Option<String>,
    /// Time limit override: seconds or `"none"`.
    timeout:         Option<TimeLimitSpec>,
    /// Extra-credit flag.
    #[serde(default)]
    extra_credit:    bool,
}

/// Loads checks from a JSON manifest on disk.
#[derive(Debug, Clone)]
pub struct ManifestModule {
    /// Path of the manifest file.
    path: PathBuf,
}

impl ManifestModule {
    /// A module backed by the manifest at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory relative paths resolve against.
    fn base_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Reads and parses the manifest.
    fn read(&self) -> Result<ManifestSpec, SettingsError> {
        let text = fs::read_to_string(&self.path).map_err(|source| SettingsError::Unreadable {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|err| SettingsError::Malformed {
            path:    self.path.clone(),
            message: err.to_string(),
        })
    }
}

impl CheckModule for ManifestModule {
    fn load(&self) -> Result<Suite, LoadError> {
        let spec = self.read()?;
        let base = self.base_dir();

        let Some(settings) = spec.settings else {
            return Ok(Suite::without_settings());
        };
        let settings = Settings::try_from(settings)?;

        for program in &spec.requires {
            if which::which(program).is_err() {
                return Err(CollectionError::MissingDependency(program.clone()).into());
            }
        }
        for file in &spec.submission {
            if !base.join(file).exists() {
                return Err(CollectionError::MissingSubmission(file.clone()).into());
            }
        }
        if let Some(command) = spec.collect {
            if command.is_empty() {
                return Err(SettingsError::Malformed {
                    path:    self.path.clone(),
                    message: "`collect` must name a program".to_string(),
                }
                .into());
            }
            collect(command, &base, settings.default_timeout())?;
        }

        let mut suite = Suite::new(settings);
        for check in spec.checks {
            suite.push(command_check(check, &base)?);
        }

        tracing::info!(
            "Loaded {} checks from {}",
            suite.checks().len(),
            self.path.display()
        );
        Ok(suite)
    }
}

/// Runs the `collect` command to completion and turns a failed import into a
/// collection error.
///
/// Loading is synchronous, so the command is driven by a runtime of its own on
/// a separate thread; the caller may already be inside one.
fn collect(
    command: Vec<String>,
    base: &Path,
    limit: Option<Duration>,
) -> Result<(), CollectionError> {
    let cwd = base.to_path_buf();
    let worker = std::thread::Builder::new()
        .name("manifest-collect".to_string())
        .spawn(move || run_collect_command(&command, &cwd, limit))
        .map_err(collection_start_failed)?;
    let collected = worker.join().map_err(|_| {
        CollectionError::Other("the collection step stopped unexpectedly".to_string())
    })??;

    let stderr = collected.stderr_text();
    if let Some(name) = missing_module(&stderr) {
        return Err(CollectionError::MissingDependency(name));
    }
    if !collected.status.success() {
        return Err(CollectionError::Other(
            format!(
                "Loading the submission failed ({}).\n{}",
                collected.status,
                tail(&stderr, STDERR_TAIL_LINES)
            )
            .trim_end()
            .to_string(),
        ));
    }

    tracing::debug!("Collection step finished");
    Ok(())
}

/// Runs `command` under `limit` on a private runtime. Hitting the limit drops
/// the run, which kills the child.
fn run_collect_command(
    command: &[String],
    cwd: &Path,
    limit: Option<Duration>,
) -> Result<Collected, CollectionError> {
    let Some((program, args)) = command.split_first() else {
        return Err(CollectionError::Other("empty collection command".to_string()));
    };
    let args: Vec<OsString> = args.iter().map(OsString::from).collect();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(collection_start_failed)?;

    runtime.block_on(async move {
        let run = process::run_collect(program, &args, StdinSource::Null, Some(cwd));
        let finished = match limit {
            None => run.await,
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(finished) => finished,
                Err(_) => {
                    return Err(CollectionError::Other(TimeoutExceeded::new(limit).to_string()));
                }
            },
        };
        finished.map_err(|err| match err {
            ProcessError::ProgramNotFound(name) => CollectionError::MissingDependency(name),
            ProcessError::Other(err) => CollectionError::Other(format!("{err:#}")),
        })
    })
}

/// The error for a collection step that never got going.
fn collection_start_failed(err: std::io::Error) -> CollectionError {
    CollectionError::Other(format!("could not start the collection step: {err}"))
}

/// Turns a check as written into a definition.
fn command_check(spec: CommandCheckSpec, base: &Path) -> Result<CheckDefinition, SettingsError> {
    let invalid = |reason: String| SettingsError::InvalidCheck {
        check: spec.name.clone(),
        reason,
    };

    if spec.run.is_empty() {
        return Err(invalid("`run` must name a program".to_string()));
    }
    let visibility = spec
        .visibility
        .as_deref()
        .map(str::parse::<Visibility>)
        .transpose()
        .map_err(|err| invalid(err.to_string()))?;
    let timeout = spec
        .timeout
        .as_ref()
        .map(|limit| {
            limit
                .resolve()
                .map(|limit| limit.map_or(TimeLimit::Unlimited, TimeLimit::Limited))
        })
        .transpose()
        .map_err(|err| invalid(err.to_string()))?;

    let source = SourceListing::from_text(&format!("$ {}", display_command(&spec.run)));
    let command = Arc::new(CommandCheck {
        run:             spec.run,
        stdin:           spec.stdin,
        expected_stdout: spec.expected_stdout,
        doctest:         spec.doctest,
        cwd:             base.to_path_buf(),
    });

    Ok(CheckDefinition::builder()
        .function_name(spec.name)
        .maybe_description(spec.description)
        .body(CheckBody::future(move |ctx| {
            let command = Arc::clone(&command);
            async move { command.execute(&ctx).await }
        }))
        .maybe_weight(spec.weight)
        .maybe_visibility(visibility)
        .maybe_timeout(timeout)
        .extra_credit(spec.extra_credit)
        .source(source)
        .build())
}

/// A command and what its run must look like to pass.
#[derive(Debug)]
struct CommandCheck {
    /// Program and arguments.
    run:             Vec<String>,
    /// Text fed to stdin.
    stdin:           Option<String>,
    /// Exact stdout expected.
    expected_stdout: Option<String>,
    /// A failing exit means the doctests failed.
    doctest:         bool,
    /// Working directory.
    cwd:             PathBuf,
}

impl CommandCheck {
    /// Runs the command and judges its result.
    async fn execute(&self, ctx: &CheckContext) -> CheckResult {
        let Some((program, args)) = self.run.split_first() else {
            return Err(Raised::unexpected("ValueError", "empty command"));
        };
        let args: Vec<OsString> = args.iter().map(OsString::from).collect();
        let stdin = match &self.stdin {
            Some(text) => StdinSource::Bytes(text.clone().into_bytes()),
            None => StdinSource::Null,
        };

        let collected = match process::run_collect(program, &args, stdin, Some(&self.cwd)).await {
            Ok(collected) => collected,
            Err(ProcessError::ProgramNotFound(name)) => {
                return Err(Raised::MissingModule {
                    name,
                    location: None,
                });
            }
            Err(ProcessError::Other(err)) => {
                return Err(Raised::Unexpected {
                    description: format!("OSError({:?})", format!("{err:#}")),
                    location:    None,
                });
            }
        };

        let stdout = collected.stdout_text();
        let stderr = collected.stderr_text();
        let output = record_leaderboard(&stdout, ctx)?;

        if let Some(name) = missing_module(&stderr) {
            return Err(Raised::MissingModule {
                name,
                location: None,
            });
        }

        if !collected.status.success() {
            if self.doctest {
                let failed = doctest_failures(&stdout).or_else(|| doctest_failures(&stderr));
                return doctests::check(DoctestSummary::new(0, failed.unwrap_or(1).max(1)));
            }
            return Err(assertion(format!(
                "command exited with {}\n{}",
                collected.status,
                tail(&stderr, STDERR_TAIL_LINES)
            )));
        }

        if let Some(expected) = &self.expected_stdout
            && normalize(expected) != normalize(&output)
        {
            return Err(assertion(format!(
                "stdout did not match the expected output:\n{}",
                diff(&normalize(expected), &normalize(&output))
            )));
        }

        Ok(())
    }
}

/// An assertion failure with no source position; the evidence then shows the
/// command itself followed by the message.
fn assertion(message: String) -> Raised {
    Raised::Assertion {
        message:  message.trim_end().to_string(),
        location: None,
    }
}

/// Records `leaderboard: name=value` lines and returns the rest of stdout.
fn record_leaderboard(stdout: &str, ctx: &CheckContext) -> Result<String, Raised> {
    let mut kept = String::with_capacity(stdout.len());
    for line in stdout.split_inclusive('\n') {
        let Some(entry) = line.trim_end().strip_prefix(LEADERBOARD_PREFIX) else {
            kept.push_str(line);
            continue;
        };
        let parsed = entry
            .split_once('=')
            .and_then(|(name, value)| Some((name.trim(), value.trim().parse::<f64>().ok()?)))
            .filter(|(name, _)| !name.is_empty());
        match parsed {
            Some((name, value)) => ctx.record(name, value)?,
            None => {
                return Err(Raised::Unexpected {
                    description: format!("ValueError({:?})", format!("bad leaderboard line: {entry}")),
                    location:    None,
                });
            }
        }
    }
    Ok(kept)
}

/// The module named in a Python import failure, if stderr contains one.
fn missing_module(stderr: &str) -> Option<String> {
    let start = stderr.find(MISSING_MODULE_MARKER)? + MISSING_MODULE_MARKER.len();
    let rest = &stderr[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string()).filter(|name| !name.is_empty())
}

/// The failure count from a `***Test Failed*** N failures.` doctest summary.
fn doctest_failures(output: &str) -> Option<usize> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("***Test Failed***")?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    })
}

/// The last `count` lines of `text`.
fn tail(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}

/// Strips trailing whitespace from each line and trailing blank lines.
fn normalize(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let mut joined = lines.join("\n").trim_end_matches('\n').to_string();
    joined.push('\n');
    joined
}

/// Line diff of expected against actual, `-` for expected-only lines and `+`
/// for lines only the submission printed.
fn diff(expected: &str, actual: &str) -> String {
    let diff = TextDiff::from_lines(expected, actual);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let prefix = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        output.push_str(&format!("{} {}", prefix, change));
    }

    output
}

/// The command as it would be typed into a shell.
fn display_command(run: &[String]) -> String {
    run.iter()
        .map(|arg| {
            if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
                format!("{arg:?}")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
