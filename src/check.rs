#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Check descriptors, check bodies and the suites that group them.

use std::{
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bon::Builder;
use futures::{FutureExt, future::BoxFuture};

use crate::{
    error::LoadError,
    outcome::Raised,
    settings::{Leaderboard, Settings, Visibility},
};

/// What a check body returns: `Ok(())` when it passes.
pub type CheckResult = Result<(), Raised>;

/// Signature of a blocking check body.
type BlockingFn = dyn Fn(&CheckContext) -> CheckResult + Send + Sync;

/// Signature of an asynchronous check body.
type FutureFn = dyn Fn(CheckContext) -> BoxFuture<'static, CheckResult> + Send + Sync;

/// The code a check runs.
#[derive(Clone)]
pub enum CheckBody {
    /// A closure run on a dedicated worker thread. It can be abandoned at any
    /// point, so it must not hold anything that needs explicit cleanup.
    Blocking(Arc<BlockingFn>),
    /// A future driven on a dedicated worker thread. Once abandoned it is
    /// dropped at its next `.await`.
    Future(Arc<FutureFn>),
}

impl CheckBody {
    /// Wraps a blocking closure.
    pub fn blocking(body: impl Fn(&CheckContext) -> CheckResult + Send + Sync + 'static) -> Self {
        CheckBody::Blocking(Arc::new(body))
    }

    /// Wraps a closure producing a future.
    pub fn future<F, Fut>(body: F) -> Self
    where
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CheckResult> + Send + 'static,
    {
        CheckBody::Future(Arc::new(move |ctx| body(ctx).boxed()))
    }
}

impl fmt::Debug for CheckBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckBody::Blocking(_) => f.write_str("CheckBody::Blocking(..)"),
            CheckBody::Future(_) => f.write_str("CheckBody::Future(..)"),
        }
    }
}

/// A per-check time limit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLimit {
    /// Run without a limit, even if the settings define a default.
    Unlimited,
    /// Abandon the check after this long.
    Limited(Duration),
}

impl TimeLimit {
    /// A limit of whole seconds.
    pub fn seconds(secs: u64) -> Self {
        TimeLimit::Limited(Duration::from_secs(secs))
    }

    /// The limit as a duration, `None` meaning unlimited.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            TimeLimit::Unlimited => None,
            TimeLimit::Limited(limit) => Some(limit),
        }
    }
}

/// The source lines of a check, shown to students when it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceListing {
    /// Line number of the first entry in `lines`.
    first_line: u32,
    /// The lines themselves, annotations included.
    lines:      Vec<String>,
}

impl SourceListing {
    /// Creates a listing from text whose first line is `first_line`.
    pub fn new(first_line: u32, text: &str) -> Self {
        Self {
            first_line,
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Creates a listing that starts at line 1.
    pub fn from_text(text: &str) -> Self {
        Self::new(1, text)
    }

    /// Line number of the first line.
    pub fn first_line(&self) -> u32 {
        self.first_line
    }

    /// The listed lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// What a running check can see of the session: the leaderboard, and
/// whether it has already been abandoned.
#[derive(Clone, Default)]
pub struct CheckContext {
    /// Leaderboard handle, when the leaderboard is enabled.
    leaderboard: Option<Leaderboard>,
    /// Set once the check's deadline has fired.
    cancelled:   Arc<AtomicBool>,
}

impl CheckContext {
    /// Creates a context writing to `leaderboard`.
    pub fn new(leaderboard: Option<Leaderboard>) -> Self {
        Self {
            leaderboard,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Records a leaderboard score. Fails the check if the leaderboard is not
    /// enabled or the value is not a finite number; writes from an abandoned
    /// check are dropped.
    #[track_caller]
    pub fn record(&self, name: impl Into<String>, value: f64) -> CheckResult {
        let Some(board) = &self.leaderboard else {
            return Err(Raised::unexpected(
                "LeaderboardDisabled",
                "the leaderboard is not enabled in the settings",
            ));
        };
        let name = name.into();
        if !value.is_finite() {
            return Err(Raised::unexpected(
                "ValueError",
                format!("leaderboard score for \"{name}\" must be a finite number, not {value}"),
            ));
        }
        if self.is_cancelled() {
            tracing::warn!(category = %name, "ignoring leaderboard write from an abandoned check");
            return Ok(());
        }
        board.record(name, value);
        Ok(())
    }

    /// Whether the leaderboard is enabled.
    pub fn leaderboard_enabled(&self) -> bool {
        self.leaderboard.is_some()
    }

    /// Whether the check's deadline has already fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Marks the check as abandoned.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// One gradable unit and the policy overrides attached to it.
#[derive(Clone, Debug, Builder)]
pub struct CheckDefinition {
    /// Declared name of the check function.
    #[builder(into)]
    function_name: String,
    /// Human-readable description; its first line names the check.
    #[builder(into)]
    description:   Option<String>,
    /// The code to run.
    body:          CheckBody,
    /// Points awarded on success, overriding the default weight.
    weight:        Option<f64>,
    /// Visibility, overriding the default visibility.
    visibility:    Option<Visibility>,
    /// Time limit, overriding the default time limit.
    timeout:       Option<TimeLimit>,
    /// Extra-credit checks add to the score without raising the maximum.
    #[builder(default)]
    extra_credit:  bool,
    /// Source shown as evidence when the check fails.
    source:        Option<SourceListing>,
}

impl CheckDefinition {
    /// Name used in reports: the first line of the description, or the
    /// function name when there is no description.
    pub fn name(&self) -> &str {
        match &self.description {
            Some(description) => {
                let first = description.split('\n').next().unwrap_or_default();
                first.strip_suffix('\r').unwrap_or(first)
            }
            None => &self.function_name,
        }
    }

    /// Declared function name.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Full description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The body to run.
    pub fn body(&self) -> &CheckBody {
        &self.body
    }

    /// Weight override.
    pub fn weight(&self) -> Option<f64> {
        self.weight
    }

    /// Visibility override.
    pub fn visibility(&self) -> Option<Visibility> {
        self.visibility
    }

    /// Time limit override.
    pub fn timeout(&self) -> Option<TimeLimit> {
        self.timeout
    }

    /// Whether this is an extra-credit check.
    pub fn is_extra_credit(&self) -> bool {
        self.extra_credit
    }

    /// Source listing, if any.
    pub fn source(&self) -> Option<&SourceListing> {
        self.source.as_ref()
    }

    /// Weight after applying `settings`.
    pub fn effective_weight(&self, settings: &Settings) -> f64 {
        self.weight.unwrap_or_else(|| settings.default_weight())
    }

    /// Visibility after applying `settings`.
    pub fn effective_visibility(&self, settings: &Settings) -> Visibility {
        self.visibility
            .unwrap_or_else(|| settings.default_visibility())
    }

    /// Time limit after applying `settings`; `None` means unlimited.
    pub fn effective_timeout(&self, settings: &Settings) -> Option<Duration> {
        match self.timeout {
            Some(limit) => limit.as_duration(),
            None => settings.default_timeout(),
        }
    }
}

/// Settings plus checks, as produced by loading a check module.
#[derive(Debug, Default)]
pub struct Suite {
    /// Settings declared by the module; `None` if it declared none.
    settings: Option<Settings>,
    /// Checks in declaration order.
    checks:   Vec<CheckDefinition>,
}

impl Suite {
    /// An empty suite with the given settings.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Some(settings),
            checks:   Vec::new(),
        }
    }

    /// An empty suite whose module declared no settings.
    pub fn without_settings() -> Self {
        Self::default()
    }

    /// Adds a check, builder-style.
    pub fn check(mut self, check: CheckDefinition) -> Self {
        self.push(check);
        self
    }

    /// Adds a check.
    pub fn push(&mut self, check: CheckDefinition) {
        self.checks.push(check);
    }

    /// The module's settings.
    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    /// Mutable access to the module's settings.
    pub fn settings_mut(&mut self) -> Option<&mut Settings> {
        self.settings.as_mut()
    }

    /// The collected checks.
    pub fn checks(&self) -> &[CheckDefinition] {
        &self.checks
    }

    /// Splits the suite into settings and checks.
    pub(crate) fn into_parts(self) -> (Option<Settings>, Vec<CheckDefinition>) {
        (self.settings, self.checks)
    }
}

/// Anything that can load a suite of checks.
pub trait CheckModule {
    /// Loads settings and collects checks, or says why that was impossible.
    fn load(&self) -> Result<Suite, LoadError>;
}

impl<F> CheckModule for F
where
    F: Fn() -> Result<Suite, LoadError>,
{
    fn load(&self) -> Result<Suite, LoadError> {
        self()
    }
}

/// Fails the enclosing check with an assertion failure unless the condition
/// holds.
///
/// ```
/// use autogradescope::{CheckResult, verify};
///
/// fn check_addition() -> CheckResult {
///     verify!(1 + 1 == 2);
///     verify!(2 * 2 == 4, "multiplication is broken: {}", 2 * 2);
///     Ok(())
/// }
/// assert!(check_addition().is_ok());
/// ```
#[macro_export]
macro_rules! verify {
    ($cond:expr $(,)?) => {
        if !$cond {
            return ::core::result::Result::Err($crate::Raised::assertion(concat!(
                "assert ",
                stringify!($cond)
            )));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return ::core::result::Result::Err($crate::Raised::assertion(format!($($arg)+)));
        }
    };
}

/// Fails the enclosing check unless both expressions are equal, reporting
/// both values.
#[macro_export]
macro_rules! verify_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left, right) => {
                if !(*left == *right) {
                    return ::core::result::Result::Err($crate::Raised::assertion(format!(
                        "assert {} == {}\n  left: {:?}\n right: {:?}",
                        stringify!($left),
                        stringify!($right),
                        left,
                        right
                    )));
                }
            }
        }
    };
}
