#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! What a check raised, where, and how long it took.

use std::{cell::RefCell, fmt, panic::Location, sync::Once, time::Duration};

use crate::{doctests::DoctestFailure, timeout::TimeoutExceeded};

/// Prefix of the names given to check worker threads. The panic hook only
/// captures (and silences) panics on threads carrying it.
pub(crate) const WORKER_THREAD_PREFIX: &str = "check-worker";

/// Source position where a check failed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FailureLocation {
    /// File as reported by the compiler (or the check module).
    pub file:   String,
    /// One-based line number.
    pub line:   u32,
    /// One-based column number.
    pub column: u32,
}

impl FailureLocation {
    /// Creates a location.
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl From<&Location<'_>> for FailureLocation {
    fn from(location: &Location<'_>) -> Self {
        Self::new(location.file(), location.line(), location.column())
    }
}

impl fmt::Display for FailureLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A condition raised by a check.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Raised {
    /// The check's own correctness assertion did not hold.
    #[error("{message}")]
    Assertion {
        /// Assertion detail (expected vs actual, etc.).
        message:  String,
        /// Where the assertion was made.
        location: Option<FailureLocation>,
    },
    /// The check ran past its deadline.
    #[error(transparent)]
    Timeout(#[from] TimeoutExceeded),
    /// Doctests in the submission failed.
    #[error(transparent)]
    Doctest(#[from] DoctestFailure),
    /// The submission needs a module or program that is not installed.
    #[error("No module named '{name}'")]
    MissingModule {
        /// Name of the missing module.
        name:     String,
        /// Where the import was attempted.
        location: Option<FailureLocation>,
    },
    /// Anything else: a panic in submission code, an I/O error, ...
    #[error("{description}")]
    Unexpected {
        /// Short `Kind("message")` description of what was raised.
        description: String,
        /// Where it was raised.
        location:    Option<FailureLocation>,
    },
}

impl Raised {
    /// An assertion failure located at the caller.
    #[track_caller]
    pub fn assertion(message: impl Into<String>) -> Self {
        Raised::Assertion {
            message:  message.into(),
            location: Some(Location::caller().into()),
        }
    }

    /// A missing module or program, located at the caller.
    #[track_caller]
    pub fn missing_module(name: impl Into<String>) -> Self {
        Raised::MissingModule {
            name:     name.into(),
            location: Some(Location::caller().into()),
        }
    }

    /// An unexpected condition of the given kind, located at the caller.
    #[track_caller]
    pub fn unexpected(kind: &str, message: impl fmt::Display) -> Self {
        Raised::Unexpected {
            description: describe(kind, message),
            location:    Some(Location::caller().into()),
        }
    }

    /// Where the condition was raised, if known.
    pub fn location(&self) -> Option<&FailureLocation> {
        match self {
            Raised::Assertion { location, .. }
            | Raised::MissingModule { location, .. }
            | Raised::Unexpected { location, .. } => location.as_ref(),
            Raised::Timeout(_) | Raised::Doctest(_) => None,
        }
    }

    /// Whether this is one of the harness's own signalled conditions.
    pub fn is_harness_signal(&self) -> bool {
        matches!(self, Raised::Timeout(_) | Raised::Doctest(_))
    }

    /// Turns a caught panic into the condition it represents. Panics raised by
    /// `assert!`, `assert_eq!` and `assert_ne!` are assertion failures;
    /// everything else is unexpected.
    pub(crate) fn from_panic(message: String, location: Option<FailureLocation>) -> Self {
        if is_assertion_message(&message) {
            Raised::Assertion { message, location }
        } else {
            Raised::Unexpected {
                description: describe("panic", &message),
                location,
            }
        }
    }
}

impl From<anyhow::Error> for Raised {
    #[track_caller]
    fn from(err: anyhow::Error) -> Self {
        if let Some(raised) = err.downcast_ref::<Raised>() {
            return raised.clone();
        }
        Raised::unexpected("Error", format!("{err:#}"))
    }
}

impl From<std::io::Error> for Raised {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Raised::unexpected(&format!("{:?}", err.kind()), err)
    }
}

/// Formats a raised condition the way it is named in diagnostics:
/// `Kind("message")`.
fn describe(kind: &str, message: impl fmt::Display) -> String {
    format!("{kind}({:?})", message.to_string())
}

/// Whether a panic message came from one of the standard assertion macros.
fn is_assertion_message(message: &str) -> bool {
    message.starts_with("assertion failed") || message.starts_with("assertion `")
}

/// The result of running one check.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// What the check raised; `None` means it passed.
    raised:  Option<Raised>,
    /// Wall-clock time until the check finished or was abandoned.
    elapsed: Duration,
}

impl Outcome {
    /// A passing outcome.
    pub fn passed(elapsed: Duration) -> Self {
        Self {
            raised: None,
            elapsed,
        }
    }

    /// A failing outcome.
    pub fn failed_with(raised: Raised, elapsed: Duration) -> Self {
        Self {
            raised: Some(raised),
            elapsed,
        }
    }

    /// What was raised, if anything.
    pub fn raised(&self) -> Option<&Raised> {
        self.raised.as_ref()
    }

    /// Whether the check failed.
    pub fn failed(&self) -> bool {
        self.raised.is_some()
    }

    /// How long the check ran.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

thread_local! {
    /// Location of the most recent panic on this thread, set by the hook.
    static LAST_PANIC: RefCell<Option<FailureLocation>> = const { RefCell::new(None) };
}

/// Guards the one-time hook installation.
static HOOK: Once = Once::new();

/// Installs a panic hook that records the panic location for check workers
/// and leaves every other thread to the previously installed hook.
pub(crate) fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let on_worker = std::thread::current()
                .name()
                .is_some_and(|name| name.starts_with(WORKER_THREAD_PREFIX));
            if on_worker {
                let location = info.location().map(FailureLocation::from);
                tracing::debug!(location = ?location, "check panicked");
                LAST_PANIC.with(|slot| *slot.borrow_mut() = location);
            } else {
                previous(info);
            }
        }));
    });
}

/// Takes the location recorded by the last panic on this thread.
pub(crate) fn take_panic_location() -> Option<FailureLocation> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
