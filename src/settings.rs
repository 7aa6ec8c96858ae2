#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Run-wide grading settings.
//!
//! Settings exist to stop a typo from turning into something students can see
//! (a hidden check accidentally made visible, for instance), so every value is
//! validated when it is set and there is no way to set a field that does not
//! exist.

use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{check::CheckDefinition, error::SettingsError, outcome::Outcome};

/// Represents visibility settings for Gradescope submissions and test cases.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Hidden from students.
    Hidden,
    /// Visible after the due date of the assignment (or the late due date, if
    /// late submissions are allowed).
    AfterDueDate,
    /// Visible after the grades are published from the "Review Grades" page.
    #[default]
    AfterPublished,
    /// Always visible to students.
    Visible,
}

impl Visibility {
    /// Returns the wire name of this visibility.
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Hidden => "hidden",
            Visibility::AfterDueDate => "after_due_date",
            Visibility::AfterPublished => "after_published",
            Visibility::Visible => "visible",
        }
    }
}

impl FromStr for Visibility {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hidden" => Ok(Visibility::Hidden),
            "after_due_date" => Ok(Visibility::AfterDueDate),
            "after_published" => Ok(Visibility::AfterPublished),
            "visible" => Ok(Visibility::Visible),
            other => Err(SettingsError::InvalidVisibility(other.to_string())),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shared, insertion-ordered mapping from leaderboard category to score.
///
/// Cloning the handle shares the underlying table, which is how checks write
/// into the same leaderboard the session later reports.
#[derive(Clone, Default)]
pub struct Leaderboard {
    /// Categories in the order they were first recorded.
    entries: Arc<Mutex<Vec<(String, f64)>>>,
}

impl Leaderboard {
    /// Creates an empty leaderboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for `name`. A category recorded twice keeps its
    /// original position and takes the newer value.
    pub fn record(&self, name: impl Into<String>, value: f64) {
        let name = name.into();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => entries.push((name, value)),
        }
    }

    /// Returns the value recorded for `name`, if any.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| *value)
    }

    /// Copies the current entries out, in insertion order.
    pub fn snapshot(&self) -> Vec<(String, f64)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded categories.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Leaderboard {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        let board = Leaderboard::new();
        for (name, value) in iter {
            board.record(name, value);
        }
        board
    }
}

impl fmt::Debug for Leaderboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}

/// Replaces the rendered diagnostic of a failed check. Receives the check, its
/// outcome and the default diagnostic; whatever it returns becomes the output
/// verbatim.
pub type FailureMessageFormatter =
    Arc<dyn Fn(&CheckDefinition, &Outcome, &str) -> String + Send + Sync>;

/// Validated, run-wide grading settings.
#[derive(Clone)]
pub struct Settings {
    /// Visibility used by checks that do not override it.
    default_visibility: Visibility,
    /// Points for checks that do not override their weight.
    default_weight:     f64,
    /// Time limit for checks without their own; `None` means unlimited.
    default_timeout:    Option<Duration>,
    /// Leaderboard table; `None` disables the leaderboard entirely.
    leaderboard:        Option<Leaderboard>,
    /// Optional override for failure diagnostics.
    failure_message:    Option<FailureMessageFormatter>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_visibility: Visibility::AfterPublished,
            default_weight:     1.0,
            default_timeout:    None,
            leaderboard:        None,
            failure_message:    None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("default_visibility", &self.default_visibility)
            .field("default_weight", &self.default_weight)
            .field("default_timeout", &self.default_timeout)
            .field("leaderboard", &self.leaderboard)
            .field("failure_message", &self.failure_message.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Checks that a weight can be scored.
pub(crate) fn validate_weight(weight: f64) -> Result<f64, SettingsError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(weight)
    } else {
        Err(SettingsError::InvalidWeight(weight))
    }
}

/// Checks that a time limit can actually elapse.
pub(crate) fn validate_limit(limit: Duration) -> Result<Duration, SettingsError> {
    if limit.is_zero() {
        Err(SettingsError::InvalidTimeout(format!("{}", limit.as_secs_f64())))
    } else {
        Ok(limit)
    }
}

impl Settings {
    /// Settings with every field at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default visibility.
    pub fn default_visibility(&self) -> Visibility {
        self.default_visibility
    }

    /// Returns the default weight.
    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }

    /// Returns the default time limit, `None` meaning unlimited.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Returns the leaderboard handle if the leaderboard is enabled.
    pub fn leaderboard(&self) -> Option<&Leaderboard> {
        self.leaderboard.as_ref()
    }

    /// Returns the failure message override, if any.
    pub fn failure_message(&self) -> Option<&FailureMessageFormatter> {
        self.failure_message.as_ref()
    }

    /// Sets the default visibility.
    pub fn set_default_visibility(&mut self, visibility: Visibility) {
        self.default_visibility = visibility;
    }

    /// Sets the default weight; rejects negative and non-finite values.
    pub fn set_default_weight(&mut self, weight: f64) -> Result<(), SettingsError> {
        self.default_weight = validate_weight(weight)?;
        Ok(())
    }

    /// Sets the default time limit; `None` removes the limit, a zero limit is
    /// rejected.
    pub fn set_default_timeout(&mut self, limit: Option<Duration>) -> Result<(), SettingsError> {
        self.default_timeout = limit.map(validate_limit).transpose()?;
        Ok(())
    }

    /// Replaces the leaderboard; `None` disables it.
    pub fn set_leaderboard(&mut self, leaderboard: Option<Leaderboard>) {
        self.leaderboard = leaderboard;
    }

    /// Enables an empty leaderboard (keeping an existing one) and returns its
    /// handle.
    pub fn enable_leaderboard(&mut self) -> Leaderboard {
        self.leaderboard.get_or_insert_with(Leaderboard::new).clone()
    }

    /// Installs a failure message override.
    pub fn set_failure_message(
        &mut self,
        formatter: impl Fn(&CheckDefinition, &Outcome, &str) -> String + Send + Sync + 'static,
    ) {
        self.failure_message = Some(Arc::new(formatter));
    }

    /// Removes the failure message override.
    pub fn clear_failure_message(&mut self) {
        self.failure_message = None;
    }

    /// Builder-style [`Settings::set_default_visibility`].
    pub fn with_default_visibility(mut self, visibility: Visibility) -> Self {
        self.set_default_visibility(visibility);
        self
    }

    /// Builder-style [`Settings::set_default_weight`].
    pub fn with_default_weight(mut self, weight: f64) -> Result<Self, SettingsError> {
        self.set_default_weight(weight)?;
        Ok(self)
    }

    /// Builder-style [`Settings::set_default_timeout`].
    pub fn with_default_timeout(mut self, limit: Option<Duration>) -> Result<Self, SettingsError> {
        self.set_default_timeout(limit)?;
        Ok(self)
    }

    /// Builder-style [`Settings::set_leaderboard`].
    pub fn with_leaderboard(mut self, leaderboard: Leaderboard) -> Self {
        self.set_leaderboard(Some(leaderboard));
        self
    }

    /// Builder-style [`Settings::set_failure_message`].
    pub fn with_failure_message(
        mut self,
        formatter: impl Fn(&CheckDefinition, &Outcome, &str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.set_failure_message(formatter);
        self
    }
}

/// A time limit as written in a check module: seconds, or the word `"none"`.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum TimeLimitSpec {
    /// A number of seconds.
    Seconds(f64),
    /// A keyword; only `"none"` is accepted.
    Keyword(String),
}

impl TimeLimitSpec {
    /// Converts to a validated limit, `None` meaning unlimited.
    pub fn resolve(&self) -> Result<Option<Duration>, SettingsError> {
        match self {
            TimeLimitSpec::Keyword(word) if word == "none" => Ok(None),
            TimeLimitSpec::Keyword(word) => Err(SettingsError::InvalidTimeout(word.clone())),
            TimeLimitSpec::Seconds(secs) => {
                let limit = Duration::try_from_secs_f64(*secs)
                    .map_err(|_| SettingsError::InvalidTimeout(secs.to_string()))?;
                validate_limit(limit).map(Some)
            }
        }
    }
}

/// Settings as they appear in a serialized check module.
///
/// Unknown fields are rejected whatever their value, and `failure_message` is
/// recognised only to explain that it cannot be set this way.
#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsSpec {
    /// See [`Settings::default_visibility`].
    pub default_visibility: Option<String>,
    /// See [`Settings::default_weight`].
    pub default_weight:     Option<f64>,
    /// See [`Settings::default_timeout`].
    pub default_timeout:    Option<TimeLimitSpec>,
    /// Initial leaderboard contents; an empty object enables an empty
    /// leaderboard.
    pub leaderboard:        Option<serde_json::Map<String, serde_json::Value>>,
    /// Only settable from code.
    pub failure_message:    Option<serde::de::IgnoredAny>,
}

impl TryFrom<SettingsSpec> for Settings {
    type Error = SettingsError;

    fn try_from(spec: SettingsSpec) -> Result<Self, Self::Error> {
        if spec.failure_message.is_some() {
            return Err(SettingsError::UnknownField(
                "failure_message (it can only be set from code)".to_string(),
            ));
        }

        let mut settings = Settings::new();
        if let Some(visibility) = spec.default_visibility {
            settings.set_default_visibility(visibility.parse()?);
        }
        if let Some(weight) = spec.default_weight {
            settings.set_default_weight(weight)?;
        }
        if let Some(limit) = spec.default_timeout {
            settings.set_default_timeout(limit.resolve()?)?;
        }
        if let Some(seed) = spec.leaderboard {
            let board = settings.enable_leaderboard();
            for (name, value) in seed {
                let value = value.as_f64().ok_or_else(|| SettingsError::InvalidLeaderboard {
                    name:  name.clone(),
                    value: value.to_string(),
                })?;
                board.record(name, value);
            }
        }

        Ok(settings)
    }
}
