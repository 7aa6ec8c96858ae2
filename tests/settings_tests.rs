//! Tests for validated settings.

use std::time::Duration;

use autogradescope::{
    Leaderboard, Settings, SettingsError, Visibility,
    settings::{SettingsSpec, TimeLimitSpec},
};
use serde_json::json;

fn from_json(value: serde_json::Value) -> Result<Settings, String> {
    let spec: SettingsSpec = serde_json::from_value(value).map_err(|err| err.to_string())?;
    Settings::try_from(spec).map_err(|err| err.to_string())
}

#[test]
fn defaults_match_gradescope_conventions() {
    let settings = Settings::default();
    assert_eq!(settings.default_visibility(), Visibility::AfterPublished);
    assert_eq!(settings.default_weight(), 1.0);
    assert_eq!(settings.default_timeout(), None);
    assert!(settings.leaderboard().is_none());
    assert!(settings.failure_message().is_none());
}

#[test]
fn visibility_names_round_trip() {
    for name in ["hidden", "visible", "after_published", "after_due_date"] {
        let visibility: Visibility = name.parse().expect("known visibility");
        assert_eq!(visibility.as_str(), name);
        assert_eq!(serde_json::to_value(visibility).expect("serializes"), json!(name));
    }
}

#[test]
fn unknown_visibility_lists_the_valid_values() {
    let err = "Visible".parse::<Visibility>().expect_err("case matters");
    assert!(matches!(err, SettingsError::InvalidVisibility(ref value) if value == "Visible"));
    assert_eq!(
        err.to_string(),
        "default_visibility must be one of 'hidden', 'visible', 'after_published', or \
         'after_due_date'; got 'Visible'"
    );
}

#[test]
fn weights_must_be_finite_and_non_negative() {
    let mut settings = Settings::new();
    assert!(settings.set_default_weight(-1.0).is_err());
    assert!(settings.set_default_weight(f64::NAN).is_err());
    assert!(settings.set_default_weight(f64::INFINITY).is_err());
    assert_eq!(settings.default_weight(), 1.0);

    settings.set_default_weight(0.0).expect("zero is allowed");
    assert_eq!(settings.default_weight(), 0.0);
}

#[test]
fn zero_timeouts_are_rejected() {
    let mut settings = Settings::new();
    assert!(matches!(
        settings.set_default_timeout(Some(Duration::ZERO)),
        Err(SettingsError::InvalidTimeout(_))
    ));
    settings
        .set_default_timeout(Some(Duration::from_millis(1500)))
        .expect("positive limit");
    assert_eq!(settings.default_timeout(), Some(Duration::from_millis(1500)));
    settings.set_default_timeout(None).expect("unlimited");
    assert_eq!(settings.default_timeout(), None);
}

#[test]
fn serialized_settings_reject_unknown_fields_of_any_type() {
    for value in [json!("hidden"), json!(3), json!({}), json!(null), json!([1, 2])] {
        let err = from_json(json!({ "default_visiblity": value })).expect_err("typo is rejected");
        assert!(err.contains("default_visiblity"), "{err}");
    }
}

#[test]
fn failure_message_cannot_be_serialized() {
    let err = from_json(json!({ "failure_message": "custom" })).expect_err("code only");
    assert!(err.contains("failure_message"));
}

#[test]
fn serialized_settings_are_validated() {
    let settings = from_json(json!({
        "default_visibility": "visible",
        "default_weight": 2,
        "default_timeout": 0.5
    }))
    .expect("valid settings");
    assert_eq!(settings.default_visibility(), Visibility::Visible);
    assert_eq!(settings.default_weight(), 2.0);
    assert_eq!(settings.default_timeout(), Some(Duration::from_millis(500)));

    assert!(from_json(json!({ "default_visibility": "public" })).is_err());
    assert!(from_json(json!({ "default_weight": -3 })).is_err());
    assert!(from_json(json!({ "default_timeout": 0 })).is_err());
    assert!(from_json(json!({ "default_timeout": -1 })).is_err());
    assert!(from_json(json!({ "default_timeout": "forever" })).is_err());
}

#[test]
fn none_keyword_means_unlimited() {
    let limit: TimeLimitSpec = serde_json::from_value(json!("none")).expect("keyword parses");
    assert_eq!(limit.resolve().expect("valid keyword"), None);
}

#[test]
fn leaderboard_seed_keeps_its_order() {
    let settings = from_json(json!({ "leaderboard": { "speed": 0.2, "accuracy": 0.89 } }))
        .expect("valid seed");
    let board = settings.leaderboard().expect("leaderboard enabled");
    assert_eq!(
        board.snapshot(),
        vec![("speed".to_string(), 0.2), ("accuracy".to_string(), 0.89)]
    );

    let err = from_json(json!({ "leaderboard": { "speed": "fast" } })).expect_err("not a number");
    assert!(err.contains("speed"));
}

#[test]
fn rerecording_a_category_updates_it_in_place() {
    let board: Leaderboard = [("accuracy", 0.5), ("speed", 0.2)].into_iter().collect();
    let shared = board.clone();
    shared.record("accuracy", 0.89);
    shared.record("memory", 12.0);

    assert_eq!(board.len(), 3);
    assert_eq!(
        board.snapshot(),
        vec![
            ("accuracy".to_string(), 0.89),
            ("speed".to_string(), 0.2),
            ("memory".to_string(), 12.0),
        ]
    );
}

#[test]
fn enabling_the_leaderboard_keeps_existing_entries() {
    let mut settings = Settings::new();
    settings.enable_leaderboard().record("speed", 1.0);
    let again = settings.enable_leaderboard();
    assert_eq!(again.get("speed"), Some(1.0));

    settings.set_leaderboard(None);
    assert!(settings.leaderboard().is_none());
}
