//! Tests for JSON manifests of command checks.

use std::{
    fs,
    path::PathBuf,
    time::{Duration, Instant},
};

use autogradescope::{CheckModule, FatalReason, ManifestModule, Session};
use serde_json::{Value, json};
use uuid::Uuid;

/// Writes `manifest` (and any extra files) into a fresh directory and returns
/// the manifest's path.
fn write_manifest(manifest: &Value, files: &[(&str, &str)]) -> PathBuf {
    let root = std::env::temp_dir().join(format!("autogradescope-manifest-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp dir");
    for (name, contents) in files {
        fs::write(root.join(name), contents).expect("write fixture file");
    }
    let path = root.join("checks.json");
    fs::write(&path, serde_json::to_string_pretty(manifest).expect("serialize manifest"))
        .expect("write manifest");
    path
}

fn sh(script: &str) -> Value {
    json!(["sh", "-c", script])
}

#[tokio::test]
async fn missing_submission_is_a_collection_failure() {
    let path = write_manifest(
        &json!({
            "settings": {},
            "submission": ["submission.py"],
            "checks": [{ "name": "test_a", "run": sh("exit 0") }]
        }),
        &[],
    );

    let report = Session::from_module(&ManifestModule::new(&path)).run().await;
    assert_eq!(report.fatal_reason(), Some(FatalReason::CollectionFailed));
    assert!(
        report
            .fatal_output()
            .expect("fatal report")
            .contains("expected a file named 'submission.py'")
    );
}

#[tokio::test]
async fn missing_required_program_is_a_collection_failure() {
    let path = write_manifest(
        &json!({
            "settings": {},
            "requires": ["sh", "autogradescope-no-such-program"],
            "checks": [{ "name": "test_a", "run": sh("exit 0") }]
        }),
        &[],
    );

    let report = Session::from_module(&ManifestModule::new(&path)).run().await;
    assert_eq!(report.fatal_reason(), Some(FatalReason::CollectionFailed));
    assert!(
        report
            .fatal_output()
            .expect("fatal report")
            .contains("No module named 'autogradescope-no-such-program'")
    );
}

#[tokio::test]
async fn failed_import_during_collection_is_fatal() {
    let path = write_manifest(
        &json!({
            "settings": {},
            "submission": ["submission.sh"],
            "collect": sh(". ./submission.sh"),
            "checks": [
                { "name": "test_add", "run": sh(". ./submission.sh; exit 0") },
                { "name": "test_add2", "run": sh(". ./submission.sh; exit 0") }
            ]
        }),
        &[(
            "submission.sh",
            "echo \"ModuleNotFoundError: No module named 'nonexistent_pkg_xyz'\" >&2\nexit 1\n",
        )],
    );

    let report = Session::from_module(&ManifestModule::new(&path)).run().await;
    assert_eq!(report.fatal_reason(), Some(FatalReason::CollectionFailed));
    assert!(report.tests().is_empty());
    assert!(
        report
            .fatal_output()
            .expect("fatal report")
            .ends_with("No module named 'nonexistent_pkg_xyz'")
    );
}

#[tokio::test]
async fn python_import_of_a_missing_package_is_fatal() {
    if which::which("python3").is_err() {
        return;
    }
    let path = write_manifest(
        &json!({
            "settings": {},
            "submission": ["submission.py"],
            "requires": ["python3"],
            "collect": ["python3", "-c", "import submission"],
            "checks": [
                { "name": "test_add",
                  "run": ["python3", "-c", "import submission; assert submission.add(1, 2) == 3"] }
            ]
        }),
        &[(
            "submission.py",
            "import nonexistent_pkg_xyz\n\ndef add(a, b):\n    return a + b\n",
        )],
    );

    let report = Session::from_module(&ManifestModule::new(&path)).run().await;
    assert_eq!(report.fatal_reason(), Some(FatalReason::CollectionFailed));
    assert!(
        report
            .fatal_output()
            .expect("fatal report")
            .contains("No module named 'nonexistent_pkg_xyz'")
    );
}

#[tokio::test]
async fn other_collection_failures_show_stderr() {
    let path = write_manifest(
        &json!({
            "settings": {},
            "collect": sh("echo 'SyntaxError: invalid syntax' >&2; exit 1"),
            "checks": [{ "name": "test_a", "run": ["true"] }]
        }),
        &[],
    );

    let report = Session::from_module(&ManifestModule::new(&path)).run().await;
    assert_eq!(report.fatal_reason(), Some(FatalReason::CollectionFailed));
    assert!(
        report
            .fatal_output()
            .expect("fatal report")
            .contains("SyntaxError: invalid syntax")
    );
}

#[tokio::test]
async fn successful_collection_runs_the_checks() {
    let path = write_manifest(
        &json!({
            "settings": { "default_timeout": 5 },
            "collect": sh("exit 0"),
            "checks": [{ "name": "test_a", "run": ["true"] }]
        }),
        &[],
    );

    let report = Session::from_module(&ManifestModule::new(&path)).run().await;
    assert!(!report.is_fatal(), "{:?}", report.fatal_output());
    assert_eq!(report.tests()[0].score, 1.0);
}

#[tokio::test]
async fn hanging_collection_is_cut_off() {
    let path = write_manifest(
        &json!({
            "settings": { "default_timeout": 0.5 },
            "collect": sh("sleep 30"),
            "checks": [{ "name": "test_a", "run": ["true"] }]
        }),
        &[],
    );

    let started = Instant::now();
    let report = Session::from_module(&ManifestModule::new(&path)).run().await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.fatal_reason(), Some(FatalReason::CollectionFailed));
    assert!(
        report
            .fatal_output()
            .expect("fatal report")
            .contains("took longer than 0.5 seconds")
    );
}

#[tokio::test]
async fn unknown_keys_are_misconfigurations() {
    for manifest in [
        json!({ "settings": {}, "checks": [], "extra": true }),
        json!({ "settings": { "default_wieght": 2 }, "checks": [] }),
        json!({ "settings": {}, "checks": [{ "name": "t", "run": ["true"], "points": 1 }] }),
    ] {
        let path = write_manifest(&manifest, &[]);
        let report = Session::from_module(&ManifestModule::new(&path)).run().await;
        assert_eq!(report.fatal_reason(), Some(FatalReason::Misconfigured), "{manifest}");
        assert!(
            report
                .fatal_output()
                .expect("fatal report")
                .contains("unknown field")
        );
    }
}

#[tokio::test]
async fn manifest_without_settings_is_missing_them() {
    let path = write_manifest(&json!({ "checks": [{ "name": "test_a", "run": ["true"] }] }), &[]);
    let report = Session::from_module(&ManifestModule::new(&path)).run().await;

    assert_eq!(report.fatal_reason(), Some(FatalReason::Misconfigured));
    assert!(report.fatal_output().expect("fatal report").contains("missing"));
}

#[tokio::test]
async fn invalid_check_visibility_names_the_check() {
    let path = write_manifest(
        &json!({
            "settings": {},
            "checks": [{ "name": "test_shown", "run": ["true"], "visibility": "public" }]
        }),
        &[],
    );
    let report = Session::from_module(&ManifestModule::new(&path)).run().await;

    assert_eq!(report.fatal_reason(), Some(FatalReason::Misconfigured));
    let output = report.fatal_output().expect("fatal report");
    assert!(output.contains("test_shown"));
    assert!(output.contains("'public'"));
}

#[tokio::test]
async fn unreadable_and_malformed_manifests_are_misconfigurations() {
    let missing = std::env::temp_dir().join(format!("autogradescope-{}.json", Uuid::new_v4()));
    let report = Session::from_module(&ManifestModule::new(&missing)).run().await;
    assert_eq!(report.fatal_reason(), Some(FatalReason::Misconfigured));

    let path = write_manifest(&json!({}), &[]);
    fs::write(&path, "{ \"settings\": ").expect("truncate manifest");
    let report = Session::from_module(&ManifestModule::new(&path)).run().await;
    assert_eq!(report.fatal_reason(), Some(FatalReason::Misconfigured));
    assert!(report.fatal_output().expect("fatal report").contains("malformed"));
}

#[tokio::test]
async fn command_checks_are_judged() {
    let path = write_manifest(
        &json!({
            "settings": { "default_visibility": "visible", "leaderboard": {} },
            "submission": ["answer.txt"],
            "checks": [
                { "name": "test_exit", "run": sh("test -f answer.txt") },
                { "name": "test_fails", "run": sh("echo oops >&2; exit 3"), "weight": 2 },
                { "name": "test_stdout", "run": ["cat", "answer.txt"], "expected_stdout": "42\n" },
                { "name": "test_diff", "run": sh("echo 41"), "expected_stdout": "42" },
                { "name": "test_stdin", "run": sh("read x; echo $x"), "stdin": "ping\n",
                  "expected_stdout": "ping" },
                { "name": "test_board", "run": sh("echo 'leaderboard: speed=0.5'; echo done"),
                  "expected_stdout": "done" },
                { "name": "test_missing_program", "run": ["autogradescope-no-such-program"] },
                { "name": "test_import",
                  "run": sh("echo \"ModuleNotFoundError: No module named 'numpy'\" >&2; exit 1") },
                { "name": "test_doctests", "doctest": true,
                  "run": sh("echo '***Test Failed*** 2 failures.'; exit 1") },
                { "name": "test_bonus", "run": ["true"], "extra_credit": true, "weight": 3 }
            ]
        }),
        &[("answer.txt", "42\n")],
    );

    let report = Session::from_module(&ManifestModule::new(&path)).run().await;
    assert!(!report.is_fatal(), "{:?}", report.fatal_output());
    let tests = report.tests();
    let scores: Vec<f64> = tests.iter().map(|t| t.score).collect();
    assert_eq!(scores, [1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 3.0]);

    assert!(tests[1].output.contains("oops"));
    assert!(tests[1].output.contains("$ sh -c \"echo oops >&2; exit 3\""));
    assert_eq!(tests[1].max_score, 2.0);
    assert!(tests[3].output.contains("- 42"));
    assert!(tests[3].output.contains("+ 41"));
    assert!(
        tests[6]
            .output
            .contains("trying to import 'autogradescope-no-such-program'")
    );
    assert!(tests[7].output.contains("trying to import 'numpy'"));
    assert!(
        tests[8]
            .output
            .starts_with("Your code ran, but some of the doctests failed.")
    );
    assert_eq!(tests[9].max_score, 0.0);

    let board = report.leaderboard().expect("leaderboard enabled");
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].name, "speed");
    assert_eq!(board[0].value, 0.5);
}

#[tokio::test]
async fn runaway_commands_are_killed() {
    let path = write_manifest(
        &json!({
            "settings": { "default_timeout": 1 },
            "checks": [
                { "name": "test_spin", "run": sh("while true; do sleep 0.05; done") },
                { "name": "test_after", "run": ["true"] }
            ]
        }),
        &[],
    );

    let started = Instant::now();
    let report = Session::from_module(&ManifestModule::new(&path)).run().await;

    assert!(started.elapsed() < Duration::from_secs(3));
    let tests = report.tests();
    assert!(tests[0].output.contains("took longer than 1 seconds"));
    assert_eq!(tests[1].score, 1.0);
}

#[tokio::test]
async fn per_check_timeout_keyword_disables_the_default() {
    let path = write_manifest(
        &json!({
            "settings": { "default_timeout": 0.2 },
            "checks": [{ "name": "test_slow", "run": sh("sleep 0.5"), "timeout": "none" }]
        }),
        &[],
    );

    let report = Session::from_module(&ManifestModule::new(&path)).run().await;
    assert_eq!(report.tests()[0].score, 1.0);
}

#[test]
fn loading_keeps_check_order_and_names() {
    let path = write_manifest(
        &json!({
            "settings": {},
            "checks": [
                { "name": "test_first", "description": "First check\nwith details", "run": ["true"] },
                { "name": "test_second", "run": ["true"] }
            ]
        }),
        &[],
    );

    let suite = ManifestModule::new(&path).load().expect("manifest loads");
    let names: Vec<&str> = suite.checks().iter().map(|c| c.name()).collect();
    assert_eq!(names, ["First check", "test_second"]);
}
