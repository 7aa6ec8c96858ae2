//! Tests for the results document.

use std::fs;

use autogradescope::{
    CheckReport, FatalReason, LeaderboardEntry, RunReport, Visibility, report::SuccessReport,
};
use serde_json::json;
use uuid::Uuid;

fn sample() -> RunReport {
    RunReport::Success(SuccessReport {
        tests:       vec![
            CheckReport::builder()
                .name("Adds two numbers")
                .visibility(Visibility::Visible)
                .max_score(2.0)
                .score(2.0)
                .build(),
            CheckReport::builder()
                .name("test_bonus")
                .visibility(Visibility::Hidden)
                .max_score(0.0)
                .score(0.0)
                .output("Your code produced an incorrect output.")
                .build(),
        ],
        leaderboard: Some(vec![LeaderboardEntry {
            name:  "accuracy".to_string(),
            value: 0.89,
        }]),
    })
}

#[test]
fn success_shape_matches_gradescope() {
    let value = serde_json::to_value(sample()).expect("serializes");
    assert_eq!(
        value,
        json!({
            "tests": [
                { "name": "Adds two numbers", "visibility": "visible", "max_score": 2.0,
                  "score": 2.0, "output": "" },
                { "name": "test_bonus", "visibility": "hidden", "max_score": 0.0,
                  "score": 0.0, "output": "Your code produced an incorrect output." }
            ],
            "leaderboard": [{ "name": "accuracy", "value": 0.89 }]
        })
    );
}

#[test]
fn fatal_shape_has_no_tests() {
    let report = RunReport::fatal(FatalReason::NoChecks, "");
    insta::assert_snapshot!(report.to_json().expect("serializes"), @r#"
{
  "score": 0,
  "stdout_visibility": "visible",
  "output": "The autograder did not find any tests to run. This usually happens when the test module is missing or the module is empty."
}
"#);
}

#[test]
fn fatal_messages_append_the_detail() {
    let report = RunReport::fatal(FatalReason::CollectionFailed, "No module named 'numpy'");
    assert_eq!(
        report.fatal_output(),
        Some(
            "The autograder ran into a problem when starting. This usually happens for one of \
             two reasons: 1) Your submission is incorrectly named (check the spelling); 2) Your \
             code is importing a module which does not exist on Gradescope. The exact cause is \
             shown below.\n\nNo module named 'numpy'"
        )
    );

    let report = RunReport::fatal(FatalReason::Misconfigured, "Check module is missing Settings.");
    assert!(
        report
            .fatal_output()
            .expect("fatal report")
            .starts_with("The autograder appears to be misconfigured. Contact the instructor")
    );
    assert!(report.tests().is_empty());
    assert!(report.leaderboard().is_none());
}

#[test]
fn write_to_creates_parents_and_replaces_atomically() {
    let root = std::env::temp_dir().join(format!("autogradescope-report-{}", Uuid::new_v4()));
    let path = root.join("results").join("results.json");

    RunReport::fatal(FatalReason::NoChecks, "")
        .write_to(&path)
        .expect("first write");
    sample().write_to(&path).expect("second write");

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("readable")).expect("json");
    assert_eq!(written["tests"][0]["name"], json!("Adds two numbers"));
    assert_eq!(fs::read_dir(root.join("results")).expect("dir").count(), 1);
}

#[test]
fn overview_lists_every_check() {
    let table = sample().overview_table();
    assert!(table.contains("Grading Overview"));
    assert!(table.contains("Adds two numbers"));
    assert!(table.contains("Total: 2.00/2.00"));
    assert!(table.contains("accuracy: 0.89"));
}

#[test]
fn failed_write_leaves_no_staging_file() {
    let root = std::env::temp_dir().join(format!("autogradescope-report-{}", Uuid::new_v4()));
    let path = root.join("results.json");
    fs::create_dir_all(path.join("occupied")).expect("directory in the way");

    sample()
        .write_to(&path)
        .expect_err("cannot replace a directory");

    let names: Vec<_> = fs::read_dir(&root)
        .expect("dir")
        .flatten()
        .map(|entry| entry.file_name())
        .collect();
    assert_eq!(names, ["results.json"]);
}
