//! E2E CLI tests covering the scoring workflow:
//! - roster setup (`project add`, `user add`, `enroll`)
//! - tree building and validation errors
//! - manual assessment with upward propagation
//! - owner-only deletion and subtree copy

use assert_cmd::Command;
use predicates::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn rb_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("rb"));
    cmd.current_dir(dir);
    cmd.env("RUBRIC_LOG", "error");
    cmd.env("RUST_BACKTRACE", "0");
    cmd.env_remove("FORMAT");
    cmd
}

fn rb_json(dir: &Path, args: &[&str]) -> Value {
    let output = rb_cmd(dir)
        .args(args)
        .args(["--format", "json"])
        .output()
        .expect("rb should not crash");
    assert!(
        output.status.success(),
        "rb {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

/// Error code of the first JSON value on stderr; whatever follows it
/// (anyhow's report, a backtrace) is ignored.
fn error_code_from(stderr: &str) -> String {
    let start = stderr.find('{').expect("JSON envelope on stderr");
    let json: Value = serde_json::Deserializer::from_str(&stderr[start..])
        .into_iter::<Value>()
        .next()
        .expect("one JSON value")
        .expect("valid error JSON");
    json["error"]["error_code"]
        .as_str()
        .expect("error_code")
        .to_string()
}

/// Run a failing command and return its JSON error envelope's code.
fn rb_error_code(dir: &Path, args: &[&str]) -> String {
    let output = rb_cmd(dir)
        .args(args)
        .args(["--format", "json"])
        .output()
        .expect("rb should not crash");
    assert!(!output.status.success(), "rb {args:?} unexpectedly succeeded");
    error_code_from(&String::from_utf8_lossy(&output.stderr))
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal string")).expect("decimal")
}

fn id_of(value: &Value, field: &str) -> String {
    value[field].as_i64().expect("numeric id").to_string()
}

/// Group "fall" with project "rocket" and ann enrolled; returns the
/// enrollment id.
fn roster(dir: &Path) -> String {
    rb_cmd(dir).arg("init").assert().success();
    rb_json(dir, &["group", "create", "fall"]);
    let project = rb_json(dir, &["project", "add", "fall", "rocket"]);
    assert_eq!(project["kind"], "project");
    rb_json(dir, &["user", "add", "ann", "ann@example.org"]);
    let enrolled = rb_json(dir, &["enroll", "ann", &id_of(&project, "id")]);
    assert_eq!(enrolled["role"], "member");
    id_of(&enrolled, "enrollment")
}

fn add_category(dir: &Path, args: &[&str]) -> String {
    let mut full = vec!["category", "add", "fall"];
    full.extend_from_slice(args);
    let created = rb_json(dir, &full);
    id_of(&created["category"], "id")
}

fn tree_scores(dir: &Path, subject: &str) -> Vec<(i64, Decimal)> {
    rb_json(dir, &["tree", "fall", "--subject", subject])
        .as_array()
        .expect("array")
        .iter()
        .map(|row| (row["id"].as_i64().expect("id"), decimal(&row["score"])))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn manual_scores_propagate_to_the_root() {
    let dir = TempDir::new().expect("tempdir");
    let ann = roster(dir.path());
    let subject = format!("enrollment:{ann}");

    let root = add_category(dir.path(), &["Final", "--type", "sum", "--total", "10"]);
    let code = add_category(
        dir.path(),
        &["Code", "--parent", &root, "--type", "custom", "--total", "6"],
    );
    let report = add_category(
        dir.path(),
        &["Report", "--parent", &root, "--type", "custom", "--total", "4"],
    );

    let assessed = rb_json(dir.path(), &["assess", &ann, &code, "6"]);
    assert_eq!(assessed["subject"]["kind"], "user");
    assert_eq!(decimal(&assessed["chosen"]), Decimal::from(6));
    rb_json(dir.path(), &["assess", &ann, &report, "2"]);

    let scores = tree_scores(dir.path(), &subject);
    assert_eq!(scores[0], (root.parse::<i64>().expect("id"), Decimal::from(8)));
    assert_eq!(scores[1].1, Decimal::from(6));
    assert_eq!(scores[2].1, Decimal::from(2));
}

#[test]
fn tree_lists_nodes_depth_first() {
    let dir = TempDir::new().expect("tempdir");
    roster(dir.path());
    let root = add_category(dir.path(), &["Final", "--total", "10"]);
    let part = add_category(dir.path(), &["Part A", "--parent", &root]);
    add_category(dir.path(), &["A1", "--parent", &part, "--type", "custom"]);
    add_category(dir.path(), &["Part B", "--parent", &root, "--type", "custom"]);

    let rows = rb_json(dir.path(), &["tree", "fall"]);
    let shape: Vec<(u64, &str)> = rows
        .as_array()
        .expect("array")
        .iter()
        .map(|row| {
            (
                row["depth"].as_u64().expect("depth"),
                row["name"].as_str().expect("name"),
            )
        })
        .collect();
    assert_eq!(shape, [(0, "Final"), (1, "Part A"), (2, "A1"), (1, "Part B")]);
    assert!(rows[0].get("score").is_none());
}

#[test]
fn invalid_trees_are_rejected_with_codes() {
    let dir = TempDir::new().expect("tempdir");
    roster(dir.path());
    let root = add_category(
        dir.path(),
        &["Team", "--type", "sum", "--scope", "project"],
    );

    assert_eq!(
        rb_error_code(dir.path(), &["category", "add", "fall", "Second root"]),
        "E3005"
    );
    assert_eq!(
        rb_error_code(
            dir.path(),
            &["category", "add", "fall", "Solo", "--parent", &root, "--scope", "user"]
        ),
        "E3001"
    );
    assert_eq!(
        rb_error_code(
            dir.path(),
            &["category", "add", "fall", "Auto", "--parent", &root, "--type", "automatic", "--scope", "project"]
        ),
        "E3002"
    );
    assert_eq!(
        rb_error_code(
            dir.path(),
            &[
                "category", "add", "fall", "Late", "--parent", &root, "--scope", "project",
                "--start", "2024-09-10", "--end", "2024-09-01"
            ]
        ),
        "E3004"
    );
}

#[test]
fn negative_and_unknown_assessments_fail() {
    let dir = TempDir::new().expect("tempdir");
    let ann = roster(dir.path());
    let root = add_category(dir.path(), &["Final", "--type", "custom"]);

    assert_eq!(rb_error_code(dir.path(), &["assess", &ann, &root, "-1"]), "E3003");
    assert_eq!(rb_error_code(dir.path(), &["assess", &ann, "99", "1"]), "E2001");
    assert_eq!(rb_error_code(dir.path(), &["assess", "99", &root, "1"]), "E2003");
}

#[test]
fn error_envelope_parses_with_backtraces_enabled() {
    let dir = TempDir::new().expect("tempdir");
    let ann = roster(dir.path());

    let output = rb_cmd(dir.path())
        .env("RUST_BACKTRACE", "1")
        .args(["assess", &ann, "99", "1", "--format", "json"])
        .output()
        .expect("rb should not crash");
    assert!(!output.status.success());
    assert_eq!(
        error_code_from(&String::from_utf8_lossy(&output.stderr)),
        "E2001"
    );
}

#[test]
fn deletion_requires_owner_role() {
    let dir = TempDir::new().expect("tempdir");
    let ann = roster(dir.path());
    let root = add_category(dir.path(), &["Final", "--total", "10"]);
    let keep = add_category(
        dir.path(),
        &["Keep", "--parent", &root, "--type", "custom", "--total", "5"],
    );
    let drop = add_category(
        dir.path(),
        &["Drop", "--parent", &root, "--type", "custom", "--total", "5"],
    );
    rb_json(dir.path(), &["assess", &ann, &keep, "5"]);

    assert_eq!(
        rb_error_code(dir.path(), &["category", "rm", &drop, "--role", "teacher"]),
        "E4001"
    );

    let removed = rb_json(dir.path(), &["category", "rm", &drop, "--role", "owner"]);
    assert_eq!(removed["removed"], serde_json::json!([drop.parse::<i64>().expect("id")]));

    // Root is recalculated over the remaining child: 10 * 5 / 5.
    let scores = tree_scores(dir.path(), &format!("enrollment:{ann}"));
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0].1, Decimal::from(10));
}

#[test]
fn copy_duplicates_subtree_and_rejects_self_copy() {
    let dir = TempDir::new().expect("tempdir");
    roster(dir.path());
    let root = add_category(dir.path(), &["Final", "--total", "10"]);
    let sprint = add_category(
        dir.path(),
        &[
            "Sprint", "--parent", &root, "--start", "2024-09-01", "--end", "2024-09-14",
        ],
    );
    add_category(dir.path(), &["Demo", "--parent", &sprint, "--type", "custom"]);

    let copy = rb_json(dir.path(), &["category", "copy", &sprint, "--to", &root]);
    assert_eq!(copy["category"]["name"], "Sprint");
    assert_eq!(copy["milestone"], 2);

    let rows = rb_json(dir.path(), &["tree", "fall"]);
    assert_eq!(rows.as_array().expect("array").len(), 5);

    assert_eq!(
        rb_error_code(dir.path(), &["category", "copy", &root, "--to", &sprint]),
        "E3006"
    );
}

#[test]
fn disabled_enrollments_are_reported() {
    let dir = TempDir::new().expect("tempdir");
    let ann = roster(dir.path());

    let disabled = rb_json(dir.path(), &["enrollment", "disable", &ann]);
    assert_eq!(disabled["disabled"], true);
    assert_eq!(disabled["username"], "ann");

    let enabled = rb_json(dir.path(), &["enrollment", "enable", &ann]);
    assert_eq!(enabled["disabled"], false);

    rb_cmd(dir.path())
        .args(["enrollment", "disable", "99", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("enrollment 99 not found"));
}
