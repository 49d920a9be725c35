//! Integration tests for TBT CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

/// Helper to get a tbt command with a fixed author and no colour
fn tbt() -> Command {
    let mut cmd = Command::cargo_bin("tbt").unwrap();
    cmd.env("TBT_AUTHOR", "Test Author")
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("TBT_LOG");
    cmd
}

/// Helper to create a test project in a temp directory
fn setup_test_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    tbt().current_dir(tmp.path()).arg("init").assert().success();
    tmp
}

fn stdout_of(output: std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Helper to create the two-stage housing workflow; returns its full ID
fn create_test_flow(tmp: &TempDir) -> String {
    let output = tbt()
        .current_dir(tmp.path())
        .args([
            "flow",
            "new",
            "--title",
            "Housing line",
            "--stage",
            "Machining:qc",
            "--stage",
            "Final Inspection:qc",
            "--param",
            "Machining=Bore diameter:10.00 +/- 0.05 mm",
            "-f",
            "id",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    stdout_of(output)
}

/// Helper to start a batch; returns its full ID
fn create_test_batch(tmp: &TempDir, flow: &str, quantity: &str) -> String {
    let output = tbt()
        .current_dir(tmp.path())
        .args(["batch", "new", "--workflow", flow, "--quantity", quantity, "-f", "id"])
        .output()
        .unwrap();
    assert!(output.status.success());
    stdout_of(output)
}

/// Current batch snapshot as JSON
fn batch_json(tmp: &TempDir, id: &str) -> Value {
    let output = tbt()
        .current_dir(tmp.path())
        .args(["batch", "show", id, "-f", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

fn check(tmp: &TempDir, id: &str, passed: &str, rework: &str, rejected: &str) -> assert_cmd::assert::Assert {
    tbt()
        .current_dir(tmp.path())
        .args([
            "batch", "check", id, "--passed", passed, "--rework", rework, "--rejected", rejected,
        ])
        .assert()
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    tbt()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tessera Batch Tracker"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("flow"));
}

#[test]
fn test_version_displays() {
    tbt()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tbt"));
}

#[test]
fn test_outside_project_fails() {
    let tmp = TempDir::new().unwrap();
    tbt()
        .current_dir(tmp.path())
        .args(["batch", "list"])
        .assert()
        .failure();
}

#[test]
fn test_completions_bash() {
    tbt()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tbt"));
}

// ============================================================================
// Init Tests
// ============================================================================

#[test]
fn test_init_creates_project_structure() {
    let tmp = TempDir::new().unwrap();
    tbt()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized TBT project"));

    assert!(tmp.path().join(".tbt").is_dir());
    assert!(tmp.path().join(".tbt/config.yaml").is_file());
    assert!(tmp.path().join("workflows").is_dir());
    assert!(tmp.path().join("batches").is_dir());
}

#[test]
fn test_init_twice_reports_existing() {
    let tmp = setup_test_project();
    tbt()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

// ============================================================================
// Workflow Tests
// ============================================================================

#[test]
fn test_flow_new_and_list() {
    let tmp = setup_test_project();
    let id = create_test_flow(&tmp);
    assert!(id.starts_with("FLOW-"));

    let files: Vec<_> = fs::read_dir(tmp.path().join("workflows")).unwrap().collect();
    assert_eq!(files.len(), 1);

    tbt()
        .current_dir(tmp.path())
        .args(["flow", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Housing line"))
        .stdout(predicate::str::contains("FLOW@1"));

    tbt()
        .current_dir(tmp.path())
        .args(["flow", "list", "--count"])
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn test_flow_show_lists_stages() {
    let tmp = setup_test_project();
    let id = create_test_flow(&tmp);

    tbt()
        .current_dir(tmp.path())
        .args(["flow", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Machining"))
        .stdout(predicate::str::contains("Final Inspection"))
        .stdout(predicate::str::contains("10.00 +/- 0.05 mm"));
}

#[test]
fn test_flow_new_requires_stage() {
    let tmp = setup_test_project();
    tbt()
        .current_dir(tmp.path())
        .args(["flow", "new", "--title", "Empty"])
        .assert()
        .failure();
}

// ============================================================================
// Batch Lifecycle Tests
// ============================================================================

#[test]
fn test_batch_new_starts_at_first_stage() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let id = create_test_batch(&tmp, &flow, "100");
    assert!(id.starts_with("BAT-"));

    let snap = batch_json(&tmp, &id);
    assert_eq!(snap["status"], "in_progress");
    assert_eq!(snap["title"], "Housing line batch");
    assert_eq!(snap["quantity_planned"], 100);
    assert_eq!(snap["current_stage"]["state"], "at_stage");
    assert_eq!(snap["current_stage"]["name"], "Machining");
    assert_eq!(snap["current_stage"]["quantity"], 100);
    assert_eq!(snap["revision"], 1);
}

#[test]
fn test_batch_new_rejects_bad_quantity() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "new", "--workflow", &flow, "--quantity", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("zero"));

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "new", "--workflow", &flow, "--quantity", "-5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("negative"));

    let files: Vec<_> = fs::read_dir(tmp.path().join("batches")).unwrap().collect();
    assert!(files.is_empty());
}

#[test]
fn test_full_lifecycle_with_rework() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let id = create_test_batch(&tmp, &flow, "100");

    check(&tmp, &id, "80", "15", "5")
        .success()
        .stdout(predicate::str::contains("Pending rework"))
        .stdout(predicate::str::contains("at Machining"));
    let snap = batch_json(&tmp, &id);
    assert_eq!(snap["current_stage"]["name"], "Final Inspection");
    assert_eq!(snap["current_stage"]["quantity"], 80);
    assert_eq!(snap["quantity_rejected"], 5);
    assert_eq!(snap["quantity_in_rework"], 15);

    check(&tmp, &id, "80", "0", "0").success();
    let snap = batch_json(&tmp, &id);
    assert_eq!(snap["status"], "on_hold");
    assert_eq!(snap["current_stage"]["state"], "no_active_stage");
    assert_eq!(snap["quantity_produced"], 80);

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "resolve", &id, "1", "--passed", "10", "--rejected", "5"])
        .assert()
        .success();

    let snap = batch_json(&tmp, &id);
    assert_eq!(snap["status"], "completed");
    assert_eq!(snap["quantity_produced"], 90);
    assert_eq!(snap["quantity_rejected"], 10);
    assert_eq!(snap["quantity_in_rework"], 0);
    assert_eq!(snap["rework_items"][0]["status"], "resolved");
    assert_eq!(snap["stages_history"].as_array().unwrap().len(), 2);
    assert_eq!(snap["revision"], 4);
}

#[test]
fn test_check_sum_mismatch_leaves_batch_unchanged() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let id = create_test_batch(&tmp, &flow, "100");

    check(&tmp, &id, "80", "15", "4")
        .failure()
        .stderr(predicate::str::contains("accounts"));

    let snap = batch_json(&tmp, &id);
    assert_eq!(snap["revision"], 1);
    assert_eq!(snap["current_stage"]["quantity"], 100);
    assert!(snap["stages_history"].as_array().unwrap().is_empty());
}

#[test]
fn test_check_negative_quantity_fails() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let id = create_test_batch(&tmp, &flow, "100");

    check(&tmp, &id, "101", "-1", "0")
        .failure()
        .stderr(predicate::str::contains("negative"));
}

#[test]
fn test_check_stale_stage_fails() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let id = create_test_batch(&tmp, &flow, "100");
    check(&tmp, &id, "100", "0", "0").success();

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "check", &id, "--stage", "Machining", "--passed", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("active"));
}

#[test]
fn test_check_records_samples_with_specification() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let id = create_test_batch(&tmp, &flow, "10");

    tbt()
        .current_dir(tmp.path())
        .args([
            "batch",
            "check",
            &id,
            "--passed",
            "10",
            "--sample",
            "Bore diameter=10.02:pass",
            "--inspector",
            "Jo",
        ])
        .assert()
        .success();

    let snap = batch_json(&tmp, &id);
    let record = &snap["stages_history"][0]["outcome"];
    assert_eq!(record["kind"], "quality_check");
    assert_eq!(record["inspector"], "Jo");
    assert_eq!(record["samples_data"][0]["specification"], "10.00 +/- 0.05 mm");
    assert_eq!(record["samples_data"][0]["result"], "pass");
}

#[test]
fn test_resolve_twice_fails() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let id = create_test_batch(&tmp, &flow, "20");
    check(&tmp, &id, "15", "5", "0").success();

    let resolve = |passed: &str| {
        tbt()
            .current_dir(tmp.path())
            .args(["batch", "resolve", &id, "1", "--passed", passed])
            .assert()
    };
    resolve("4")
        .failure()
        .stderr(predicate::str::contains("holds"));
    resolve("5").success();
    resolve("5")
        .failure()
        .stderr(predicate::str::contains("resolved"));
}

#[test]
fn test_reject_closes_batch() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let id = create_test_batch(&tmp, &flow, "100");

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "reject", &id, "--reason", "Wrong material", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rejected"));

    let snap = batch_json(&tmp, &id);
    assert_eq!(snap["status"], "rejected");
    assert_eq!(snap["rejection"]["reason"], "Wrong material");

    check(&tmp, &id, "100", "0", "0")
        .failure()
        .stderr(predicate::str::contains("rejected"));

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "reject", &id, "--reason", "Again", "--yes"])
        .assert()
        .failure();
}

#[test]
fn test_advance_requires_pass_through_stage() {
    let tmp = setup_test_project();
    let output = tbt()
        .current_dir(tmp.path())
        .args([
            "flow", "new", "--title", "Paint line", "--stage", "Deburr", "--stage", "Paint:qc", "-f", "id",
        ])
        .output()
        .unwrap();
    let flow = stdout_of(output);
    let id = create_test_batch(&tmp, &flow, "40");

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "advance", &id, "--operator", "Sam"])
        .assert()
        .success();
    let snap = batch_json(&tmp, &id);
    assert_eq!(snap["current_stage"]["name"], "Paint");
    assert_eq!(snap["stages_history"][0]["outcome"]["kind"], "passed_through");

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "advance", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("quality"));
}

#[test]
fn test_batch_list_filters_and_short_ids() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let first = create_test_batch(&tmp, &flow, "10");
    create_test_batch(&tmp, &flow, "20");
    check(&tmp, &first, "10", "0", "0").success();
    check(&tmp, &first, "10", "0", "0").success();

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "list", "--count"])
        .assert()
        .success()
        .stdout("2\n");
    tbt()
        .current_dir(tmp.path())
        .args(["batch", "list", "--status", "completed", "-f", "id"])
        .assert()
        .success()
        .stdout(format!("{}\n", first));
    tbt()
        .current_dir(tmp.path())
        .args(["batch", "list", "--active", "--count"])
        .assert()
        .success()
        .stdout("1\n");

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "show", "BAT@1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Quantities"));
}

#[test]
fn test_batch_history_lists_events() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let id = create_test_batch(&tmp, &flow, "100");
    check(&tmp, &id, "90", "10", "0").success();

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "history", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("quality_checked"))
        .stdout(predicate::str::contains("Machining: 90 passed, 10 rework, 0 rejected"));

    tbt()
        .current_dir(tmp.path())
        .args(["batch", "history", &id, "-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("date,event,detail"));
}

// ============================================================================
// Report Tests
// ============================================================================

#[test]
fn test_report_yield_and_rework() {
    let tmp = setup_test_project();
    let flow = create_test_flow(&tmp);
    let id = create_test_batch(&tmp, &flow, "100");
    check(&tmp, &id, "80", "15", "5").success();

    tbt()
        .current_dir(tmp.path())
        .args(["report", "yield"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# Batch Yield Report"))
        .stdout(predicate::str::contains("Housing line batch"));

    tbt()
        .current_dir(tmp.path())
        .args(["report", "rework"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Machining"))
        .stdout(predicate::str::contains("pending"));

    let out = tmp.path().join("yield.md");
    tbt()
        .current_dir(tmp.path())
        .args(["report", "yield", "--output", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Report written to"));
    assert!(fs::read_to_string(out).unwrap().contains("| Planned"));
}
