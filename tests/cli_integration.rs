//! Integration tests for the tablestate CLI
//!
//! These tests exercise the full CLI workflow using a temporary database.
//! They verify that commands work end-to-end without mocking.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Helper to run tablestate inside `dir` with its database under `dir`
fn run_tablestate(args: &[&str], dir: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_tablestate"))
        .args(args)
        .current_dir(dir)
        .env("TABLESTATE_DB_PATH", dir.join("test.db"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute tablestate")
}

/// Helper to get stdout as string
fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Helper to get stderr as string
fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Run and require success
fn ok(args: &[&str], dir: &Path) -> String {
    let output = run_tablestate(args, dir);
    assert!(
        output.status.success(),
        "{:?} failed: {}",
        args,
        stderr(&output)
    );
    stdout(&output)
}

fn json(args: &[&str], dir: &Path) -> serde_json::Value {
    serde_json::from_str(&ok(args, dir)).expect("Output should be valid JSON")
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_tablestate"))
        .arg("--help")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("tablestate"));
    assert!(out.contains("Dining table state"));
}

#[test]
fn test_version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_tablestate"))
        .arg("--version")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("tablestate"));
}

#[test]
fn test_completion_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_tablestate"))
        .args(["completion", "bash"])
        .output()
        .expect("Failed to execute");

    assert!(
        output.status.success(),
        "completion bash failed: {}",
        stderr(&output)
    );
    assert!(
        stdout(&output).contains("_tablestate"),
        "bash completion should contain _tablestate function"
    );
}

#[test]
fn test_init_creates_project_layout() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let output = Command::new(env!("CARGO_BIN_EXE_tablestate"))
        .arg("init")
        .current_dir(temp_dir.path())
        .env_remove("TABLESTATE_DB_PATH")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success(), "init failed: {}", stderr(&output));
    assert!(temp_dir.path().join(".tablestate/tablestate.db").exists());
    assert!(temp_dir.path().join(".tablestate/config.toml").exists());
}

// =============================================================================
// Table and Order Tests
// =============================================================================

#[test]
fn test_add_and_list_tables() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();

    assert!(ok(&["table", "add", "T1", "-c", "4"], dir).contains("Created table T1"));
    ok(&["table", "add", "T2", "-c", "2"], dir);

    let out = ok(&["table", "list"], dir);
    assert!(out.contains("T1"));
    assert!(out.contains("T2"));
    assert!(out.contains("available"));

    let tables = json(&["table", "list", "--json"], dir);
    let tables = tables.as_array().unwrap();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0]["table_number"], "T1");
    assert_eq!(tables[0]["has_active_order"], false);
    assert_eq!(tables[0]["drift"], false);
}

#[test]
fn test_duplicate_table_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();

    ok(&["table", "add", "T1"], dir);
    let output = run_tablestate(&["table", "add", "T1"], dir);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("already exists"));
}

#[test]
fn test_order_lifecycle_updates_table() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();

    ok(&["table", "add", "T1"], dir);
    let out = ok(&["order", "add", "1", "-n", "A-1", "--subtotal", "1250"], dir);
    assert!(out.contains("Created order A-1"));
    assert!(out.contains("12.50"));

    let table = json(&["table", "show", "1", "--json"], dir);
    assert_eq!(table["table"]["status"], "occupied");
    assert_eq!(table["table"]["has_active_order"], true);
    assert_eq!(table["active_order"]["order_number"], "A-1");

    for status in ["preparing", "ready", "served", "completed"] {
        ok(&["order", "status", "1", status], dir);
    }

    let table = json(&["table", "show", "1", "--json"], dir);
    assert_eq!(table["table"]["status"], "available");
    assert_eq!(table["table"]["has_active_order"], false);
    assert!(table["active_order"].is_null());
}

#[test]
fn test_backwards_order_status_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();

    ok(&["table", "add", "T1"], dir);
    ok(&["order", "add", "1"], dir);
    ok(&["order", "status", "1", "ready"], dir);

    let output = run_tablestate(&["order", "status", "1", "pending"], dir);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("cannot move from ready to pending"));

    ok(&["order", "status", "1", "pending", "--force"], dir);
}

#[test]
fn test_order_on_missing_table() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let output = run_tablestate(&["order", "add", "7"], temp_dir.path());
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Table 7 does not exist"));
}

// =============================================================================
// Check / Fix Tests
// =============================================================================

#[test]
fn test_check_reports_drift_and_fix_repairs_it() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();

    for n in ["T1", "T2", "T3"] {
        ok(&["table", "add", n], dir);
    }
    ok(&["order", "add", "1"], dir);
    ok(&["order", "add", "2"], dir);
    // stale flag on T1, phantom flag on T3
    ok(&["table", "set", "1", "--has-active-order", "false", "-s", "available"], dir);
    ok(&["table", "set", "3", "--has-active-order", "true", "-s", "occupied"], dir);

    let output = run_tablestate(&["check"], dir);
    assert_eq!(output.status.code(), Some(2), "check should exit 2 on drift");
    let out = stdout(&output);
    assert!(out.contains("DRIFT"));
    assert!(out.contains("3 tables scanned, 2 drifted"));

    let report = json(&["fix", "--json"], dir);
    assert_eq!(report["tables_scanned"], 3);
    assert_eq!(report["tables_fixed"], 2);

    let output = run_tablestate(&["check"], dir);
    assert_eq!(output.status.code(), Some(0));

    let report = json(&["fix", "--json"], dir);
    assert_eq!(report["tables_fixed"], 0);
}

#[test]
fn test_fix_single_table() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();

    ok(&["table", "add", "T1"], dir);
    ok(&["table", "set", "1", "--has-active-order", "true", "-s", "occupied"], dir);

    let result = json(&["fix", "--table", "1", "--json"], dir);
    assert_eq!(result["changed"], true);
    assert_eq!(result["before"]["has_active_order"], true);
    assert_eq!(result["after"]["has_active_order"], false);
    assert_eq!(result["after"]["status"], "available");

    let out = ok(&["fix", "--table", "1"], dir);
    assert!(out.contains("OK"));
}

#[test]
fn test_fix_missing_table_reports_not_found() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let output = run_tablestate(&["fix", "--table", "12"], temp_dir.path());
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Table 12 does not exist"));
}

#[test]
fn test_policy_flag_controls_reserved_tables() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();

    ok(&["table", "add", "T1"], dir);
    ok(&["table", "set", "1", "-s", "reserved", "--has-active-order", "true"], dir);

    let preserved = json(&["check", "--table", "1", "--json"], dir);
    assert_eq!(preserved["after"]["status"], "reserved");

    let result = json(&["fix", "--table", "1", "--json", "--policy", "overwrite"], dir);
    assert_eq!(result["after"]["status"], "available");
    assert_eq!(result["after"]["has_active_order"], false);
}

#[test]
fn test_config_policy_is_used() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();
    std::fs::create_dir_all(dir.join(".tablestate")).unwrap();
    std::fs::write(
        dir.join(".tablestate/config.toml"),
        "[reconcile]\npolicy = \"overwrite\"\n\n[billing]\ntax_rate_percent = 10.0\n",
    )
    .unwrap();

    ok(&["table", "add", "T1"], dir);
    ok(&["order", "add", "1", "--subtotal", "1000"], dir);
    let orders = json(&["order", "list", "--json"], dir);
    assert_eq!(orders[0]["tax_cents"], 100);
    assert_eq!(orders[0]["total_cents"], 1100);

    ok(&["table", "set", "1", "-s", "reserved", "--has-active-order", "true"], dir);
    ok(&["order", "status", "1", "cancelled"], dir);
    let table = json(&["table", "show", "1", "--json"], dir);
    assert_eq!(table["table"]["status"], "available");
}
