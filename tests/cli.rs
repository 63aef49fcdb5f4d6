mod common;

use std::fs;

use assert_cmd::Command;
use ci_reconcile::config::ReconcileConfig;
use common::{TestWorkspace, fixture_path};
use predicates::str::contains;

fn bin() -> Command {
    Command::cargo_bin("ci-reconcile").expect("binary exists")
}

#[test]
fn analyze_prints_summary_and_writes_reports() {
    let workspace = TestWorkspace::new();
    let json_path = workspace.path().join("findings.json");
    let report_dir = workspace.path().join("bundle");
    bin()
        .args([
            "analyze",
            "-i",
            fixture_path("ci_export.csv").to_str().unwrap(),
            "--json",
            json_path.to_str().unwrap(),
            "--report-dir",
            report_dir.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("ci_export"))
        .stdout(contains("duplicate groups"))
        .stdout(contains("policy violations"))
        .stdout(contains("remaining_duplicates"));

    let document: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).expect("read json")).expect("parse");
    assert_eq!(document["fingerprint"].as_str().map(str::len), Some(64));
    assert_eq!(document["summary"]["duplicate_groups"], 5);
    assert_eq!(document["summary"]["plans_with_serial_duplicates"], 1);
    assert_eq!(document["summary"]["policy_violations"], 2);

    for name in [
        "duplicates.csv",
        "attribute_risks.csv",
        "policy_violations.csv",
        "plan_summary.csv",
        "notices.csv",
        "summary.csv",
    ] {
        assert!(report_dir.join(name).exists(), "{name} missing");
    }
    assert!(!report_dir.join("removals.csv").exists());
    let violations = fs::read_to_string(report_dir.join("policy_violations.csv")).expect("read");
    assert_eq!(violations.lines().count(), 3);
    assert!(violations.contains("manual-entry-non-production"));
    let plans = fs::read_to_string(report_dir.join("plan_summary.csv")).expect("read");
    assert!(plans.contains("before,ci_export,P1,false,4,3,1,1,25.00"));
}

#[test]
fn analyze_fingerprint_is_stable_across_runs() {
    let workspace = TestWorkspace::new();
    let mut fingerprints = Vec::new();
    for run in 0..2 {
        let json_path = workspace.path().join(format!("run{run}.json"));
        bin()
            .args([
                "analyze",
                "-i",
                fixture_path("ci_export.csv").to_str().unwrap(),
                "--json",
                json_path.to_str().unwrap(),
            ])
            .assert()
            .success();
        let document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).expect("read")).expect("parse");
        fingerprints.push(document["fingerprint"].clone());
    }
    assert_eq!(fingerprints[0], fingerprints[1]);
}

#[test]
fn analyze_with_after_extract_writes_removals() {
    let workspace = TestWorkspace::new();
    let report_dir = workspace.path().join("bundle");
    bin()
        .args([
            "analyze",
            "-i",
            fixture_path("ci_export.csv").to_str().unwrap(),
            "--after",
            fixture_path("ci_export_after.csv").to_str().unwrap(),
            "--report-dir",
            report_dir.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("removed records"));
    let removals = fs::read_to_string(report_dir.join("removals.csv")).expect("read");
    assert!(removals.contains("DB:srv1"));
    assert!(removals.contains("nas: filer01"));
}

#[test]
fn analyze_reports_aborted_partition_without_failing() {
    let workspace = TestWorkspace::new();
    let broken = workspace.write("broken.csv", "Name,Plan\nsrv1,P1\n");
    bin()
        .args([
            "analyze",
            "-i",
            broken.to_str().unwrap(),
            "-i",
            fixture_path("ci_export.csv").to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("aborted"))
        .stdout(contains("analyzed"));
}

#[test]
fn analyze_reads_windows_1252_exports() {
    let workspace = TestWorkspace::new();
    let mut bytes = b"Name,Type,Plan,Comments\nsrv1,Server,P1,caf".to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b"\nsrv1,Server,P1,\n");
    let input = workspace.write_bytes("legacy.csv", &bytes);
    let json_path = workspace.path().join("legacy.json");
    bin()
        .args([
            "analyze",
            "-i",
            input.to_str().unwrap(),
            "--json",
            json_path.to_str().unwrap(),
        ])
        .assert()
        .success();
    let document = fs::read_to_string(&json_path).expect("read");
    assert!(document.contains("windows-1252"));
}

#[test]
fn analyze_rejects_spreadsheets() {
    let workspace = TestWorkspace::new();
    let workbook = workspace.write("export.xlsx", "not really a workbook");
    bin()
        .args(["analyze", "-i", workbook.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("export the sheet to CSV"));
}

#[test]
fn diff_reports_completeness_and_writes_bundle() {
    let workspace = TestWorkspace::new();
    let report_dir = workspace.path().join("diff");
    bin()
        .args([
            "diff",
            "-r",
            fixture_path("reference.csv").to_str().unwrap(),
            "-m",
            fixture_path("comparison.csv").to_str().unwrap(),
            "--report-dir",
            report_dir.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("sys_id"))
        .stdout(contains("66.67"));
    let differences = fs::read_to_string(report_dir.join("differences.csv")).expect("read");
    assert!(differences.contains("K2,name,Bob,Bobby,Different"));
    assert!(differences.contains("K4,email,d@x.com,,Missing"));
    let notices = fs::read_to_string(report_dir.join("notices.csv")).expect("read");
    assert!(notices.contains("empty_key_record,reference,5"));
}

#[test]
fn diff_columns_only_skips_key_resolution() {
    let workspace = TestWorkspace::new();
    let left = workspace.write("left.csv", "a,b\n1,2\n");
    let right = workspace.write("right.csv", "b,c\n2,3\n");
    bin()
        .args([
            "diff",
            "-r",
            left.to_str().unwrap(),
            "-m",
            right.to_str().unwrap(),
            "--columns-only",
        ])
        .assert()
        .success()
        .stdout(contains("missing"))
        .stdout(contains("extra"));
}

#[test]
fn diff_without_detectable_key_asks_for_one() {
    let workspace = TestWorkspace::new();
    let left = workspace.write("left.csv", "a,b\n1,2\n");
    let right = workspace.write("right.csv", "a,b\n1,3\n");
    bin()
        .args(["diff", "-r", left.to_str().unwrap(), "-m", right.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("pass --key"));
    bin()
        .args([
            "diff",
            "-r",
            left.to_str().unwrap(),
            "-m",
            right.to_str().unwrap(),
            "--key",
            "a",
        ])
        .assert()
        .success()
        .stdout(contains("value differences"));
}

#[test]
fn config_template_round_trips_and_drives_analysis() {
    let workspace = TestWorkspace::new();
    let config_path = workspace.path().join("reconcile.yml");
    bin()
        .args(["config", "-o", config_path.to_str().unwrap()])
        .assert()
        .success();
    let loaded = ReconcileConfig::load(&config_path).expect("load config");
    assert_eq!(loaded, ReconcileConfig::default());

    bin()
        .args(["config", "-o", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("--force"));

    let yaml = fs::read_to_string(&config_path)
        .expect("read")
        .replace("production_substring: prod", "production_substring: null");
    let strict = workspace.write("strict.yml", &yaml);
    bin()
        .args([
            "analyze",
            "-i",
            fixture_path("ci_export.csv").to_str().unwrap(),
            "-c",
            strict.to_str().unwrap(),
        ])
        .assert()
        .success();
}

#[test]
fn config_rejects_unknown_keys() {
    let workspace = TestWorkspace::new();
    let config = workspace.write("bad.yml", "separator: ':'\ncritical_attribute: []\n");
    bin()
        .args([
            "analyze",
            "-i",
            fixture_path("ci_export.csv").to_str().unwrap(),
            "-c",
            config.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("critical_attribute"));
}
