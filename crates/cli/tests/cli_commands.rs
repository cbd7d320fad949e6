use std::fs;

use predicates::prelude::*;
use tempfile::tempdir;

/// INC $10; NOP; DEC $10; NOP
const ROM: [u8; 6] = [0xe6, 0x10, 0xea, 0xc6, 0x10, 0xea];

fn write_rom(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, ROM).expect("write rom");
    path
}

/// End to end: a scanned fragment is found by an equivalent query.
#[test]
fn scan_then_query_finds_the_fragment() {
    let dir = tempdir().expect("tempdir");
    let rom = write_rom(dir.path(), "rom.bin");
    let db = dir.path().join("prints.db");

    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .arg("scan")
        .arg("--db")
        .arg(&db)
        .arg(&rom)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 new fragments"));

    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .arg("query")
        .arg("--db")
        .arg(&db)
        .arg("[0x20] = [0x20] + 1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fragment #1"))
        .stdout(predicate::str::contains("found in rom.bin at offset 0x0"))
        .stdout(predicate::str::contains("INC $20"));
}

/// A query nothing satisfies says so.
#[test]
fn query_reports_no_matches() {
    let dir = tempdir().expect("tempdir");
    let rom = write_rom(dir.path(), "rom.bin");
    let db = dir.path().join("prints.db");

    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .args(["scan", "--db"])
        .arg(&db)
        .arg(&rom)
        .assert()
        .success();

    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .args(["query", "--db"])
        .arg(&db)
        .arg("[0x20] = [0x20] ^ 0x5a")
        .assert()
        .success()
        .stdout(predicate::str::contains("No matching fragments."));
}

/// A query that writes no symbols has nothing to look up.
#[test]
fn query_without_symbols_prints_nothing_to_match() {
    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .arg("query")
        .arg("# only a comment")
        .assert()
        .success()
        .stdout(predicate::str::contains("No fingerprints generated."));
}

/// Without a database, `query` just prints the fingerprint.
#[test]
fn query_without_db_prints_the_fingerprint() {
    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .arg("query")
        .arg("A = 0; Z = 1")
        .assert()
        .success()
        .stdout(predicate::str::contains("A: 00000000000000000000000000000000"))
        .stdout(predicate::str::contains("Z: 01010101010101010101010101010101"));
}

/// Malformed query text exits non-zero.
#[test]
fn query_parse_errors_fail() {
    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .arg("query")
        .arg("A = (1 +")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse query"));
}

/// `--json` emits parseable JSON.
#[test]
fn query_json_output_is_valid() {
    let output = assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .args(["query", "--json", "X = X + 1"])
        .output()
        .expect("run query");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["vecset"].as_str().map(str::len), Some(64));
    assert!(value["fingerprint"]["X"].is_string());
    assert!(value.get("matches").is_none());
}

/// `inspect` shows the valid prefix, canonical bytes, address map and verdict.
#[test]
fn inspect_prints_each_stage() {
    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .args(["inspect", "a5 10 e6 10 60"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Valid prefix: 4 bytes"))
        .stdout(predicate::str::contains("Canonical: a5 20 e6 20"))
        .stdout(predicate::str::contains("$0010 -> $0020"))
        .stdout(predicate::str::contains("Verdict: accepted"));
}

/// `inspect` names the reason a fragment was disqualified.
#[test]
fn inspect_reports_disqualification() {
    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .args(["inspect", "48e8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Disqualified"));
}

/// A dangling hex digit is rejected.
#[test]
fn inspect_rejects_bad_hex() {
    assert_cmd::cargo::cargo_bin_cmd!("fragprint").args(["inspect", "a5 1"]).assert().failure();
}

/// `stats` lists every recorded scan.
#[test]
fn stats_lists_scans() {
    let dir = tempdir().expect("tempdir");
    let first = write_rom(dir.path(), "one.bin");
    let second = write_rom(dir.path(), "two.bin");
    let db = dir.path().join("prints.db");

    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .args(["scan", "--db"])
        .arg(&db)
        .arg(&first)
        .arg(&second)
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 4 candidates, 2 new fragments, 2 evaluated"));

    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .args(["stats", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Fragments: 2"))
        .stdout(predicate::str::contains("Sources: 4"))
        .stdout(predicate::str::contains("Evaluations: 2"))
        .stdout(predicate::str::contains("one.bin"))
        .stdout(predicate::str::contains("two.bin"));

    let output = assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .args(["stats", "--json", "--db"])
        .arg(&db)
        .output()
        .expect("run stats");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["stats"]["fragments"], 2);
    assert_eq!(value["stats"]["evaluations"], 2);
    assert_eq!(value["scans"].as_array().map(Vec::len), Some(2));
}

/// `scan` with no inputs is a usage error.
#[test]
fn scan_requires_files() {
    let dir = tempdir().expect("tempdir");
    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .args(["scan", "--db"])
        .arg(dir.path().join("prints.db"))
        .assert()
        .failure();
}

/// `-v` sends tracing output to stderr.
#[test]
fn verbose_scan_logs_to_stderr() {
    let dir = tempdir().expect("tempdir");
    let rom = write_rom(dir.path(), "rom.bin");

    assert_cmd::cargo::cargo_bin_cmd!("fragprint")
        .args(["-v", "scan", "--db"])
        .arg(dir.path().join("prints.db"))
        .arg(&rom)
        .assert()
        .success()
        .stderr(predicate::str::contains("fingerprinted"));
}
