// crates/core/tests/scan_db.rs

use fragprint_core::config::ScanConfig;
use fragprint_core::db::{
    DbError, EvaluationOutcome, FragmentDb, SourceRecord, CURRENT_SCHEMA_VERSION,
};
use fragprint_core::fingerprint::signature_pairs;
use fragprint_core::query::{evaluate, Program};
use fragprint_core::scan::Scanner;
use rusqlite::Connection;
use tempfile::tempdir;

/// Two occurrences of one canonical fragment share a row and keep both offsets.
#[test]
fn identical_fragments_are_stored_once_with_every_source() {
    let db = FragmentDb::open_in_memory().expect("open db");
    let mut scanner = Scanner::new(ScanConfig::default());

    // LDA $10; NOP; LDA $10
    let data = [0xa5, 0x10, 0xea, 0xa5, 0x10];
    let counts = scanner.scan_bytes(&db, &data, "game.bin").expect("scan");
    assert_eq!(counts.candidates, 2);
    assert_eq!(counts.new_fragments, 1);
    assert_eq!(counts.accepted, 1);

    let stats = db.stats().expect("stats");
    assert_eq!(stats.fragments, 1);
    assert_eq!(stats.sources, 2);
    assert_eq!(stats.fingerprinted_fragments, 1);
    assert_eq!(stats.vecsets, 1);

    let fragment = db.fragment(1).expect("fragment query").expect("fragment 1 stored");
    assert_eq!(fragment.insns, [0xa5, 0x20]);
    let sources = db.sources(1).expect("sources");
    assert_eq!(
        sources,
        vec![
            SourceRecord { filename: "game.bin".into(), offset: 0 },
            SourceRecord { filename: "game.bin".into(), offset: 3 },
        ]
    );
}

/// A second scan of the same image with the same vectors neither inserts nor reruns anything.
#[test]
fn rescanning_adds_no_fragments() {
    let db = FragmentDb::open_in_memory().expect("open db");
    let mut scanner = Scanner::new(ScanConfig::default());
    let data = [0xa5, 0x10, 0xe6, 0x11, 0xa6, 0x12, 0xe8];

    let first = scanner.scan_bytes(&db, &data, "a.bin").expect("first scan");
    let second = scanner.scan_bytes(&db, &data, "a.bin").expect("second scan");
    assert!(first.new_fragments > 0);
    assert_eq!(second.new_fragments, 0);
    assert_eq!(second.accepted, 0);
    assert_eq!(first.candidates, second.candidates);
}

/// A second vector set fingerprints fragments an earlier scan already stored.
#[test]
fn new_vector_set_fingerprints_known_fragments() {
    let db = FragmentDb::open_in_memory().expect("open db");
    // LDA $10; ADC $11; STA $12
    let data = [0xa5, 0x10, 0x65, 0x11, 0x85, 0x12];

    let mut first = Scanner::new(ScanConfig::default());
    let before = first.scan_bytes(&db, &data, "rom.bin").expect("first scan");
    assert!(before.accepted > 0);

    let mut config = ScanConfig::default();
    config.vectors.count = 8;
    let mut second = Scanner::new(config);
    assert_ne!(first.vectors().identity(), second.vectors().identity());
    let after = second.scan_bytes(&db, &data, "rom.bin").expect("second scan");
    assert_eq!(after.new_fragments, 0);
    assert_eq!(after.candidates, before.candidates);
    assert_eq!(after.evaluated, before.evaluated);
    assert!(after.accepted > 0);

    let stats = db.stats().expect("stats");
    assert_eq!(stats.vecsets, 2);
    assert_eq!(stats.evaluations, before.evaluated + after.evaluated);

    let vecset = second.vectors().identity();
    let prints = db.prints(vecset, 1).expect("prints");
    assert!(!prints.is_empty());
    let matches = db.find_matches(vecset, &prints, None).expect("find matches");
    assert!(matches.iter().any(|m| m.fragment.id == 1));

    // Both vector sets are now complete for this image.
    let again = second.scan_bytes(&db, &data, "rom.bin").expect("third scan");
    assert_eq!(again.evaluated, 0);
}

/// Rejected outcomes are remembered so rescans do not rerun them.
#[test]
fn rejected_fragments_are_not_rerun() {
    let db = FragmentDb::open_in_memory().expect("open db");
    let mut scanner = Scanner::new(ScanConfig::default());
    // PHA; INX
    let first = scanner.scan_bytes(&db, &[0x48, 0xe8], "stack.bin").expect("first scan");
    assert_eq!(first.evaluated, 1);

    let vecset = scanner.vectors().identity().to_string();
    assert_eq!(
        db.evaluation(&vecset, 1).expect("evaluation"),
        Some(EvaluationOutcome::Disqualified)
    );
    assert!(db.is_evaluated(&vecset, 1).expect("is evaluated"));
    assert!(!db.is_evaluated("other-vs", 1).expect("is evaluated elsewhere"));

    let second = scanner.scan_bytes(&db, &[0x48, 0xe8], "stack.bin").expect("second scan");
    assert_eq!(second.candidates, first.candidates);
    assert_eq!(second.evaluated, 0);
    assert_eq!(db.stats().expect("stats").evaluations, 1);
}

/// Shorter prefixes of the longest fragment at an offset are scanned too.
#[test]
fn suffixes_are_tried_after_the_longest_fragment() {
    let db = FragmentDb::open_in_memory().expect("open db");
    let mut scanner = Scanner::new(ScanConfig::default());
    // INX; INX; INX
    let counts = scanner.scan_bytes(&db, &[0xe8, 0xe8, 0xe8], "x.bin").expect("scan");
    // offset 0: 3 bytes, then 2; offset 1: 2 bytes (already stored)
    assert_eq!(counts.candidates, 3);
    assert_eq!(counts.new_fragments, 2);
}

/// Stack imbalance stores the fragment and its outcome but no fingerprint rows.
#[test]
fn disqualified_fragments_are_stored_without_prints() {
    let db = FragmentDb::open_in_memory().expect("open db");
    let mut scanner = Scanner::new(ScanConfig::default());
    // PHA; INX
    let counts = scanner.scan_bytes(&db, &[0x48, 0xe8], "stack.bin").expect("scan");
    assert_eq!(counts.new_fragments, 1);
    assert_eq!(counts.accepted, 0);

    let stats = db.stats().expect("stats");
    assert_eq!(stats.fragments, 1);
    assert_eq!(stats.prints, 0);
}

/// `scan_file` writes a finished `scans` row carrying the returned counts.
#[test]
fn scan_file_records_a_scan_row() {
    let tmp = tempdir().expect("temp dir");
    let bin = tmp.path().join("rom.bin");
    std::fs::write(&bin, [0xa5, 0x10, 0x65, 0x11, 0x85, 0x12]).expect("write rom");
    let db = FragmentDb::open(&tmp.path().join("prints.db")).expect("open db");

    let mut scanner = Scanner::new(ScanConfig::default());
    let counts = scanner.scan_file(&db, &bin).expect("scan file");

    let scans = db.list_scans().expect("list scans");
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].filename, "rom.bin");
    assert_eq!(scans[0].vecset, scanner.vectors().identity());
    assert!(scans[0].finished_at.is_some());
    assert_eq!(scans[0].counts, counts);
}

/// A missing input file names the path in the error.
#[test]
fn scan_file_reports_missing_input() {
    let tmp = tempdir().expect("temp dir");
    let db = FragmentDb::open_in_memory().expect("open db");
    let mut scanner = Scanner::new(ScanConfig::default());
    let err = scanner.scan_file(&db, &tmp.path().join("missing.bin")).unwrap_err();
    assert!(err.to_string().contains("missing.bin"), "unexpected error: {err}");
}

/// A textual query fingerprints the same as the scanned fragment it describes.
#[test]
fn query_finds_equivalent_fragment() {
    let db = FragmentDb::open_in_memory().expect("open db");
    let mut scanner = Scanner::new(ScanConfig::default());
    // INC $10; NOP; DEC $10; NOP
    scanner.scan_bytes(&db, &[0xe6, 0x10, 0xea, 0xc6, 0x10, 0xea], "inc.bin").expect("scan");

    let program = Program::parse("[0x20] = [0x20] + 1").expect("parse");
    let prints = evaluate(&program, scanner.vectors(), scanner.config()).expect("evaluate");
    assert_eq!(prints.len(), 1);

    let matches = db
        .find_matches(scanner.vectors().identity(), &signature_pairs(&prints), None)
        .expect("find matches");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].fragment.insns, [0xe6, 0x20]);
    assert_eq!(matches[0].sources, vec![SourceRecord { filename: "inc.bin".into(), offset: 0 }]);
}

/// Closures and parsed programs fingerprint identically.
#[test]
fn closure_probes_are_accepted() {
    use fragprint_core::bus::RunState;
    use fragprint_core::cpu::Bus;
    use fragprint_core::query::QueryError;

    let scanner = Scanner::new(ScanConfig::default());
    let probe = |state: &mut RunState<'_>| -> Result<(), QueryError> {
        let value = state.read(0x20);
        state.write(0x20, value.wrapping_sub(1));
        Ok(())
    };
    let from_closure = evaluate(&probe, scanner.vectors(), scanner.config()).expect("closure");
    let program = Program::parse("[0x20] = [0x20] - 1").expect("parse");
    let from_text = evaluate(&program, scanner.vectors(), scanner.config()).expect("program");
    assert_eq!(from_closure, from_text);
}

/// Matches are scoped to one vector set, longest first, and honor the limit.
#[test]
fn find_matches_orders_longest_first() {
    let db = FragmentDb::open_in_memory().expect("open db");
    let (short, _) = db.lookup_or_insert_fragment(&[0xe8, 0xe8]).expect("insert short");
    let (long, _) = db.lookup_or_insert_fragment(&[0xe8, 0xe8, 0xea]).expect("insert long");
    let (other, _) = db.lookup_or_insert_fragment(&[0xca, 0xca]).expect("insert other");
    for id in [short, long] {
        db.add_print("vs", id, "X", "0203").expect("add print");
    }
    db.add_print("vs", other, "X", "feff").expect("add print");
    db.add_print("other-vs", other, "X", "0203").expect("add print");

    let wanted = vec![("X".to_string(), "0203".to_string())];
    let matches = db.find_matches("vs", &wanted, None).expect("find");
    let ids: Vec<i64> = matches.iter().map(|m| m.fragment.id).collect();
    assert_eq!(ids, vec![long, short]);

    let limited = db.find_matches("vs", &wanted, Some(1)).expect("find limited");
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].fragment.id, long);

    assert!(db.find_matches("vs", &[], None).expect("empty query").is_empty());
}

/// Fragment inserts are idempotent and duplicate sources are ignored.
#[test]
fn lookup_or_insert_reports_new_rows() {
    let db = FragmentDb::open_in_memory().expect("open db");
    let (id, inserted) = db.lookup_or_insert_fragment(&[0xa5, 0x20]).expect("insert");
    assert!(inserted);
    let (again, inserted) = db.lookup_or_insert_fragment(&[0xa5, 0x20]).expect("lookup");
    assert_eq!(id, again);
    assert!(!inserted);

    db.add_source(id, "f.bin", 7).expect("source");
    db.add_source(id, "f.bin", 7).expect("duplicate source ignored");
    assert_eq!(db.sources(id).expect("sources").len(), 1);
}

/// Opening a new file migrates it straight to the latest schema.
#[test]
fn fresh_database_is_at_current_schema_version() {
    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("prints.db");
    FragmentDb::open(&path).expect("open db");

    let conn = Connection::open(&path).expect("raw open");
    let version: i32 =
        conn.query_row("PRAGMA user_version;", [], |row| row.get(0)).expect("user_version");
    assert_eq!(version, CURRENT_SCHEMA_VERSION);

    // Reopening an up-to-date database is a no-op.
    FragmentDb::open(&path).expect("reopen db");
}

/// A database written by a newer build is refused rather than downgraded.
#[test]
fn newer_schema_versions_are_rejected() {
    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("prints.db");
    {
        let conn = Connection::open(&path).expect("open raw sqlite db");
        conn.pragma_update(None, "user_version", 99_i32).expect("set user_version pragma");
    }

    match FragmentDb::open(&path) {
        Err(DbError::UnsupportedSchemaVersion { found, min_supported, max_supported }) => {
            assert_eq!(found, 99);
            assert_eq!(min_supported, 0);
            assert_eq!(max_supported, CURRENT_SCHEMA_VERSION);
        }
        Err(err) => panic!("expected UnsupportedSchemaVersion, got {err}"),
        Ok(_) => panic!("expected UnsupportedSchemaVersion, got Ok(_)"),
    }
}

/// Upgrading a v2 database marks its fingerprinted fragments as evaluated.
#[test]
fn migration_backfills_evaluations_from_prints() {
    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("prints.db");
    {
        let conn = Connection::open(&path).expect("open raw sqlite db");
        conn.execute_batch(
            r#"
            CREATE TABLE fragments (
                id    INTEGER PRIMARY KEY AUTOINCREMENT,
                insns BLOB NOT NULL UNIQUE
            );
            CREATE TABLE sources (
                fragid   INTEGER NOT NULL REFERENCES fragments(id),
                filename TEXT NOT NULL,
                offset   INTEGER NOT NULL,
                UNIQUE(fragid, filename, offset)
            );
            CREATE TABLE prints (
                vecset TEXT NOT NULL,
                fragid INTEGER NOT NULL REFERENCES fragments(id),
                sym    TEXT NOT NULL,
                print  TEXT NOT NULL,
                PRIMARY KEY(vecset, fragid, sym)
            );
            CREATE TABLE scans (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                filename      TEXT NOT NULL,
                vecset        TEXT NOT NULL,
                started_at    TEXT NOT NULL,
                finished_at   TEXT,
                candidates    INTEGER NOT NULL DEFAULT 0,
                new_fragments INTEGER NOT NULL DEFAULT 0,
                accepted      INTEGER NOT NULL DEFAULT 0
            );
            INSERT INTO fragments (insns) VALUES (x'e820'), (x'4820');
            INSERT INTO prints VALUES ('vs', 1, 'X', '0203'), ('vs', 1, 'P', '0000');
            INSERT INTO scans (filename, vecset, started_at, candidates, new_fragments, accepted)
                VALUES ('old.bin', 'vs', '2024-01-01T00:00:00Z', 2, 2, 1);
            PRAGMA user_version = 2;
            "#,
        )
        .expect("build v2 schema");
    }

    let db = FragmentDb::open(&path).expect("migrate");
    assert_eq!(db.evaluation("vs", 1).expect("evaluation"), Some(EvaluationOutcome::Accepted));
    assert_eq!(db.evaluation("vs", 2).expect("evaluation"), None);
    assert_eq!(db.stats().expect("stats").evaluations, 1);

    let scans = db.list_scans().expect("list scans");
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].counts.evaluated, 0);
    assert_eq!(scans[0].counts.accepted, 1);
}
