use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use thiserror::Error;

use crate::db::{
    DbStats, EvaluationOutcome, FragmentMatch, FragmentRecord, ScanCounts, ScanRecord,
    SourceRecord,
};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Error type for fragment database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// Content-addressed store of fragments, their source occurrences and fingerprints.
#[derive(Debug)]
pub struct FragmentDb {
    conn: Connection,
}

impl FragmentDb {
    /// Open (or create) a fragment database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Start a transaction; statements issued through `self` while it is open join it.
    pub fn begin(&self) -> DbResult<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// Look up a fragment by its bytes, inserting it if unknown.
    ///
    /// Returns the fragment id and whether it was newly inserted.
    pub fn lookup_or_insert_fragment(&self, insns: &[u8]) -> DbResult<(i64, bool)> {
        let existing: Option<i64> = self
            .conn
            .prepare_cached("SELECT id FROM fragments WHERE insns = ?1")?
            .query_row(params![insns], |row| row.get(0))
            .optional()?;
        if let Some(id) = existing {
            return Ok((id, false));
        }
        self.conn
            .prepare_cached("INSERT INTO fragments (insns) VALUES (?1)")?
            .execute(params![insns])?;
        Ok((self.conn.last_insert_rowid(), true))
    }

    /// Record that a fragment occurs in `filename` at `offset`. Duplicates are ignored.
    pub fn add_source(&self, fragid: i64, filename: &str, offset: u64) -> DbResult<()> {
        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO sources (fragid, filename, offset) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![fragid, filename, offset as i64])?;
        Ok(())
    }

    /// Record one symbol's signature for a fragment. Duplicates are ignored.
    pub fn add_print(&self, vecset: &str, fragid: i64, sym: &str, print: &str) -> DbResult<()> {
        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO prints (vecset, fragid, sym, print) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![vecset, fragid, sym, print])?;
        Ok(())
    }

    /// Record what running `fragid` against `vecset` produced. The first outcome wins.
    pub fn record_evaluation(
        &self,
        vecset: &str,
        fragid: i64,
        outcome: EvaluationOutcome,
    ) -> DbResult<()> {
        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO evaluations (vecset, fragid, outcome) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![vecset, fragid, outcome.as_str()])?;
        Ok(())
    }

    /// Outcome of running `fragid` against `vecset`, if it has been run.
    pub fn evaluation(&self, vecset: &str, fragid: i64) -> DbResult<Option<EvaluationOutcome>> {
        let outcome: Option<String> = self
            .conn
            .prepare_cached("SELECT outcome FROM evaluations WHERE vecset = ?1 AND fragid = ?2")?
            .query_row(params![vecset, fragid], |row| row.get(0))
            .optional()?;
        Ok(outcome.as_deref().and_then(EvaluationOutcome::parse))
    }

    /// Whether `fragid` has already been executed against `vecset`.
    pub fn is_evaluated(&self, vecset: &str, fragid: i64) -> DbResult<bool> {
        let found: Option<i64> = self
            .conn
            .prepare_cached("SELECT 1 FROM evaluations WHERE vecset = ?1 AND fragid = ?2")?
            .query_row(params![vecset, fragid], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn fragment(&self, fragid: i64) -> DbResult<Option<FragmentRecord>> {
        Ok(self
            .conn
            .query_row("SELECT id, insns FROM fragments WHERE id = ?1", params![fragid], |row| {
                Ok(FragmentRecord { id: row.get(0)?, insns: row.get(1)? })
            })
            .optional()?)
    }

    pub fn sources(&self, fragid: i64) -> DbResult<Vec<SourceRecord>> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT filename, offset FROM sources
            WHERE fragid = ?1
            ORDER BY filename, offset
            "#,
        )?;
        let rows = stmt.query_map(params![fragid], |row| {
            Ok(SourceRecord { filename: row.get(0)?, offset: row.get::<_, i64>(1)? as u64 })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Stored signatures of one fragment under one vector set, ordered by symbol.
    pub fn prints(&self, vecset: &str, fragid: i64) -> DbResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT sym, print FROM prints
            WHERE vecset = ?1 AND fragid = ?2
            ORDER BY sym
            "#,
        )?;
        let rows = stmt.query_map(params![vecset, fragid], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Fragments whose stored signature equals `print` for every `(sym, print)` pair.
    ///
    /// Only signatures recorded under `vecset` are considered. Results are
    /// ordered longest fragment first, then by id. An empty `prints` slice
    /// matches nothing.
    pub fn find_matches(
        &self,
        vecset: &str,
        prints: &[(String, String)],
        limit: Option<usize>,
    ) -> DbResult<Vec<FragmentMatch>> {
        if prints.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from("SELECT f.id, f.insns FROM fragments f WHERE 1 = 1");
        let mut args: Vec<String> = Vec::with_capacity(prints.len() * 3);
        for (sym, print) in prints {
            let n = args.len();
            sql.push_str(&format!(
                " AND f.id IN (SELECT fragid FROM prints \
                 WHERE vecset = ?{} AND sym = ?{} AND print = ?{})",
                n + 1,
                n + 2,
                n + 3
            ));
            args.push(vecset.to_string());
            args.push(sym.clone());
            args.push(print.clone());
        }
        sql.push_str(" ORDER BY LENGTH(f.insns) DESC, f.id");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok(FragmentRecord { id: row.get(0)?, insns: row.get(1)? })
        })?;
        let mut fragments = Vec::new();
        for row in rows {
            fragments.push(row?);
        }

        let mut out = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let sources = self.sources(fragment.id)?;
            out.push(FragmentMatch { fragment, sources });
        }
        Ok(out)
    }

    /// Open a bookkeeping row for a file scan and return its id.
    pub fn begin_scan(&self, filename: &str, vecset: &str, started_at: &str) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO scans (filename, vecset, started_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![filename, vecset, started_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn finish_scan(
        &self,
        scan_id: i64,
        finished_at: &str,
        counts: &ScanCounts,
    ) -> DbResult<()> {
        self.conn.execute(
            r#"
            UPDATE scans
            SET finished_at = ?1, candidates = ?2, new_fragments = ?3, evaluated = ?4,
                accepted = ?5
            WHERE id = ?6
            "#,
            params![
                finished_at,
                counts.candidates as i64,
                counts.new_fragments as i64,
                counts.evaluated as i64,
                counts.accepted as i64,
                scan_id
            ],
        )?;
        Ok(())
    }

    pub fn list_scans(&self) -> DbResult<Vec<ScanRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT filename, vecset, started_at, finished_at,
                   candidates, new_fragments, evaluated, accepted
            FROM scans
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ScanRecord {
                filename: row.get(0)?,
                vecset: row.get(1)?,
                started_at: row.get(2)?,
                finished_at: row.get(3)?,
                counts: ScanCounts {
                    candidates: row.get::<_, i64>(4)? as u64,
                    new_fragments: row.get::<_, i64>(5)? as u64,
                    evaluated: row.get::<_, i64>(6)? as u64,
                    accepted: row.get::<_, i64>(7)? as u64,
                },
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn stats(&self) -> DbResult<DbStats> {
        let count = |sql: &str| -> DbResult<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };
        Ok(DbStats {
            fragments: count("SELECT COUNT(*) FROM fragments")?,
            sources: count("SELECT COUNT(*) FROM sources")?,
            prints: count("SELECT COUNT(*) FROM prints")?,
            fingerprinted_fragments: count("SELECT COUNT(DISTINCT fragid) FROM prints")?,
            evaluations: count("SELECT COUNT(*) FROM evaluations")?,
            vecsets: count("SELECT COUNT(DISTINCT vecset) FROM prints")?,
        })
    }
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: fragments, sources, prints
/// - 2: scans bookkeeping table
/// - 3: evaluations per (vector set, fragment); scans.evaluated
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS fragments (
                id    INTEGER PRIMARY KEY AUTOINCREMENT,
                insns BLOB NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS sources (
                fragid   INTEGER NOT NULL REFERENCES fragments(id),
                filename TEXT NOT NULL,
                offset   INTEGER NOT NULL,
                UNIQUE(fragid, filename, offset)
            );

            CREATE TABLE IF NOT EXISTS prints (
                vecset TEXT NOT NULL,
                fragid INTEGER NOT NULL REFERENCES fragments(id),
                sym    TEXT NOT NULL,
                print  TEXT NOT NULL,
                PRIMARY KEY(vecset, fragid, sym)
            );
            CREATE INDEX IF NOT EXISTS prints_by_signature ON prints (vecset, sym, print);

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS scans (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                filename      TEXT NOT NULL,
                vecset        TEXT NOT NULL,
                started_at    TEXT NOT NULL,
                finished_at   TEXT,
                candidates    INTEGER NOT NULL DEFAULT 0,
                new_fragments INTEGER NOT NULL DEFAULT 0,
                accepted      INTEGER NOT NULL DEFAULT 0
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
        current_version = 2;
    }

    if current_version < 3 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS evaluations (
                vecset  TEXT NOT NULL,
                fragid  INTEGER NOT NULL REFERENCES fragments(id),
                outcome TEXT NOT NULL,
                PRIMARY KEY(vecset, fragid)
            );
            -- fragments fingerprinted before this table existed
            INSERT OR IGNORE INTO evaluations (vecset, fragid, outcome)
                SELECT DISTINCT vecset, fragid, 'accepted' FROM prints;
            ALTER TABLE scans ADD COLUMN evaluated INTEGER NOT NULL DEFAULT 0;

            PRAGMA user_version = 3;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
