//! Fragment database.
//!
//! A SQLite file storing:
//! - `fragments`: canonical instruction bytes, content-addressed
//! - `sources`: (fragment, file name, offset) occurrences
//! - `prints`: (vector set, fragment, symbol) -> signature
//! - `evaluations`: (vector set, fragment) -> outcome, one row per execution battery
//! - `scans`: one bookkeeping row per scanned file

mod fragment_db;
mod models;

pub use fragment_db::{DbError, DbResult, FragmentDb, CURRENT_SCHEMA_VERSION};
pub use models::{
    DbStats, EvaluationOutcome, FragmentMatch, FragmentRecord, ScanCounts, ScanRecord,
    SourceRecord,
};
