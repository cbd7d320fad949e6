use serde::{Deserialize, Serialize};

/// A stored fragment: canonical instruction bytes and their row id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FragmentRecord {
    pub id: i64,
    pub insns: Vec<u8>,
}

/// One occurrence of a fragment in a scanned file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRecord {
    /// File name (no directory) the fragment was found in.
    pub filename: String,
    /// Byte offset of the fragment in that file.
    pub offset: u64,
}

/// A query hit with every place it was found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FragmentMatch {
    pub fragment: FragmentRecord,
    pub sources: Vec<SourceRecord>,
}

/// What running a fragment against one vector set produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// Fingerprints were stored.
    Accepted,
    Boring,
    TooMuch,
    Disqualified,
}

impl EvaluationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationOutcome::Accepted => "accepted",
            EvaluationOutcome::Boring => "boring",
            EvaluationOutcome::TooMuch => "too_much",
            EvaluationOutcome::Disqualified => "disqualified",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "accepted" => Some(EvaluationOutcome::Accepted),
            "boring" => Some(EvaluationOutcome::Boring),
            "too_much" => Some(EvaluationOutcome::TooMuch),
            "disqualified" => Some(EvaluationOutcome::Disqualified),
            _ => None,
        }
    }
}

/// Tallies for one scanned file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanCounts {
    /// Candidates that validated and canonicalized.
    pub candidates: u64,
    /// Candidates whose canonical bytes were not yet stored.
    pub new_fragments: u64,
    /// Fragments executed because the vector set had not evaluated them yet.
    pub evaluated: u64,
    /// Evaluated fragments whose fingerprints were stored.
    pub accepted: u64,
}

impl ScanCounts {
    pub fn add(&mut self, other: &ScanCounts) {
        self.candidates += other.candidates;
        self.new_fragments += other.new_fragments;
        self.evaluated += other.evaluated;
        self.accepted += other.accepted;
    }
}

/// Bookkeeping row for one scanned file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanRecord {
    pub filename: String,
    pub vecset: String,
    /// RFC 3339 timestamps.
    pub started_at: String,
    pub finished_at: Option<String>,
    pub counts: ScanCounts,
}

/// Row counts across the whole database.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbStats {
    pub fragments: u64,
    pub sources: u64,
    pub prints: u64,
    pub fingerprinted_fragments: u64,
    /// (vector set, fragment) pairs that have been executed, whatever the outcome.
    pub evaluations: u64,
    pub vecsets: u64,
}
