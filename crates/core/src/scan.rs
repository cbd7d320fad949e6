//! Scan orchestration: walk a binary image and fingerprint every fragment in it.

use std::path::Path;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::canon::{canonicalize, Canonicalization};
use crate::config::ScanConfig;
use crate::db::{DbError, EvaluationOutcome, FragmentDb, ScanCounts};
use crate::fingerprint::{fingerprints, Fingerprint, FingerprintEngine, Verdict};
use crate::runner::{Disqualified, ExecutionRunner};
use crate::validate::validate_sequence;
use crate::vectors::TestVectorSet;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to read binary {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Every stage of the pipeline applied to one byte sequence.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub validated_len: usize,
    /// Canonical bytes and layout, if canonicalization succeeded.
    pub canonical: Option<(Vec<u8>, Canonicalization)>,
    /// Fingerprint and verdict, or why execution was disqualified.
    pub outcome: Option<Result<(Fingerprint, Verdict), Disqualified>>,
}

/// Owns the per-session machinery: vectors, runner and fingerprint baseline.
#[derive(Debug)]
pub struct Scanner {
    config: ScanConfig,
    vectors: TestVectorSet,
    runner: ExecutionRunner,
    engine: FingerprintEngine,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        let vectors = TestVectorSet::generate(&config.vectors);
        let mut runner = ExecutionRunner::new(&config);
        // The empty sequence executes nothing and cannot be disqualified.
        let baseline = runner
            .run_all(&[], &vectors)
            .map(|results| fingerprints(&vectors, &results))
            .unwrap_or_default();
        let engine = FingerprintEngine::new(baseline, config.max_fingerprints);
        Self { config, vectors, runner, engine }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn vectors(&self) -> &TestVectorSet {
        &self.vectors
    }

    /// Execute canonical `insns` against every vector and fingerprint the outputs.
    pub fn fingerprint(&mut self, insns: &[u8]) -> Result<Fingerprint, Disqualified> {
        let results = self.runner.run_all(insns, &self.vectors)?;
        Ok(fingerprints(&self.vectors, &results))
    }

    pub fn evaluate(&mut self, insns: &[u8]) -> Result<(Fingerprint, Verdict), Disqualified> {
        let prints = self.fingerprint(insns)?;
        let verdict = self.engine.classify(&prints);
        Ok((prints, verdict))
    }

    /// Run every stage on `bytes` as if it were found at offset 0 of a binary.
    pub fn inspect(&mut self, bytes: &[u8]) -> Inspection {
        let validated_len =
            validate_sequence(bytes, 0, self.config.max_len, self.config.min_len);
        let mut insns = bytes[..validated_len].to_vec();
        let canonical = if validated_len > 0 {
            canonicalize(&mut insns, &self.config.layout).map(|canon| (insns, canon))
        } else {
            None
        };
        let outcome = canonical.as_ref().map(|(insns, _)| self.evaluate(insns));
        Inspection { validated_len, canonical, outcome }
    }

    /// Scan an in-memory image, storing fragments and fingerprints in `db`.
    ///
    /// At each offset the longest valid fragment is tried first, then the same
    /// fragment with its last instruction dropped, until it is shorter than
    /// `min_len` or fails to canonicalize. Every occurrence is recorded; a
    /// fragment is executed only if this vector set has not evaluated it yet.
    pub fn scan_bytes(
        &mut self,
        db: &FragmentDb,
        data: &[u8],
        filename: &str,
    ) -> Result<ScanCounts, DbError> {
        let min_len = self.config.min_len;
        let mut counts = ScanCounts::default();
        let vecset = self.vectors.identity().to_string();

        for offset in 0..data.len() {
            let mut max_len = self.config.max_len;
            while max_len >= min_len {
                let len = validate_sequence(data, offset, max_len, min_len);
                if len < min_len {
                    break;
                }
                let mut insns = data[offset..offset + len].to_vec();
                let Some(canon) = canonicalize(&mut insns, &self.config.layout) else {
                    trace!(offset, len, "not canonicalizable");
                    break;
                };
                counts.candidates += 1;

                let (fragid, inserted) = db.lookup_or_insert_fragment(&insns)?;
                db.add_source(fragid, filename, offset as u64)?;
                if inserted {
                    counts.new_fragments += 1;
                }
                if !db.is_evaluated(&vecset, fragid)? {
                    counts.evaluated += 1;
                    let outcome = match self.evaluate(&insns) {
                        Ok((prints, Verdict::Accepted)) => {
                            for (symbol, print) in &prints {
                                db.add_print(&vecset, fragid, &symbol.to_string(), print)?;
                            }
                            counts.accepted += 1;
                            info!(offset, len, filename, symbols = prints.len(), "fingerprinted");
                            EvaluationOutcome::Accepted
                        }
                        Ok((prints, Verdict::TooMuch)) => {
                            debug!(offset, len, symbols = prints.len(), "too many symbols");
                            EvaluationOutcome::TooMuch
                        }
                        Ok((_, Verdict::Boring)) => {
                            debug!(offset, len, "boring");
                            EvaluationOutcome::Boring
                        }
                        Err(reason) => {
                            debug!(offset, len, %reason, "disqualified");
                            EvaluationOutcome::Disqualified
                        }
                    };
                    db.record_evaluation(&vecset, fragid, outcome)?;
                }

                max_len = canon.last_boundary();
            }
        }

        Ok(counts)
    }

    /// Scan one file in a single transaction and record a `scans` row for it.
    pub fn scan_file(&mut self, db: &FragmentDb, path: &Path) -> Result<ScanCounts, ScanError> {
        let data = std::fs::read(path)
            .map_err(|source| ScanError::Io { path: path.display().to_string(), source })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let tx = db.begin()?;
        let scan_id = db.begin_scan(&filename, self.vectors.identity(), &Utc::now().to_rfc3339())?;
        let counts = self.scan_bytes(db, &data, &filename)?;
        db.finish_scan(scan_id, &Utc::now().to_rfc3339(), &counts)?;
        tx.commit().map_err(DbError::from)?;

        info!(
            file = %path.display(),
            bytes = data.len(),
            candidates = counts.candidates,
            new_fragments = counts.new_fragments,
            evaluated = counts.evaluated,
            accepted = counts.accepted,
            "scanned"
        );
        Ok(counts)
    }
}
