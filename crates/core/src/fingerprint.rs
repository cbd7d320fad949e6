//! Reduction of per-vector outputs into fingerprints.

use std::collections::{BTreeMap, BTreeSet};

use crate::symbols::{OutputMap, Symbol};
use crate::vectors::TestVectorSet;

/// Symbol to signature: one two-hex-digit token per vector, in vector order.
pub type Fingerprint = BTreeMap<Symbol, String>;

/// How a fingerprint set should be treated by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// No signature varies beyond the empty-sequence baseline.
    Boring,
    /// More symbols than the configured ceiling.
    TooMuch,
}

/// Build the fingerprint of a set of outputs produced against `vectors`.
///
/// Symbols missing from a vector's outputs get that vector's default value,
/// so every signature has exactly one token per vector.
pub fn fingerprints(vectors: &TestVectorSet, results: &[OutputMap]) -> Fingerprint {
    let symbols: BTreeSet<Symbol> = results.iter().flat_map(|r| r.keys().copied()).collect();

    symbols
        .into_iter()
        .map(|symbol| {
            let signature: String = vectors
                .iter()
                .zip(results)
                .map(|(vector, outputs)| {
                    outputs
                        .get(&symbol)
                        .copied()
                        .unwrap_or_else(|| vector.default_value(&symbol))
                        .token()
                })
                .collect();
            (symbol, signature)
        })
        .collect()
}

/// Symbol names and signatures, in the form stored in the database.
pub fn signature_pairs(prints: &Fingerprint) -> Vec<(String, String)> {
    prints.iter().map(|(symbol, print)| (symbol.to_string(), print.clone())).collect()
}

/// `^(..)\1+$`: the whole signature repeats one two-character token.
fn is_repetitive(signature: &str) -> bool {
    let bytes = signature.as_bytes();
    if bytes.len() < 4 || bytes.len() % 2 != 0 {
        return false;
    }
    bytes.chunks(2).all(|chunk| chunk == &bytes[..2])
}

/// Classifies fingerprints against the empty-sequence baseline.
#[derive(Debug, Clone)]
pub struct FingerprintEngine {
    baseline: Fingerprint,
    max_symbols: usize,
}

impl FingerprintEngine {
    pub fn new(baseline: Fingerprint, max_symbols: usize) -> Self {
        Self { baseline, max_symbols }
    }

    pub fn is_boring(&self, prints: &Fingerprint) -> bool {
        prints.iter().all(|(symbol, signature)| {
            self.baseline.get(symbol) == Some(signature) || is_repetitive(signature)
        })
    }

    pub fn is_too_much(&self, prints: &Fingerprint) -> bool {
        prints.len() > self.max_symbols
    }

    pub fn classify(&self, prints: &Fingerprint) -> Verdict {
        if self.is_too_much(prints) {
            Verdict::TooMuch
        } else if self.is_boring(prints) {
            Verdict::Boring
        } else {
            Verdict::Accepted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VectorConfig;
    use crate::symbols::{Register, Value};

    fn small_set() -> TestVectorSet {
        TestVectorSet::generate(&VectorConfig { count: 3, fills: vec![0x00, 0x7f, 0xff] })
    }

    #[test]
    fn missing_symbols_take_vector_defaults() {
        let vectors = small_set();
        let z20: Symbol = "z20".parse().unwrap();
        let mut touched = OutputMap::new();
        touched.insert(z20, Value::Byte(0x42));
        let results = vec![touched, OutputMap::new(), OutputMap::new()];
        let prints = fingerprints(&vectors, &results);
        assert_eq!(prints[&z20], "427fff");
    }

    #[test]
    fn repetition_detection() {
        assert!(is_repetitive("0101010101"));
        assert!(is_repetitive("ffff"));
        assert!(!is_repetitive("01"));
        assert!(!is_repetitive("010203"));
        assert!(!is_repetitive("01010"));
    }

    #[test]
    fn classification() {
        let a = Symbol::Register(Register::A);
        let x = Symbol::Register(Register::X);
        let baseline: Fingerprint = [(a, "007fff".to_string())].into_iter().collect();
        let engine = FingerprintEngine::new(baseline, 1);

        let same: Fingerprint = [(a, "007fff".to_string())].into_iter().collect();
        assert_eq!(engine.classify(&same), Verdict::Boring);

        let constant: Fingerprint = [(a, "050505".to_string())].into_iter().collect();
        assert_eq!(engine.classify(&constant), Verdict::Boring);

        let varied: Fingerprint = [(a, "018000".to_string())].into_iter().collect();
        assert_eq!(engine.classify(&varied), Verdict::Accepted);

        let wide: Fingerprint =
            [(a, "018000".to_string()), (x, "018000".to_string())].into_iter().collect();
        assert_eq!(engine.classify(&wide), Verdict::TooMuch);

        assert!(engine.is_boring(&Fingerprint::new()));
    }
}
