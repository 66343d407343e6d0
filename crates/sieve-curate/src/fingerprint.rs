//! Exact and near-duplicate fingerprints for record inputs.
//!
//! The exact fingerprint is a BLAKE3 digest of the normalized input. The
//! near-duplicate fingerprint is a 64-bit SimHash over word tokens: each
//! token hash votes +1 or -1 on every bit, and a bit is set when its total
//! is non-negative.

use rayon::prelude::*;
use sieve_core::{hash_with_seed, normalize, word_tokens, Blake3Hasher, Digest};

use crate::record::Record;

/// Number of bits in a SimHash signature.
pub const SIMHASH_BITS: u32 = 64;

/// Fingerprints of one record's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// BLAKE3 digest of the normalized input.
    pub exact_digest: Digest,
    /// 64-bit SimHash over word tokens.
    pub simhash: u64,
}

/// A validated record paired with its fingerprints.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintedRecord {
    /// The record.
    pub record: Record,
    /// Fingerprints of `record.input_text`.
    pub fingerprint: Fingerprint,
}

/// Fingerprint generator.
///
/// Stateless apart from the token hash seed; safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct Fingerprinter {
    seed: u64,
    digester: Blake3Hasher,
}

impl Fingerprinter {
    /// Create a fingerprinter with the default token seed (0).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// BLAKE3 digest of the normalized text.
    #[must_use]
    pub fn exact_digest(&self, text: &str) -> Digest {
        self.digester.digest(normalize(text).as_bytes())
    }

    /// 64-bit SimHash of the text. Returns 0 when the text has no word tokens.
    #[must_use]
    pub fn simhash(&self, text: &str) -> u64 {
        let tokens = word_tokens(text);
        if tokens.is_empty() {
            return 0;
        }

        let mut weights = [0i64; SIMHASH_BITS as usize];
        for token in &tokens {
            let h = hash_with_seed(token.as_bytes(), self.seed);
            for (bit, weight) in weights.iter_mut().enumerate() {
                if (h >> bit) & 1 == 1 {
                    *weight += 1;
                } else {
                    *weight -= 1;
                }
            }
        }

        weights
            .iter()
            .enumerate()
            .filter(|(_, &w)| w >= 0)
            .fold(0u64, |sig, (bit, _)| sig | (1u64 << bit))
    }

    /// Both fingerprints for a text.
    #[must_use]
    pub fn fingerprint(&self, text: &str) -> Fingerprint {
        Fingerprint {
            exact_digest: self.exact_digest(text),
            simhash: self.simhash(text),
        }
    }

    /// Fingerprint a batch of records in parallel, preserving order.
    #[must_use]
    pub fn fingerprint_batch(&self, records: Vec<Record>) -> Vec<FingerprintedRecord> {
        records
            .into_par_iter()
            .map(|record| {
                let fingerprint = self.fingerprint(&record.input_text);
                FingerprintedRecord {
                    record,
                    fingerprint,
                }
            })
            .collect()
    }
}

/// Hamming distance between two SimHash signatures.
#[must_use]
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Category;
    use serde_json::Map;

    fn record(text: &str) -> Record {
        Record {
            category: Category::Fluency,
            input_text: text.to_string(),
            output: Map::new(),
            source: "unknown".to_string(),
            metadata: Map::new(),
            raw_text: None,
        }
    }

    #[test]
    fn test_exact_digest_normalizes() {
        let fp = Fingerprinter::new();
        assert_eq!(
            fp.exact_digest("The cat sat."),
            fp.exact_digest("  the  CAT sat. ")
        );
        assert_ne!(fp.exact_digest("The cat sat."), fp.exact_digest("The cat sat!"));
    }

    #[test]
    fn test_simhash_empty_is_zero() {
        let fp = Fingerprinter::new();
        assert_eq!(fp.simhash(""), 0);
        assert_eq!(fp.simhash("12345 !!! ..."), 0);
    }

    #[test]
    fn test_simhash_ignores_word_order() {
        let fp = Fingerprinter::new();
        assert_eq!(
            fp.simhash("quick brown fox jumps"),
            fp.simhash("jumps fox brown quick")
        );
    }

    #[test]
    fn test_simhash_ignores_punctuation_and_case() {
        let fp = Fingerprinter::new();
        assert_eq!(
            fp.simhash("Hello, World! It's fine."),
            fp.simhash("hello world it's fine")
        );
    }

    #[test]
    fn test_simhash_single_token_equals_its_hash() {
        let fp = Fingerprinter::new();
        let expected = hash_with_seed(b"hello", 0);
        assert_eq!(fp.simhash("hello"), expected);
    }

    #[test]
    fn test_similar_texts_are_close() {
        let fp = Fingerprinter::new();
        let base = "the students practiced their english conversation skills every \
                    morning before class started in the small library downstairs";
        let edited = "the students practiced their english conversation skills every \
                      morning before class started in the small library upstairs";
        let unrelated = "quarterly revenue projections exceeded analyst expectations \
                         despite supply chain disruptions across several regions";

        let near = hamming(fp.simhash(base), fp.simhash(edited));
        let far = hamming(fp.simhash(base), fp.simhash(unrelated));
        assert!(near < far, "near={near} far={far}");
    }

    #[test]
    fn test_hamming() {
        assert_eq!(hamming(0, 0), 0);
        assert_eq!(hamming(0b1011, 0b0001), 2);
        assert_eq!(hamming(u64::MAX, 0), 64);
    }

    #[test]
    fn test_fingerprint_batch_preserves_order() {
        let fp = Fingerprinter::new();
        let texts = ["first sample text", "second sample text", "third one here"];
        let batch = fp.fingerprint_batch(texts.iter().map(|t| record(t)).collect());

        assert_eq!(batch.len(), 3);
        for (item, text) in batch.iter().zip(texts) {
            assert_eq!(item.record.input_text, text);
            assert_eq!(item.fingerprint, fp.fingerprint(text));
        }
    }
}
