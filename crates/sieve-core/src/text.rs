//! Text normalization and word tokenization.
//!
//! Normalized text is the canonical form every digest, signature, and
//! group key is computed from: trimmed, lowercased, with internal
//! whitespace runs collapsed to a single space.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

static WORD_REGEX: OnceLock<Regex> = OnceLock::new();

fn word_regex() -> &'static Regex {
    // Alphabetic runs with an optional contraction tail ("don't", "it's").
    WORD_REGEX.get_or_init(|| {
        Regex::new(r"[a-z]+(?:'[a-z]+)?").expect("word pattern is a valid regex")
    })
}

/// Canonicalize text for hashing.
///
/// Pure and deterministic. Empty or whitespace-only input yields `""`.
#[must_use]
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for word in lowered.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Split text into lowercase word tokens.
///
/// The text is normalized first, so callers may pass raw input.
#[must_use]
pub fn word_tokens(text: &str) -> Vec<String> {
    let norm = normalize(text);
    word_regex()
        .find_iter(&norm)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Ratio of unique n-grams to total n-grams.
///
/// Returns 0.0 when `n == 0` or there are fewer than `n` tokens.
#[must_use]
pub fn distinct_n<S: AsRef<str>>(tokens: &[S], n: usize) -> f64 {
    if n == 0 || tokens.len() < n {
        return 0.0;
    }
    let total = tokens.len() - n + 1;
    let unique: HashSet<Vec<&str>> = tokens
        .windows(n)
        .map(|w| w.iter().map(|t| t.as_ref()).collect())
        .collect();
    unique.len() as f64 / total as f64
}
