//! # sieve-core
//!
//! Core infrastructure for sieve dataset curation tools.
//!
//! Provides shared abstractions for:
//! - Hashing (xxh3 for SimHash votes, blake3 for content digests)
//! - Text normalization and word tokenization
//! - A common error type

pub mod error;
pub mod hashing;
pub mod text;

pub use error::{Result, SieveError};
pub use hashing::{hash_with_seed, Blake3Hasher, Digest};
pub use text::{distinct_n, normalize, word_tokens};
