//! # sieve-curate
//!
//! Dataset curation for supervised fine-tuning.
//!
//! Takes a pool of loosely-shaped training samples and produces leakage-free
//! train/validation partitions:
//! - Per-category schema validation with explicit drop reasons
//! - Exact deduplication (BLAKE3 over normalized input)
//! - Near-duplicate estimation with banded 64-bit SimHash, optional removal
//! - Per-category balancing from prioritized upstream sources
//! - Group-aware seeded split, so a `(source, text)` pair never crosses partitions
//! - A deterministic report with a readiness verdict
//!
//! ## Example
//!
//! ```no_run
//! use sieve_curate::{read_input, CancelToken, CandidateSource, CurateConfig, Curator};
//!
//! let curator = Curator::new(CurateConfig::default())?;
//! let input = read_input("dataset.jsonl")?;
//! let mut sources: Vec<Box<dyn CandidateSource>> = Vec::new();
//! let outcome = curator.run(input, &mut sources, &CancelToken::new())?;
//! println!("{}: {} train / {} val", outcome.report.status, outcome.train.len(), outcome.val.len());
//! # Ok::<(), sieve_curate::CurateError>(())
//! ```

pub mod balance;
pub mod cancel;
pub mod cluster;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod io;
pub mod near_dup;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod seen;
pub mod source;
pub mod split;
pub mod validate;

pub use balance::{BalanceConfig, BalanceOutcome, BalanceReport, Balancer, StopReason};
pub use cancel::CancelToken;
pub use config::CurateConfig;
pub use error::{CurateError, Result};
pub use fingerprint::{hamming, Fingerprint, FingerprintedRecord, Fingerprinter};
pub use io::{read_input, read_records_jsonl, write_json_pretty, write_records_jsonl, InputFormat};
pub use near_dup::{estimate, NearDupConfig, NearDupEstimate, NearDuplicateIndex};
pub use pipeline::{CurationOutcome, Curator, IngestProgress};
pub use record::{Category, RawInput, RawRecord, Record};
pub use report::{diversity_metrics, CurationReport, DiversityMetrics, ReadinessStatus};
pub use seen::{DedupScope, SeenSet};
pub use source::{CandidateSource, JsonlSource, MemorySource};
pub use split::{GroupedSplitter, Partition, SplitOutcome, SplitStats};
pub use validate::{DropReason, RecordValidator};
