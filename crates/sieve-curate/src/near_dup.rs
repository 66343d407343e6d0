//! Banded SimHash index for near-duplicate estimation.
//!
//! Each 64-bit signature is split into four 16-bit bands and filed under
//! `(band, value)` buckets. Only items sharing a bucket are compared, on
//! their full 64-bit Hamming distance.
//!
//! Banding is an approximation. Two unrelated items can collide in a band
//! (the Hamming check then rejects them), and two true near-duplicates can
//! differ in all four bands and never be compared. Tune band count and width
//! rather than treating either as a bug.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::cluster::UnionFind;
use crate::fingerprint::hamming;

/// Number of bands a signature is split into.
pub const NUM_BANDS: usize = 4;

/// Bits per band.
pub const BAND_BITS: u32 = 16;

/// Default Hamming threshold for flagging a pair.
pub const DEFAULT_THRESHOLD: u32 = 3;

/// Default cap on items considered by an estimate.
pub const DEFAULT_MAX_ITEMS: usize = 3000;

/// Default cap on pair comparisons inside one bucket.
pub const DEFAULT_MAX_COMPARISONS_PER_BUCKET: usize = 2000;

/// Near-duplicate detection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NearDupConfig {
    /// Pairs at Hamming distance `<=` this are near-duplicates.
    pub threshold: u32,
    /// Estimates stride-sample inputs larger than this.
    pub max_items: usize,
    /// Pair comparisons allowed per bucket.
    pub max_comparisons_per_bucket: usize,
    /// Drop flagged items instead of only reporting them.
    pub remove: bool,
}

impl Default for NearDupConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_items: DEFAULT_MAX_ITEMS,
            max_comparisons_per_bucket: DEFAULT_MAX_COMPARISONS_PER_BUCKET,
            remove: false,
        }
    }
}

/// Pairs found by a scan of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NearDupMatches {
    /// Unique `(a, b)` pairs with `a < b`, in ascending order.
    pub pairs: BTreeSet<(usize, usize)>,
    /// Hamming comparisons performed.
    pub comparisons: usize,
}

impl NearDupMatches {
    /// Distinct items appearing in at least one pair.
    #[must_use]
    pub fn flagged_items(&self) -> BTreeSet<usize> {
        self.pairs.iter().flat_map(|&(a, b)| [a, b]).collect()
    }
}

/// Banded bucket index over SimHash signatures.
#[derive(Debug, Clone)]
pub struct NearDuplicateIndex {
    threshold: u32,
    max_comparisons_per_bucket: usize,
    signatures: Vec<u64>,
    buckets: BTreeMap<(u8, u16), Vec<usize>>,
}

impl NearDuplicateIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new(threshold: u32, max_comparisons_per_bucket: usize) -> Self {
        Self {
            threshold,
            max_comparisons_per_bucket,
            signatures: Vec::new(),
            buckets: BTreeMap::new(),
        }
    }

    /// Create an empty index from config.
    #[must_use]
    pub fn from_config(config: &NearDupConfig) -> Self {
        Self::new(config.threshold, config.max_comparisons_per_bucket)
    }

    /// Band values of a signature; band `i` holds bits `16*i..16*i+16`.
    #[must_use]
    pub fn bands(signature: u64) -> [u16; NUM_BANDS] {
        let mut bands = [0u16; NUM_BANDS];
        for (i, band) in bands.iter_mut().enumerate() {
            *band = ((signature >> (BAND_BITS as usize * i)) & 0xFFFF) as u16;
        }
        bands
    }

    /// Add a signature. Returns its item id (insertion position).
    pub fn insert(&mut self, signature: u64) -> usize {
        let id = self.signatures.len();
        self.signatures.push(signature);
        for (band, value) in Self::bands(signature).into_iter().enumerate() {
            self.buckets
                .entry((band as u8, value))
                .or_default()
                .push(id);
        }
        id
    }

    /// Number of indexed items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// True when nothing has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Buckets holding at least two items.
    #[must_use]
    pub fn num_collision_buckets(&self) -> usize {
        self.buckets.values().filter(|b| b.len() > 1).count()
    }

    /// Compare items sharing a bucket and collect near-duplicate pairs.
    ///
    /// A pair colliding in several bands is reported once.
    #[must_use]
    pub fn scan(&self) -> NearDupMatches {
        let mut matches = NearDupMatches::default();

        for bucket in self.buckets.values().filter(|b| b.len() > 1) {
            let mut budget = self.max_comparisons_per_bucket;
            'bucket: for (i, &a) in bucket.iter().enumerate() {
                for &b in &bucket[i + 1..] {
                    if budget == 0 {
                        break 'bucket;
                    }
                    budget -= 1;
                    matches.comparisons += 1;

                    if hamming(self.signatures[a], self.signatures[b]) <= self.threshold {
                        matches.pairs.insert((a.min(b), a.max(b)));
                    }
                }
            }
        }

        matches
    }
}

/// Summary of a near-duplicate estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearDupEstimate {
    /// Items offered to the estimator.
    pub total: usize,
    /// Items actually indexed.
    pub sampled: usize,
    /// Sampling stride (1 when not sampled).
    pub stride: usize,
    /// `sampled / total`, 1.0 for empty input.
    pub sampling_ratio: f64,
    /// Unique near-duplicate pairs among sampled items.
    pub pairs: usize,
    /// Distinct sampled items in at least one pair.
    pub flagged_items: usize,
    /// Hamming threshold used.
    pub threshold: u32,
}

impl NearDupEstimate {
    /// Fraction of sampled items that were flagged.
    #[must_use]
    pub fn flagged_rate(&self) -> f64 {
        if self.sampled == 0 {
            0.0
        } else {
            self.flagged_items as f64 / self.sampled as f64
        }
    }
}

/// Estimate the near-duplicate rate of a set of signatures.
///
/// Inputs larger than `max_items` are sampled deterministically: every
/// `len / max_items`-th item, up to `max_items` items.
#[must_use]
pub fn estimate(signatures: &[u64], config: &NearDupConfig) -> NearDupEstimate {
    let total = signatures.len();
    let max_items = config.max_items.max(1);
    let stride = if total > max_items {
        (total / max_items).max(1)
    } else {
        1
    };

    let mut index = NearDuplicateIndex::from_config(config);
    for &sig in signatures.iter().step_by(stride).take(max_items) {
        index.insert(sig);
    }
    let matches = index.scan();

    let sampled = index.len();
    NearDupEstimate {
        total,
        sampled,
        stride,
        sampling_ratio: if total == 0 {
            1.0
        } else {
            sampled as f64 / total as f64
        },
        pairs: matches.pairs.len(),
        flagged_items: matches.flagged_items().len(),
        threshold: config.threshold,
    }
}

/// Positions to drop when near-duplicate removal is enabled.
///
/// Scans every signature (no sampling), clusters flagged pairs, and returns
/// all but the first-seen member of each cluster, ascending.
#[must_use]
pub fn near_duplicate_removals(signatures: &[u64], config: &NearDupConfig) -> Vec<usize> {
    let mut index = NearDuplicateIndex::from_config(config);
    for &sig in signatures {
        index.insert(sig);
    }

    let matches = index.scan();
    let mut clusters = UnionFind::new(signatures.len());
    for &(a, b) in &matches.pairs {
        clusters.union(a, b);
    }
    clusters.redundant_members()
}
