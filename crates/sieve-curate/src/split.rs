//! Leakage-safe train/validation split.
//!
//! Records are grouped by `(source, normalized input)`. Groups are shuffled
//! with a seeded RNG and assigned whole: a group goes to validation while the
//! validation count is below `round(total * val_fraction)`, otherwise to
//! training. The realized validation count is therefore within one group's
//! size of the target.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{CurateError, Result};
use crate::fingerprint::FingerprintedRecord;
use crate::record::{GroupKey, Record};

/// Default validation fraction.
pub const DEFAULT_VAL_FRACTION: f64 = 0.05;

/// Default shuffle seed.
pub const DEFAULT_SEED: u64 = 42;

/// Anything that belongs to a leakage group.
pub trait Grouped {
    /// Group identity; items sharing it always land in the same partition.
    fn group_key(&self) -> GroupKey;
}

impl Grouped for Record {
    fn group_key(&self) -> GroupKey {
        Record::group_key(self)
    }
}

impl Grouped for FingerprintedRecord {
    fn group_key(&self) -> GroupKey {
        self.record.group_key()
    }
}

/// Which side of the split a group landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Training partition.
    Train,
    /// Validation partition.
    Val,
}

/// Counts describing a completed split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitStats {
    /// Records partitioned.
    pub total: usize,
    /// `round(total * val_fraction)`.
    pub target_val: usize,
    /// Records in train.
    pub train_records: usize,
    /// Records in val.
    pub val_records: usize,
    /// Groups in train.
    pub train_groups: usize,
    /// Groups in val.
    pub val_groups: usize,
    /// Groups present on both sides. Always 0 for a correct split.
    pub leakage_groups: usize,
    /// Configured validation fraction.
    pub requested_val_fraction: f64,
    /// `val_records / total` (0 when empty).
    pub realized_val_fraction: f64,
    /// `|realized - requested|` (0 when empty).
    pub deviation: f64,
}

/// Result of a split.
#[derive(Debug, Clone)]
pub struct SplitOutcome<T> {
    /// Training items, in shuffled group order.
    pub train: Vec<T>,
    /// Validation items, in shuffled group order.
    pub val: Vec<T>,
    /// Partition of every group.
    pub assignments: BTreeMap<GroupKey, Partition>,
    /// Summary counts.
    pub stats: SplitStats,
}

impl<T: Grouped> SplitOutcome<T> {
    /// Fail with [`CurateError::LeakageInvariant`] if any group is on both sides.
    pub fn ensure_disjoint(&self) -> Result<()> {
        let groups = leakage_groups(&self.train, &self.val);
        if groups > 0 {
            return Err(CurateError::LeakageInvariant { groups });
        }
        Ok(())
    }
}

/// Seeded group-aware splitter.
#[derive(Debug, Clone)]
pub struct GroupedSplitter {
    val_fraction: f64,
    seed: u64,
}

impl Default for GroupedSplitter {
    fn default() -> Self {
        Self {
            val_fraction: DEFAULT_VAL_FRACTION,
            seed: DEFAULT_SEED,
        }
    }
}

impl GroupedSplitter {
    /// Create a splitter. `val_fraction` must lie strictly between 0 and 1.
    pub fn new(val_fraction: f64, seed: u64) -> Result<Self> {
        if !(val_fraction > 0.0 && val_fraction < 1.0) {
            return Err(CurateError::Config(format!(
                "val_fraction must be in (0, 1), got {val_fraction}"
            )));
        }
        Ok(Self { val_fraction, seed })
    }

    /// Configured validation fraction.
    #[must_use]
    pub fn val_fraction(&self) -> f64 {
        self.val_fraction
    }

    /// Target validation count for `total` records.
    #[must_use]
    pub fn target_val(&self, total: usize) -> usize {
        (total as f64 * self.val_fraction).round() as usize
    }

    /// Partition `items` into train and val without splitting any group.
    pub fn split<T: Grouped>(&self, items: Vec<T>) -> SplitOutcome<T> {
        let total = items.len();
        let target_val = self.target_val(total);

        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        let mut groups: Vec<(GroupKey, Vec<T>)> = Vec::new();
        for item in items {
            let key = item.group_key();
            match index.get(&key) {
                Some(&i) => groups[i].1.push(item),
                None => {
                    index.insert(key, groups.len());
                    groups.push((key, vec![item]));
                }
            }
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        groups.shuffle(&mut rng);

        let mut train = Vec::new();
        let mut val = Vec::new();
        let mut assignments = BTreeMap::new();
        let (mut train_groups, mut val_groups) = (0, 0);
        for (key, members) in groups {
            if val.len() < target_val {
                val_groups += 1;
                val.extend(members);
                assignments.insert(key, Partition::Val);
            } else {
                train_groups += 1;
                train.extend(members);
                assignments.insert(key, Partition::Train);
            }
        }

        let (realized_val_fraction, deviation) = if total == 0 {
            (0.0, 0.0)
        } else {
            let realized = val.len() as f64 / total as f64;
            (realized, (realized - self.val_fraction).abs())
        };

        let stats = SplitStats {
            total,
            target_val,
            train_records: train.len(),
            val_records: val.len(),
            train_groups,
            val_groups,
            leakage_groups: leakage_groups(&train, &val),
            requested_val_fraction: self.val_fraction,
            realized_val_fraction,
            deviation,
        };

        SplitOutcome {
            train,
            val,
            assignments,
            stats,
        }
    }
}

/// Number of groups present in both `train` and `val`.
#[must_use]
pub fn leakage_groups<T: Grouped>(train: &[T], val: &[T]) -> usize {
    let train_keys: HashSet<GroupKey> = train.iter().map(Grouped::group_key).collect();
    let val_keys: HashSet<GroupKey> = val.iter().map(Grouped::group_key).collect();
    train_keys.intersection(&val_keys).count()
}
