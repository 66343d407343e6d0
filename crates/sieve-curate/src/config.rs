//! Run configuration.
//!
//! Loaded from an optional JSON file, then overridden by CLI flags.
//! [`CurateConfig::validate`] must pass before any input is read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::balance::BalanceConfig;
use crate::error::{CurateError, Result};
use crate::near_dup::NearDupConfig;
use crate::record::Category;
use crate::seen::DedupScope;
use crate::split::{DEFAULT_SEED, DEFAULT_VAL_FRACTION};
use crate::validate::DEFAULT_MIN_INPUT_CHARS;

/// Default per-category exact-duplicate rate above which a warning is raised.
pub const DEFAULT_DUPLICATE_WARNING_RATE: f64 = 0.30;

/// Default ingestion batch size.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Maximum tolerated gap between requested and realized val fraction.
pub const VAL_FRACTION_TOLERANCE: f64 = 0.01;

/// Configuration for one curation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CurateConfig {
    /// Fraction of records (by group) placed in validation.
    pub val_fraction: f64,
    /// Split shuffle seed.
    pub seed: u64,
    /// Minimum trimmed input length in characters.
    pub min_input_chars: usize,
    /// Near-duplicate detection settings.
    pub near_dup: NearDupConfig,
    /// Exact-duplicate scope.
    pub dedup_scope: DedupScope,
    /// Target accepted count per category.
    pub targets: BTreeMap<Category, usize>,
    /// Per-category duplicate rate that triggers a warning.
    pub duplicate_warning_rate: f64,
    /// Records validated and fingerprinted per parallel batch.
    pub batch_size: usize,
    /// Balancing limits.
    pub balance: BalanceConfig,
}

impl Default for CurateConfig {
    fn default() -> Self {
        Self {
            val_fraction: DEFAULT_VAL_FRACTION,
            seed: DEFAULT_SEED,
            min_input_chars: DEFAULT_MIN_INPUT_CHARS,
            near_dup: NearDupConfig::default(),
            dedup_scope: DedupScope::default(),
            targets: BTreeMap::new(),
            duplicate_warning_rate: DEFAULT_DUPLICATE_WARNING_RATE,
            batch_size: DEFAULT_BATCH_SIZE,
            balance: BalanceConfig::default(),
        }
    }
}

impl CurateConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CurateError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            CurateError::Config(format!("invalid config {}: {e}", path.display()))
        })
    }

    /// Reject settings no run can honor.
    pub fn validate(&self) -> Result<()> {
        if !(self.val_fraction > 0.0 && self.val_fraction < 1.0) {
            return Err(CurateError::Config(format!(
                "val_fraction must be in (0, 1), got {}",
                self.val_fraction
            )));
        }
        if self.min_input_chars == 0 {
            return Err(CurateError::Config(
                "min_input_chars must be at least 1".to_string(),
            ));
        }
        if let Some((category, _)) = self.targets.iter().find(|(_, &t)| t == 0) {
            return Err(CurateError::Config(format!(
                "target for '{category}' must be positive"
            )));
        }
        if self.near_dup.threshold > 64 {
            return Err(CurateError::Config(format!(
                "near_dup.threshold must be at most 64, got {}",
                self.near_dup.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.duplicate_warning_rate) {
            return Err(CurateError::Config(format!(
                "duplicate_warning_rate must be in [0, 1], got {}",
                self.duplicate_warning_rate
            )));
        }

        check_cap("balance.default_source_cap", self.balance.default_source_cap)?;
        for (source, &cap) in &self.balance.source_caps {
            check_cap(&format!("source cap for '{source}'"), cap)?;
        }

        for (name, value) in [
            ("batch_size", self.batch_size),
            ("near_dup.max_items", self.near_dup.max_items),
            (
                "near_dup.max_comparisons_per_bucket",
                self.near_dup.max_comparisons_per_bucket,
            ),
            ("balance.fetch_batch_size", self.balance.fetch_batch_size),
            (
                "balance.attempt_budget_per_source",
                self.balance.attempt_budget_per_source,
            ),
        ] {
            if value == 0 {
                return Err(CurateError::Config(format!("{name} must be positive")));
            }
        }

        Ok(())
    }
}

fn check_cap(name: &str, cap: f64) -> Result<()> {
    if cap > 0.0 && cap <= 1.0 {
        Ok(())
    } else {
        Err(CurateError::Config(format!(
            "{name} must be in (0, 1], got {cap}"
        )))
    }
}
