//! Run report and readiness verdict.
//!
//! Every map in the report is ordered and nothing time-dependent is
//! recorded, so identical inputs and seed serialize to identical bytes.

use serde::{Deserialize, Serialize};
use sieve_core::{distinct_n, normalize, word_tokens};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::balance::BalanceReport;
use crate::config::{CurateConfig, VAL_FRACTION_TOLERANCE};
use crate::near_dup::NearDupEstimate;
use crate::record::{Category, RawRecord, Record};
use crate::seen::DedupScope;
use crate::split::SplitStats;
use crate::validate::DropReason;

/// Texts whose tokens feed the type-token and distinct-n metrics.
pub const DIVERSITY_TOKEN_SAMPLE: usize = 5000;

/// Overall verdict for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    /// Every check passed.
    Ready,
    /// Usable, with warnings listed in the report.
    ReadyWithWarnings,
    /// Must not be used for training.
    NotReady,
}

impl ReadinessStatus {
    /// Snake-case name as it appears in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::ReadyWithWarnings => "ready_with_warnings",
            Self::NotReady => "not_ready",
        }
    }
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lexical diversity of a set of inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiversityMetrics {
    /// Number of texts.
    pub count: usize,
    /// Mean normalized length in characters.
    pub avg_chars: f64,
    /// Shortest normalized length.
    pub min_chars: usize,
    /// Longest normalized length.
    pub max_chars: usize,
    /// Distinct normalized inputs over total.
    pub unique_input_ratio: f64,
    /// Distinct tokens over total tokens, on the token sample.
    pub type_token_ratio: f64,
    /// Distinct unigrams over total unigrams.
    pub distinct_1: f64,
    /// Distinct bigrams over total bigrams.
    pub distinct_2: f64,
}

/// Compute diversity metrics. Tokens are drawn from the first
/// [`DIVERSITY_TOKEN_SAMPLE`] texts.
#[must_use]
pub fn diversity_metrics<S: AsRef<str>>(texts: &[S]) -> DiversityMetrics {
    if texts.is_empty() {
        return DiversityMetrics::default();
    }

    let normalized: Vec<String> = texts.iter().map(|t| normalize(t.as_ref())).collect();
    let lengths: Vec<usize> = normalized.iter().map(|t| t.chars().count()).collect();
    let unique: BTreeSet<&str> = normalized.iter().map(String::as_str).collect();

    let tokens: Vec<String> = normalized
        .iter()
        .take(DIVERSITY_TOKEN_SAMPLE)
        .flat_map(|t| word_tokens(t))
        .collect();
    let type_token_ratio = if tokens.is_empty() {
        0.0
    } else {
        let types: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();
        types.len() as f64 / tokens.len() as f64
    };

    DiversityMetrics {
        count: texts.len(),
        avg_chars: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
        min_chars: lengths.iter().copied().min().unwrap_or(0),
        max_chars: lengths.iter().copied().max().unwrap_or(0),
        unique_input_ratio: unique.len() as f64 / normalized.len() as f64,
        type_token_ratio,
        distinct_1: distinct_n(&tokens, 1),
        distinct_2: distinct_n(&tokens, 2),
    }
}

/// Settings that shaped the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEcho {
    /// Split seed.
    pub seed: u64,
    /// Requested validation fraction.
    pub val_fraction: f64,
    /// Minimum input length.
    pub min_input_chars: usize,
    /// Exact-duplicate scope.
    pub dedup_scope: DedupScope,
    /// Near-duplicate Hamming threshold.
    pub near_dup_threshold: u32,
    /// Whether near-duplicates were removed.
    pub near_dup_remove: bool,
}

impl From<&CurateConfig> for ConfigEcho {
    fn from(config: &CurateConfig) -> Self {
        Self {
            seed: config.seed,
            val_fraction: config.val_fraction,
            min_input_chars: config.min_input_chars,
            dedup_scope: config.dedup_scope,
            near_dup_threshold: config.near_dup.threshold,
            near_dup_remove: config.near_dup.remove,
        }
    }
}

/// Dropped records by pipeline stage and reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DropCounts {
    /// Primary input drops.
    pub ingest: BTreeMap<DropReason, usize>,
    /// Balancing candidate drops.
    pub balance: BTreeMap<DropReason, usize>,
}

impl DropCounts {
    /// All drops across stages.
    #[must_use]
    pub fn total(&self) -> usize {
        self.ingest.values().chain(self.balance.values()).sum()
    }
}

/// Per-category summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    /// Input records declaring this category.
    pub input: usize,
    /// Records in train plus val.
    pub accepted: usize,
    /// Configured target, if any.
    pub target: Option<usize>,
    /// Records still missing to reach the target.
    pub shortfall: usize,
    /// Records in train.
    pub train: usize,
    /// Records in val.
    pub val: usize,
    /// Input records rejected as exact duplicates.
    pub exact_duplicates: usize,
    /// `exact_duplicates / records that passed validation`.
    pub duplicate_rate: f64,
    /// Records removed as near-duplicates.
    pub near_duplicates_removed: usize,
    /// Diversity of accepted inputs.
    pub diversity: DiversityMetrics,
}

/// Per-source contribution to the outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Records in train.
    pub train: usize,
    /// Records in val.
    pub val: usize,
    /// Records added by balancing.
    pub balance_added: usize,
}

/// Near-duplicate estimates on the final dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearDupReport {
    /// Estimate over all accepted records.
    pub overall: NearDupEstimate,
    /// Estimate within each category.
    pub per_category: BTreeMap<Category, NearDupEstimate>,
    /// Records removed before balancing (0 unless removal is enabled).
    pub removed: usize,
}

/// Structured summary of one curation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationReport {
    /// Readiness verdict.
    pub status: ReadinessStatus,
    /// Human-readable reasons behind a non-`ready` status.
    pub warnings: Vec<String>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Settings that shaped the run.
    pub config: ConfigEcho,
    /// Records read from the primary input, malformed lines included.
    pub input_records: usize,
    /// Drops by stage and reason.
    pub drops: DropCounts,
    /// Per-category summary.
    pub categories: BTreeMap<Category, CategoryReport>,
    /// Per-source contribution.
    pub sources: BTreeMap<String, SourceReport>,
    /// Balancing outcome.
    pub balance: BalanceReport,
    /// Split statistics.
    pub split: SplitStats,
    /// Near-duplicate estimates.
    pub near_duplicates: NearDupReport,
    /// Largest over smallest accepted category count.
    pub balance_ratio: Option<f64>,
    /// Diversity of all accepted inputs.
    pub diversity: DiversityMetrics,
}

impl CurationReport {
    /// Records written across both partitions.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.split.train_records + self.split.val_records
    }
}

/// Final state handed to [`Reporter::finish`].
pub struct FinalState<'a> {
    /// Run configuration.
    pub config: &'a CurateConfig,
    /// Training partition.
    pub train: &'a [Record],
    /// Validation partition.
    pub val: &'a [Record],
    /// Split statistics.
    pub split: SplitStats,
    /// Balancing outcome.
    pub balance: BalanceReport,
    /// Near-duplicate estimates.
    pub near_duplicates: NearDupReport,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

/// Accumulates ingestion counts and assembles the final report.
#[derive(Debug, Default)]
pub struct Reporter {
    input_records: usize,
    input_by_category: BTreeMap<Category, usize>,
    ingest_drops: BTreeMap<DropReason, usize>,
    valid_by_category: BTreeMap<Category, usize>,
    exact_duplicates: BTreeMap<Category, usize>,
    near_removed: BTreeMap<Category, usize>,
}

impl Reporter {
    /// Create an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one parsed input record.
    pub fn record_input(&mut self, raw: &RawRecord) {
        self.input_records += 1;
        if let Some(category) = raw.category_name().and_then(|c| c.parse::<Category>().ok()) {
            *self.input_by_category.entry(category).or_insert(0) += 1;
        }
    }

    /// Count one unparseable input line.
    pub fn record_malformed(&mut self) {
        self.input_records += 1;
        *self.ingest_drops.entry(DropReason::MalformedJson).or_insert(0) += 1;
    }

    /// Count a record that passed validation.
    pub fn record_valid(&mut self, category: Category) {
        *self.valid_by_category.entry(category).or_insert(0) += 1;
    }

    /// Count an ingestion drop.
    pub fn record_drop(&mut self, reason: DropReason, category: Option<Category>) {
        *self.ingest_drops.entry(reason).or_insert(0) += 1;
        let per_category = match reason {
            DropReason::ExactDuplicate => &mut self.exact_duplicates,
            DropReason::NearDuplicate => &mut self.near_removed,
            _ => return,
        };
        if let Some(category) = category {
            *per_category.entry(category).or_insert(0) += 1;
        }
    }

    /// Assemble the report and compute the readiness verdict.
    #[must_use]
    pub fn finish(self, state: FinalState<'_>) -> CurationReport {
        let config = state.config;
        let mut categories = BTreeMap::new();
        let mut present: BTreeSet<Category> = BTreeSet::new();
        present.extend(self.input_by_category.keys());
        present.extend(config.targets.keys());
        present.extend(state.train.iter().chain(state.val).map(|r| r.category));

        for category in present {
            let inputs: Vec<&str> = state
                .train
                .iter()
                .chain(state.val)
                .filter(|r| r.category == category)
                .map(|r| r.input_text.as_str())
                .collect();
            let train = state.train.iter().filter(|r| r.category == category).count();
            let val = inputs.len() - train;
            let target = config.targets.get(&category).copied();
            let exact_duplicates = self.exact_duplicates.get(&category).copied().unwrap_or(0);
            let valid = self.valid_by_category.get(&category).copied().unwrap_or(0);

            categories.insert(
                category,
                CategoryReport {
                    input: self.input_by_category.get(&category).copied().unwrap_or(0),
                    accepted: inputs.len(),
                    target,
                    shortfall: target.map_or(0, |t| t.saturating_sub(inputs.len())),
                    train,
                    val,
                    exact_duplicates,
                    duplicate_rate: if valid == 0 {
                        0.0
                    } else {
                        exact_duplicates as f64 / valid as f64
                    },
                    near_duplicates_removed: self.near_removed.get(&category).copied().unwrap_or(0),
                    diversity: diversity_metrics(&inputs),
                },
            );
        }

        let mut sources: BTreeMap<String, SourceReport> = BTreeMap::new();
        for record in state.train {
            sources.entry(record.source.clone()).or_default().train += 1;
        }
        for record in state.val {
            sources.entry(record.source.clone()).or_default().val += 1;
        }
        for (source, added) in state.balance.added_by_source() {
            if added > 0 {
                sources.entry(source).or_default().balance_added += added;
            }
        }

        let counts: Vec<usize> = categories
            .values()
            .map(|c| c.accepted)
            .filter(|&n| n > 0)
            .collect();
        let balance_ratio = match (counts.iter().max(), counts.iter().min()) {
            (Some(&max), Some(&min)) => Some(max as f64 / min as f64),
            _ => None,
        };

        let all_inputs: Vec<&str> = state
            .train
            .iter()
            .chain(state.val)
            .map(|r| r.input_text.as_str())
            .collect();
        let defective = state
            .train
            .iter()
            .chain(state.val)
            .filter(|r| {
                r.input_text.trim().chars().count() < config.min_input_chars || r.output.is_empty()
            })
            .count();

        let mut report = CurationReport {
            status: ReadinessStatus::Ready,
            warnings: Vec::new(),
            cancelled: state.cancelled,
            config: ConfigEcho::from(config),
            input_records: self.input_records,
            drops: DropCounts {
                ingest: self.ingest_drops,
                balance: state.balance.drops.clone(),
            },
            categories,
            sources,
            balance: state.balance,
            split: state.split,
            near_duplicates: state.near_duplicates,
            balance_ratio,
            diversity: diversity_metrics(&all_inputs),
        };
        assess(&mut report, config, defective);
        report
    }
}

/// Fill in `status` and `warnings`.
fn assess(report: &mut CurationReport, config: &CurateConfig, defective: usize) {
    let mut blocking = Vec::new();
    let mut warnings = Vec::new();

    if report.split.leakage_groups > 0 {
        blocking.push(format!(
            "{} group(s) present in both train and val",
            report.split.leakage_groups
        ));
    }
    if report.accepted() == 0 {
        blocking.push("no records accepted".to_string());
    }
    if defective > 0 {
        blocking.push(format!("{defective} output record(s) are empty or too short"));
    }
    if report.cancelled {
        blocking.push("run was cancelled; outputs are partial".to_string());
    }

    for (category, summary) in &report.categories {
        if summary.shortfall > 0 {
            let stop = report
                .balance
                .categories
                .get(category)
                .map(|b| format!(" ({})", b.stop_reason.as_str()))
                .unwrap_or_default();
            warnings.push(format!(
                "category '{category}' is {} short of its target of {}{stop}",
                summary.shortfall,
                summary.target.unwrap_or(0)
            ));
        }
        if summary.duplicate_rate > config.duplicate_warning_rate {
            warnings.push(format!(
                "category '{category}' exact-duplicate rate {:.1}% exceeds {:.1}%",
                summary.duplicate_rate * 100.0,
                config.duplicate_warning_rate * 100.0
            ));
        }
    }
    for source in &report.balance.failed_sources {
        warnings.push(format!("source '{source}' was unavailable"));
    }
    if report.accepted() > 0 && report.split.deviation > VAL_FRACTION_TOLERANCE {
        warnings.push(format!(
            "realized val fraction {:.4} deviates from requested {:.4}",
            report.split.realized_val_fraction, report.split.requested_val_fraction
        ));
    }

    report.status = if !blocking.is_empty() {
        ReadinessStatus::NotReady
    } else if !warnings.is_empty() {
        ReadinessStatus::ReadyWithWarnings
    } else {
        ReadinessStatus::Ready
    };
    blocking.extend(warnings);
    report.warnings = blocking;
}
