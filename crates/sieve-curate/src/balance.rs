//! Per-category top-up from upstream candidate sources.
//!
//! For every category below its target the balancer walks the sources in
//! priority order. Each source may add at most a soft cap of
//! `ceil(need_at_source_start * cap_fraction)` records, and may examine at
//! most `attempt_budget_per_source` candidates. The last eligible source for
//! a category has no soft cap unless one is set for it explicitly, so caps
//! spread the need without leaving it unfilled. Every examined candidate,
//! accepted or not, also counts toward a run-wide attempt ceiling.
//! Candidates pass through the same validator, fingerprinter and seen-set
//! as the primary input.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::fingerprint::{FingerprintedRecord, Fingerprinter};
use crate::record::Category;
use crate::seen::SeenSet;
use crate::source::CandidateSource;
use crate::validate::{DropReason, RecordValidator};

/// Balancing limits. All heuristics are configuration, not constants.
///
/// By default no source may fill more than half of the need remaining when
/// its turn starts, except the last eligible source, which takes whatever
/// is left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Share of the remaining need any one source may fill, in (0, 1].
    pub default_source_cap: f64,
    /// Per-source overrides of `default_source_cap`. An override also caps
    /// the last eligible source.
    pub source_caps: BTreeMap<String, f64>,
    /// Candidates one source may examine for one category.
    pub attempt_budget_per_source: usize,
    /// Candidates examined across the whole balancing pass.
    pub global_attempt_ceiling: usize,
    /// Candidates requested per fetch.
    pub fetch_batch_size: usize,
    /// Allow synthetic sources to contribute.
    pub allow_synthetic: bool,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            default_source_cap: 0.5,
            source_caps: BTreeMap::new(),
            attempt_budget_per_source: 10_000,
            global_attempt_ceiling: 200_000,
            fetch_batch_size: 256,
            allow_synthetic: false,
        }
    }
}

impl BalanceConfig {
    /// Cap fraction for a source, clamped to at most 1.
    #[must_use]
    pub fn cap_for(&self, source_id: &str) -> f64 {
        self.source_caps
            .get(source_id)
            .copied()
            .unwrap_or(self.default_source_cap)
            .min(1.0)
    }

    /// Records a source may add when `remaining` are still needed.
    #[must_use]
    pub fn soft_cap(&self, source_id: &str, remaining: usize) -> usize {
        let cap = (remaining as f64 * self.cap_for(source_id)).ceil() as usize;
        cap.max(1).min(remaining)
    }
}

/// `max(0, target - current)`.
#[must_use]
pub fn needed(target: usize, current: usize) -> usize {
    target.saturating_sub(current)
}

/// Why balancing a category stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The target was reached.
    Satisfied,
    /// Every eligible source was tried and the target is still unmet.
    SourcesExhausted,
    /// The run-wide attempt ceiling was hit.
    AttemptCeiling,
    /// The run was cancelled.
    Cancelled,
}

impl StopReason {
    /// Snake-case name as it appears in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Satisfied => "satisfied",
            Self::SourcesExhausted => "sources_exhausted",
            Self::AttemptCeiling => "attempt_ceiling",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How one source's turn for one category ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// The category's need was met.
    NeedMet,
    /// The source filled its soft cap.
    CapReached,
    /// The source returned an empty batch.
    Exhausted,
    /// The per-source attempt budget was spent.
    BudgetSpent,
    /// The run-wide attempt ceiling was hit.
    AttemptCeiling,
    /// The run was cancelled.
    Cancelled,
    /// The source failed, now or earlier in the run.
    Unavailable,
    /// Synthetic source skipped without opt-in.
    SkippedSynthetic,
}

/// One source's contribution to one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePull {
    /// Source id.
    pub source: String,
    /// Soft cap in effect for this turn.
    pub cap: usize,
    /// Candidates examined.
    pub attempts: usize,
    /// Candidates accepted.
    pub added: usize,
    /// Candidates rejected as exact duplicates.
    pub duplicates: usize,
    /// Candidates rejected by validation or category mismatch.
    pub invalid: usize,
    /// How the turn ended.
    pub status: SourceStatus,
}

impl SourcePull {
    fn new(source: &str, cap: usize) -> Self {
        Self {
            source: source.to_string(),
            cap,
            attempts: 0,
            added: 0,
            duplicates: 0,
            invalid: 0,
            status: SourceStatus::Exhausted,
        }
    }
}

/// Balancing outcome for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBalance {
    /// Configured target.
    pub target: usize,
    /// Accepted count before balancing.
    pub before: usize,
    /// `max(0, target - before)`.
    pub needed: usize,
    /// Records added by balancing.
    pub added: usize,
    /// `needed - added`.
    pub shortfall: usize,
    /// Why balancing stopped.
    pub stop_reason: StopReason,
    /// Source turns, in priority order.
    pub sources: Vec<SourcePull>,
}

/// Balancing outcome for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    /// Per-category outcome, for every category with a target.
    pub categories: BTreeMap<Category, CategoryBalance>,
    /// Candidates examined across all sources.
    pub total_attempts: usize,
    /// Rejected candidates by reason.
    pub drops: BTreeMap<DropReason, usize>,
    /// Sources that failed during the run.
    pub failed_sources: BTreeSet<String>,
}

impl BalanceReport {
    /// Sum of per-category shortfalls.
    #[must_use]
    pub fn total_shortfall(&self) -> usize {
        self.categories.values().map(|c| c.shortfall).sum()
    }

    /// Records added per source across categories.
    #[must_use]
    pub fn added_by_source(&self) -> BTreeMap<String, usize> {
        let mut by_source = BTreeMap::new();
        for pull in self.categories.values().flat_map(|c| &c.sources) {
            *by_source.entry(pull.source.clone()).or_insert(0) += pull.added;
        }
        by_source
    }
}

/// Records added and the report describing how.
#[derive(Debug, Clone, Default)]
pub struct BalanceOutcome {
    /// Accepted top-up records, in acceptance order.
    pub added: Vec<FingerprintedRecord>,
    /// Balancing report.
    pub report: BalanceReport,
}

/// Pulls top-up records from candidate sources.
pub struct Balancer<'a> {
    config: &'a BalanceConfig,
    validator: &'a RecordValidator,
    fingerprinter: &'a Fingerprinter,
    seen: &'a SeenSet,
    cancel: &'a CancelToken,
}

impl<'a> Balancer<'a> {
    /// Create a balancer sharing the run's validator, fingerprinter and seen-set.
    #[must_use]
    pub fn new(
        config: &'a BalanceConfig,
        validator: &'a RecordValidator,
        fingerprinter: &'a Fingerprinter,
        seen: &'a SeenSet,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            config,
            validator,
            fingerprinter,
            seen,
            cancel,
        }
    }

    /// Top up every category in `targets` from `sources`, tried in order.
    pub fn balance(
        &self,
        targets: &BTreeMap<Category, usize>,
        current: &BTreeMap<Category, usize>,
        sources: &mut [Box<dyn CandidateSource>],
    ) -> BalanceOutcome {
        let mut outcome = BalanceOutcome::default();

        for (&category, &target) in targets {
            let before = current.get(&category).copied().unwrap_or(0);
            let need = needed(target, before);
            let mut state = CategoryState {
                category,
                remaining: need,
                pulls: Vec::new(),
            };

            let stop_reason = if need == 0 {
                StopReason::Satisfied
            } else {
                info!(%category, target, before, needed = need, "balancing category");
                self.fill_category(&mut state, sources, &mut outcome)
            };

            let added = need - state.remaining;
            if state.remaining > 0 {
                warn!(
                    %category,
                    shortfall = state.remaining,
                    reason = ?stop_reason,
                    "category target not met"
                );
            }

            outcome.report.categories.insert(
                category,
                CategoryBalance {
                    target,
                    before,
                    needed: need,
                    added,
                    shortfall: state.remaining,
                    stop_reason,
                    sources: state.pulls,
                },
            );
        }

        outcome
    }

    fn fill_category(
        &self,
        state: &mut CategoryState,
        sources: &mut [Box<dyn CandidateSource>],
        outcome: &mut BalanceOutcome,
    ) -> StopReason {
        let last_eligible = sources
            .iter()
            .rposition(|s| self.is_eligible(s.as_ref(), state.category, outcome));

        for (position, source) in sources.iter_mut().enumerate() {
            if state.remaining == 0 {
                return StopReason::Satisfied;
            }
            if self.cancel.is_cancelled() {
                return StopReason::Cancelled;
            }
            if self.ceiling_hit(outcome) {
                return StopReason::AttemptCeiling;
            }
            if !source.categories().contains(&state.category) {
                continue;
            }

            let id = source.id().to_string();
            let cap = if Some(position) == last_eligible
                && !self.config.source_caps.contains_key(&id)
            {
                state.remaining
            } else {
                self.config.soft_cap(&id, state.remaining)
            };
            let mut pull = SourcePull::new(&id, cap);

            if outcome.report.failed_sources.contains(&id) {
                pull.status = SourceStatus::Unavailable;
            } else if source.is_synthetic() && !self.config.allow_synthetic {
                debug!(source = %id, "skipping synthetic source");
                pull.status = SourceStatus::SkippedSynthetic;
            } else {
                let status = self.pull_from(source.as_mut(), state, &mut pull, outcome);
                pull.status = status;
                debug!(
                    source = %id,
                    category = %state.category,
                    added = pull.added,
                    attempts = pull.attempts,
                    status = ?pull.status,
                    "source turn finished"
                );
            }
            state.pulls.push(pull);
        }

        if state.remaining == 0 {
            StopReason::Satisfied
        } else if self.cancel.is_cancelled() {
            StopReason::Cancelled
        } else if self.ceiling_hit(outcome) {
            StopReason::AttemptCeiling
        } else {
            StopReason::SourcesExhausted
        }
    }

    fn pull_from(
        &self,
        source: &mut dyn CandidateSource,
        state: &mut CategoryState,
        pull: &mut SourcePull,
        outcome: &mut BalanceOutcome,
    ) -> SourceStatus {
        loop {
            if state.remaining == 0 {
                return SourceStatus::NeedMet;
            }
            if pull.added >= pull.cap {
                return SourceStatus::CapReached;
            }
            if self.cancel.is_cancelled() {
                return SourceStatus::Cancelled;
            }
            if pull.attempts >= self.config.attempt_budget_per_source {
                return SourceStatus::BudgetSpent;
            }
            if self.ceiling_hit(outcome) {
                return SourceStatus::AttemptCeiling;
            }

            let limit = self
                .config
                .fetch_batch_size
                .min(self.config.attempt_budget_per_source - pull.attempts)
                .min(self.config.global_attempt_ceiling - outcome.report.total_attempts)
                .max(1);

            let batch = match source.fetch(state.category, limit) {
                Ok(batch) if batch.is_empty() => return SourceStatus::Exhausted,
                Ok(batch) => batch,
                Err(e) => {
                    warn!(source = %pull.source, error = %e, "source unavailable, skipping");
                    outcome.report.failed_sources.insert(pull.source.clone());
                    return SourceStatus::Unavailable;
                }
            };

            let checked: Vec<Result<FingerprintedRecord, DropReason>> = batch
                .par_iter()
                .map(|raw| {
                    self.validator.validate(raw).map(|record| {
                        let fingerprint = self.fingerprinter.fingerprint(&record.input_text);
                        FingerprintedRecord {
                            record,
                            fingerprint,
                        }
                    })
                })
                .collect();

            for candidate in checked {
                if state.remaining == 0 || pull.added >= pull.cap {
                    break;
                }
                pull.attempts += 1;
                outcome.report.total_attempts += 1;

                match self.admit(state.category, candidate) {
                    Ok(item) => {
                        pull.added += 1;
                        state.remaining -= 1;
                        outcome.added.push(item);
                    }
                    Err(reason) => {
                        if reason == DropReason::ExactDuplicate {
                            pull.duplicates += 1;
                        } else {
                            pull.invalid += 1;
                        }
                        *outcome.report.drops.entry(reason).or_insert(0) += 1;
                    }
                }
            }
        }
    }

    fn admit(
        &self,
        category: Category,
        candidate: Result<FingerprintedRecord, DropReason>,
    ) -> Result<FingerprintedRecord, DropReason> {
        let item = candidate?;
        if item.record.category != category {
            return Err(DropReason::CategoryMismatch);
        }
        if !self
            .seen
            .check_and_insert(category, item.fingerprint.exact_digest)
        {
            return Err(DropReason::ExactDuplicate);
        }
        Ok(item)
    }

    fn is_eligible(
        &self,
        source: &dyn CandidateSource,
        category: Category,
        outcome: &BalanceOutcome,
    ) -> bool {
        source.categories().contains(&category)
            && !outcome.report.failed_sources.contains(source.id())
            && (self.config.allow_synthetic || !source.is_synthetic())
    }

    fn ceiling_hit(&self, outcome: &BalanceOutcome) -> bool {
        outcome.report.total_attempts >= self.config.global_attempt_ceiling
    }
}

struct CategoryState {
    category: Category,
    remaining: usize,
    pulls: Vec<SourcePull>,
}
