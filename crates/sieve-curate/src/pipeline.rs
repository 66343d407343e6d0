//! End-to-end curation run.
//!
//! Stages, in order:
//! 1. ingest: validate and fingerprint each batch in parallel, then admit
//!    records through the seen-set in input order (first occurrence wins)
//! 2. optional near-duplicate removal over the full accepted set
//! 3. balancing from candidate sources toward per-category targets
//! 4. grouped train/val split of everything accepted
//! 5. near-duplicate estimate, leakage check and report

use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::balance::{BalanceReport, Balancer};
use crate::cancel::CancelToken;
use crate::config::CurateConfig;
use crate::error::Result;
use crate::fingerprint::{FingerprintedRecord, Fingerprinter};
use crate::near_dup::{estimate, near_duplicate_removals};
use crate::record::{Category, RawInput, Record};
use crate::report::{CurationReport, FinalState, NearDupReport, Reporter};
use crate::seen::{DedupScope, SeenSet};
use crate::source::CandidateSource;
use crate::split::GroupedSplitter;
use crate::validate::{DropReason, RecordValidator};

/// Partitions and report produced by a run.
#[derive(Debug, Clone)]
pub struct CurationOutcome {
    /// Training records.
    pub train: Vec<Record>,
    /// Validation records.
    pub val: Vec<Record>,
    /// Run report.
    pub report: CurationReport,
}

/// Ingestion progress, reported after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestProgress {
    /// Zero-based batch index.
    pub batch: usize,
    /// Input records processed so far.
    pub processed: usize,
    /// Records accepted so far.
    pub accepted: usize,
}

/// Runs the curation pipeline for one configuration.
#[derive(Debug, Clone)]
pub struct Curator {
    config: CurateConfig,
    validator: RecordValidator,
    fingerprinter: Fingerprinter,
    splitter: GroupedSplitter,
}

impl Curator {
    /// Create a curator. Fails if the configuration is invalid.
    pub fn new(config: CurateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            validator: RecordValidator::new(config.min_input_chars),
            fingerprinter: Fingerprinter::new(),
            splitter: GroupedSplitter::new(config.val_fraction, config.seed)?,
            config,
        })
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> &CurateConfig {
        &self.config
    }

    /// Curate `input`, topping up from `sources` in priority order.
    ///
    /// Per-record problems are counted in the report, never returned as
    /// errors. A cancelled run still splits what it has.
    pub fn run(
        &self,
        input: RawInput,
        sources: &mut [Box<dyn CandidateSource>],
        cancel: &CancelToken,
    ) -> Result<CurationOutcome> {
        self.run_with_progress(input, sources, cancel, |_| {})
    }

    /// Like [`Curator::run`], calling `on_batch` after each ingestion batch.
    pub fn run_with_progress<F>(
        &self,
        input: RawInput,
        sources: &mut [Box<dyn CandidateSource>],
        cancel: &CancelToken,
        mut on_batch: F,
    ) -> Result<CurationOutcome>
    where
        F: FnMut(IngestProgress),
    {
        let seen = SeenSet::new(self.config.dedup_scope);
        let mut reporter = Reporter::new();

        info!(records = input.len(), "ingesting input");
        let mut accepted = self.ingest(input, &seen, &mut reporter, cancel, &mut on_batch);

        let removed = if self.config.near_dup.remove && !cancel.is_cancelled() {
            self.remove_near_duplicates(&mut accepted, &mut reporter)
        } else {
            0
        };

        let balance = if self.config.targets.is_empty() || cancel.is_cancelled() {
            BalanceReport::default()
        } else {
            let mut current: BTreeMap<Category, usize> = BTreeMap::new();
            for item in &accepted {
                *current.entry(item.record.category).or_insert(0) += 1;
            }
            info!(sources = sources.len(), "balancing categories");
            let balancer = Balancer::new(
                &self.config.balance,
                &self.validator,
                &self.fingerprinter,
                &seen,
                cancel,
            );
            let outcome = balancer.balance(&self.config.targets, &current, sources);
            accepted.extend(outcome.added);
            outcome.report
        };

        let near_duplicates = self.estimate_near_duplicates(&accepted, removed);

        info!(records = accepted.len(), "splitting");
        let split = self.splitter.split(accepted);
        if let Err(e) = split.ensure_disjoint() {
            error!(error = %e, "train/val leakage detected");
        }

        let train: Vec<Record> = split.train.into_iter().map(|f| f.record).collect();
        let val: Vec<Record> = split.val.into_iter().map(|f| f.record).collect();

        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!("run cancelled; report covers partial results");
        }

        let report = reporter.finish(FinalState {
            config: &self.config,
            train: &train,
            val: &val,
            split: split.stats,
            balance,
            near_duplicates,
            cancelled,
        });
        info!(
            status = %report.status,
            train = train.len(),
            val = val.len(),
            "curation finished"
        );

        Ok(CurationOutcome { train, val, report })
    }

    fn ingest(
        &self,
        input: RawInput,
        seen: &SeenSet,
        reporter: &mut Reporter,
        cancel: &CancelToken,
        on_batch: &mut dyn FnMut(IngestProgress),
    ) -> Vec<FingerprintedRecord> {
        for line in &input.malformed {
            debug!(line = line.line, message = %line.message, "malformed input line");
            reporter.record_malformed();
        }

        let mut accepted = Vec::new();
        let mut processed = 0;
        for (batch_no, batch) in input.records.chunks(self.config.batch_size).enumerate() {
            if cancel.is_cancelled() {
                warn!(batch = batch_no, "ingestion cancelled");
                break;
            }

            let checked: Vec<_> = batch
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

            for (raw, result) in batch.iter().zip(checked) {
                reporter.record_input(raw);
                match result {
                    Ok(item) => {
                        let category = item.record.category;
                        reporter.record_valid(category);
                        if seen.check_and_insert(category, item.fingerprint.exact_digest) {
                            accepted.push(item);
                        } else {
                            reporter.record_drop(DropReason::ExactDuplicate, Some(category));
                        }
                    }
                    Err(reason) => {
                        let category = raw.category_name().and_then(|c| c.parse().ok());
                        reporter.record_drop(reason, category);
                    }
                }
            }
            processed += batch.len();
            debug!(batch = batch_no, accepted = accepted.len(), "ingested batch");
            on_batch(IngestProgress {
                batch: batch_no,
                processed,
                accepted: accepted.len(),
            });
        }

        info!(accepted = accepted.len(), "ingestion finished");
        accepted
    }

    /// Drop near-duplicates within each dedup scope, keeping the first-seen
    /// member of every cluster. Returns the number removed.
    fn remove_near_duplicates(
        &self,
        accepted: &mut Vec<FingerprintedRecord>,
        reporter: &mut Reporter,
    ) -> usize {
        let mut scopes: BTreeMap<Option<Category>, Vec<usize>> = BTreeMap::new();
        for (i, item) in accepted.iter().enumerate() {
            let key = match self.config.dedup_scope {
                DedupScope::PerCategory => Some(item.record.category),
                DedupScope::Global => None,
            };
            scopes.entry(key).or_default().push(i);
        }

        let mut drop = vec![false; accepted.len()];
        for positions in scopes.values() {
            let signatures: Vec<u64> = positions
                .iter()
                .map(|&i| accepted[i].fingerprint.simhash)
                .collect();
            for local in near_duplicate_removals(&signatures, &self.config.near_dup) {
                drop[positions[local]] = true;
            }
        }

        let before = accepted.len();
        let mut flags = drop.into_iter();
        accepted.retain(|item| {
            let remove = flags.next().unwrap_or(false);
            if remove {
                reporter.record_drop(DropReason::NearDuplicate, Some(item.record.category));
            }
            !remove
        });

        let removed = before - accepted.len();
        info!(removed, "near-duplicate removal finished");
        removed
    }

    fn estimate_near_duplicates(
        &self,
        accepted: &[FingerprintedRecord],
        removed: usize,
    ) -> NearDupReport {
        let config = &self.config.near_dup;
        let all: Vec<u64> = accepted.iter().map(|f| f.fingerprint.simhash).collect();

        let mut by_category: BTreeMap<Category, Vec<u64>> = BTreeMap::new();
        for item in accepted {
            by_category
                .entry(item.record.category)
                .or_default()
                .push(item.fingerprint.simhash);
        }

        let overall = estimate(&all, config);
        debug!(
            pairs = overall.pairs,
            flagged = overall.flagged_items,
            sampled = overall.sampled,
            "near-duplicate estimate"
        );

        NearDupReport {
            overall,
            per_category: by_category
                .into_iter()
                .map(|(category, sigs)| (category, estimate(&sigs, config)))
                .collect(),
            removed,
        }
    }
}
