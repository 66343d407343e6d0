//! Exact-duplicate seen-set shared by ingestion and balancing.

use serde::{Deserialize, Serialize};
use sieve_core::Digest;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::record::Category;

/// Whether exact duplicates are detected within a category or across all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    /// The same input may appear once per category.
    #[default]
    PerCategory,
    /// The same input may appear once in the whole dataset.
    Global,
}

impl DedupScope {
    /// Snake-case name as it appears in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PerCategory => "per_category",
            Self::Global => "global",
        }
    }
}

/// Set of accepted exact digests.
///
/// `check_and_insert` is a single locked read-then-insert, so two callers
/// can never both observe the same digest as new.
#[derive(Debug, Default)]
pub struct SeenSet {
    scope: DedupScope,
    inner: Mutex<HashSet<(Option<Category>, Digest)>>,
}

impl SeenSet {
    /// Create an empty set with the given scope.
    #[must_use]
    pub fn new(scope: DedupScope) -> Self {
        Self {
            scope,
            inner: Mutex::new(HashSet::new()),
        }
    }

    /// Dedup scope of this set.
    #[must_use]
    pub fn scope(&self) -> DedupScope {
        self.scope
    }

    fn key(&self, category: Category, digest: Digest) -> (Option<Category>, Digest) {
        match self.scope {
            DedupScope::PerCategory => (Some(category), digest),
            DedupScope::Global => (None, digest),
        }
    }

    /// Record `digest` for `category`. Returns true if it was not seen before.
    pub fn check_and_insert(&self, category: Category, digest: Digest) -> bool {
        let key = self.key(category, digest);
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }

    /// True if `digest` has already been accepted for `category`.
    #[must_use]
    pub fn contains(&self, category: Category, digest: Digest) -> bool {
        let key = self.key(category, digest);
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }

    /// Number of accepted digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing has been accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
