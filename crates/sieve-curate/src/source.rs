//! Upstream candidate sources for balancing.
//!
//! A source hands out raw candidate records per category in batches. An
//! empty batch means the source is exhausted for that category; an error
//! means the source is unavailable and is skipped for the rest of the run.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CurateError, Result};
use crate::io::read_input;
use crate::record::{Category, RawRecord};

/// A supplier of additional candidate records.
pub trait CandidateSource: Send {
    /// Stable source identifier used in reports and cap configuration.
    fn id(&self) -> &str;

    /// Categories this source can supply.
    fn categories(&self) -> Vec<Category>;

    /// Whether records are machine-generated rather than collected.
    fn is_synthetic(&self) -> bool {
        false
    }

    /// Fetch up to `limit` candidates for `category`.
    ///
    /// Returns an empty batch when exhausted and
    /// [`CurateError::SourceUnavailable`] when the source cannot be read.
    fn fetch(&mut self, category: Category, limit: usize) -> Result<Vec<RawRecord>>;
}

/// In-memory candidate queue per category.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    id: String,
    queues: BTreeMap<Category, VecDeque<RawRecord>>,
    synthetic: bool,
    failure: Option<String>,
}

impl MemorySource {
    /// Create an empty source.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Queue candidates for `category`.
    #[must_use]
    pub fn with_records<I, R>(mut self, category: Category, records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RawRecord>,
    {
        self.push(category, records);
        self
    }

    /// Mark the source as synthetic.
    #[must_use]
    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    /// Make every fetch fail with `reason`.
    #[must_use]
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// Queue candidates for `category`.
    pub fn push<I, R>(&mut self, category: Category, records: I)
    where
        I: IntoIterator<Item = R>,
        R: Into<RawRecord>,
    {
        self.queues
            .entry(category)
            .or_default()
            .extend(records.into_iter().map(Into::into));
    }

    /// Candidates still queued for `category`.
    #[must_use]
    pub fn remaining(&self, category: Category) -> usize {
        self.queues.get(&category).map_or(0, VecDeque::len)
    }
}

impl CandidateSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn categories(&self) -> Vec<Category> {
        self.queues.keys().copied().collect()
    }

    fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    fn fetch(&mut self, category: Category, limit: usize) -> Result<Vec<RawRecord>> {
        if let Some(reason) = &self.failure {
            return Err(CurateError::SourceUnavailable {
                source_id: self.id.clone(),
                reason: reason.clone(),
            });
        }

        let Some(queue) = self.queues.get_mut(&category) else {
            return Ok(Vec::new());
        };
        let take = limit.min(queue.len());
        Ok(queue.drain(..take).collect())
    }
}

/// Candidates loaded from a JSONL or JSON-array file, filed by their
/// declared category.
#[derive(Debug, Clone)]
pub struct JsonlSource {
    path: PathBuf,
    inner: MemorySource,
}

impl JsonlSource {
    /// Load candidates from `path`.
    ///
    /// Records without a recognizable category and unparseable lines are
    /// skipped. A file that cannot be read is reported as
    /// [`CurateError::SourceUnavailable`].
    pub fn open(id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let id = id.into();
        let path = path.as_ref();
        let input = read_input(path).map_err(|e| CurateError::SourceUnavailable {
            source_id: id.clone(),
            reason: e.to_string(),
        })?;

        if !input.malformed.is_empty() {
            warn!(
                source = %id,
                lines = input.malformed.len(),
                "skipping malformed candidate lines"
            );
        }

        let mut inner = MemorySource::new(id);
        let mut skipped = 0usize;
        for raw in input.records {
            match raw.category_name().and_then(|c| c.parse::<Category>().ok()) {
                Some(category) => inner.push(category, [raw]),
                None => skipped += 1,
            }
        }
        debug!(
            source = %inner.id,
            path = %path.display(),
            skipped,
            "loaded candidate source"
        );

        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    /// Mark the source as synthetic.
    #[must_use]
    pub fn synthetic(mut self) -> Self {
        self.inner.synthetic = true;
        self
    }

    /// File this source was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Candidates still queued for `category`.
    #[must_use]
    pub fn remaining(&self, category: Category) -> usize {
        self.inner.remaining(category)
    }
}

impl CandidateSource for JsonlSource {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn categories(&self) -> Vec<Category> {
        self.inner.categories()
    }

    fn is_synthetic(&self) -> bool {
        self.inner.is_synthetic()
    }

    fn fetch(&mut self, category: Category, limit: usize) -> Result<Vec<RawRecord>> {
        self.inner.fetch(category, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_memory_source_drains_in_batches() {
        let mut source = MemorySource::new("mem").with_records(
            Category::Grammar,
            (0..5).map(|i| json!({"category": "grammar", "input": format!("text {i}")})),
        );

        assert_eq!(source.categories(), vec![Category::Grammar]);
        assert_eq!(source.fetch(Category::Grammar, 3).unwrap().len(), 3);
        assert_eq!(source.fetch(Category::Grammar, 3).unwrap().len(), 2);
        assert!(source.fetch(Category::Grammar, 3).unwrap().is_empty());
        assert!(source.fetch(Category::Fluency, 3).unwrap().is_empty());
    }

    #[test]
    fn test_failing_source() {
        let mut source = MemorySource::new("down").failing("connection refused");
        let err = source.fetch(Category::Dialogue, 10).unwrap_err();
        assert!(matches!(
            err,
            CurateError::SourceUnavailable { ref source_id, .. } if source_id == "down"
        ));
    }

    #[test]
    fn test_synthetic_flag() {
        assert!(!MemorySource::new("a").is_synthetic());
        assert!(MemorySource::new("b").synthetic().is_synthetic());
    }

    #[test]
    fn test_jsonl_source_files_by_category() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extra.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"category\": \"grammar\", \"input\": \"He go home.\"}\n",
                "{\"task\": \"dialogue\", \"input\": \"Hi there friend\"}\n",
                "{\"category\": \"poetry\", \"input\": \"Roses are red\"}\n",
                "not json\n",
            ),
        )
        .unwrap();

        let mut source = JsonlSource::open("extra", &path).unwrap();
        assert_eq!(source.id(), "extra");
        assert_eq!(source.remaining(Category::Grammar), 1);
        assert_eq!(source.remaining(Category::Dialogue), 1);
        assert_eq!(source.categories().len(), 2);
        assert_eq!(source.fetch(Category::Grammar, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_jsonl_source_skips_invalid_utf8_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extra.jsonl");
        let mut data = b"{\"category\": \"grammar\", \"input\": \"He go home.\"}\n".to_vec();
        data.extend_from_slice(b"\xff\xfe garbage\n");
        data.extend_from_slice(b"{\"category\": \"grammar\", \"input\": \"She go out.\"}\n");
        std::fs::write(&path, data).unwrap();

        let source = JsonlSource::open("extra", &path).unwrap();
        assert_eq!(source.remaining(Category::Grammar), 2);
    }

    #[test]
    fn test_jsonl_source_missing_file() {
        let dir = tempdir().unwrap();
        let result = JsonlSource::open("gone", dir.path().join("missing.jsonl"));
        assert!(matches!(result, Err(CurateError::SourceUnavailable { .. })));
    }
}
