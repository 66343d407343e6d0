//! Record types flowing through the curation pipeline.
//!
//! Upstream collectors emit loosely-shaped JSON ([`RawRecord`]). The
//! validator turns each one into either a typed [`Record`] or a drop reason.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sieve_core::{normalize, Digest};
use std::fmt;
use std::str::FromStr;

/// Source name used when a record does not declare one.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Identity unit for leakage prevention: `hash(source + "::" + normalized input)`.
pub type GroupKey = Digest;

/// The fixed set of sample categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Fluency scoring: `fluency_score` in [0, 1].
    Fluency,
    /// Grammar correction: `corrected` must differ from the input.
    Grammar,
    /// Vocabulary level estimation: CEFR `level`.
    Vocabulary,
    /// Conversational response.
    Dialogue,
}

impl Category {
    /// Every category, in report order.
    pub const ALL: [Category; 4] = [
        Category::Fluency,
        Category::Grammar,
        Category::Vocabulary,
        Category::Dialogue,
    ];

    /// Lowercase name as used in input and output files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fluency => "fluency",
            Self::Grammar => "grammar",
            Self::Vocabulary => "vocabulary",
            Self::Dialogue => "dialogue",
        }
    }

    /// Output keys a record of this category must carry.
    #[must_use]
    pub const fn required_output_keys(self) -> &'static [&'static str] {
        match self {
            Self::Fluency => &["fluency_score", "reasoning"],
            Self::Grammar => &["corrected", "explanation"],
            Self::Vocabulary => &["key_words", "level"],
            Self::Dialogue => &["response"],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!(
                    "unknown category '{wanted}' (expected one of: fluency, grammar, vocabulary, dialogue)"
                )
            })
    }
}

/// A record as emitted by an upstream collector, not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// The JSON value exactly as read.
    pub value: Value,
    /// 1-based line number in the input file, when read from one.
    pub line: Option<usize>,
}

impl RawRecord {
    /// Wrap a JSON value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value, line: None }
    }

    /// Wrap a JSON value read from `line` of an input file.
    #[must_use]
    pub fn with_line(value: Value, line: usize) -> Self {
        Self {
            value,
            line: Some(line),
        }
    }

    /// The declared category name, if any (`category`, or legacy `task`).
    #[must_use]
    pub fn category_name(&self) -> Option<&str> {
        let obj = self.value.as_object()?;
        obj.get("category")
            .or_else(|| obj.get("task"))
            .and_then(Value::as_str)
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// An input line that could not be parsed as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// 1-based line number.
    pub line: usize,
    /// Parser message.
    pub message: String,
}

/// Everything read from the primary input.
#[derive(Debug, Clone, Default)]
pub struct RawInput {
    /// Parsed records, in file order.
    pub records: Vec<RawRecord>,
    /// Lines that were not valid JSON. Each counts as one dropped record.
    pub malformed: Vec<MalformedLine>,
}

impl RawInput {
    /// Total number of input records, malformed lines included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len() + self.malformed.len()
    }

    /// True when nothing was read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<RawRecord>> for RawInput {
    fn from(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            malformed: Vec::new(),
        }
    }
}

impl From<Vec<Value>> for RawInput {
    fn from(values: Vec<Value>) -> Self {
        values
            .into_iter()
            .map(RawRecord::new)
            .collect::<Vec<_>>()
            .into()
    }
}

/// A validated training sample.
///
/// Field order is the serialized key order of output lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Sample category.
    pub category: Category,
    /// Trimmed input text.
    #[serde(rename = "input")]
    pub input_text: String,
    /// Category-specific structured payload. Keys serialize sorted.
    pub output: Map<String, Value>,
    /// Upstream source name (`"unknown"` when not declared).
    pub source: String,
    /// Collector metadata, always including `source`.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Input exactly as received, kept only when trimming changed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl Record {
    /// Normalized form of the input text.
    #[must_use]
    pub fn normalized_input(&self) -> String {
        normalize(&self.input_text)
    }

    /// Leakage-prevention group key for this record.
    #[must_use]
    pub fn group_key(&self) -> GroupKey {
        group_key(&self.source, &self.input_text)
    }
}

/// Compute the group key for a `(source, input)` pair.
#[must_use]
pub fn group_key(source: &str, input_text: &str) -> GroupKey {
    let key = format!("{source}::{}", normalize(input_text));
    Digest::of(key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_roundtrip_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
            assert_eq!(category.to_string(), category.as_str());
        }
        assert_eq!(" Grammar ".parse::<Category>().unwrap(), Category::Grammar);
        assert!("translation".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serde_lowercase() {
        let json = serde_json::to_string(&Category::Vocabulary).unwrap();
        assert_eq!(json, "\"vocabulary\"");
    }

    #[test]
    fn test_group_key_ignores_case_and_whitespace() {
        let a = group_key("wiki", "The  Cat sat.");
        let b = group_key("wiki", "  the cat SAT. ");
        assert_eq!(a, b);
    }

    #[test]
    fn test_group_key_depends_on_source() {
        assert_ne!(group_key("wiki", "the cat"), group_key("news", "the cat"));
    }

    #[test]
    fn test_raw_record_category_name() {
        let legacy = RawRecord::new(json!({"task": "grammar", "input": "x"}));
        assert_eq!(legacy.category_name(), Some("grammar"));

        let modern = RawRecord::new(json!({"category": "fluency", "task": "grammar"}));
        assert_eq!(modern.category_name(), Some("fluency"));

        assert_eq!(RawRecord::new(json!([1, 2])).category_name(), None);
    }

    #[test]
    fn test_record_serializes_in_fixed_order() {
        let mut output = Map::new();
        output.insert("response".into(), json!("Sure, happy to help you."));
        let record = Record {
            category: Category::Dialogue,
            input_text: "Can you help me?".into(),
            output,
            source: "unknown".into(),
            metadata: Map::new(),
            raw_text: None,
        };

        let line = serde_json::to_string(&record).unwrap();
        assert!(line.starts_with(r#"{"category":"dialogue","input":"Can you help me?","output""#));
        assert!(!line.contains("raw_text"));
    }
}
