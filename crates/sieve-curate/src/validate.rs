//! Per-category schema and quality validation.
//!
//! Validation is total: every input, however malformed, maps to either a
//! [`Record`] or a [`DropReason`]. Nothing here panics or returns an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sieve_core::normalize;
use std::fmt;

use crate::record::{Category, RawRecord, Record, UNKNOWN_SOURCE};

/// Default minimum input length, in characters.
pub const DEFAULT_MIN_INPUT_CHARS: usize = 5;

/// Minimum trimmed length of a dialogue `response`.
pub const MIN_RESPONSE_CHARS: usize = 10;

/// Why a record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Input line was not valid JSON.
    MalformedJson,
    /// Record is not a JSON object.
    RecordNotObject,
    /// Category, input, output, or a required output key is absent.
    MissingRequiredField,
    /// Category is not one of the fixed set.
    UnknownCategory,
    /// Input is present but not a string.
    InputNotText,
    /// Trimmed input is shorter than the configured minimum.
    InputTooShort,
    /// Output is an empty object or empty string.
    OutputEmpty,
    /// Output has the wrong shape or a field has the wrong type.
    OutputSchemaInvalid,
    /// A score field lies outside [0, 1].
    ScoreOutOfRange,
    /// A correction is identical to its input after normalization.
    CorrectionUnchanged,
    /// A balancing source yielded a record for a different category.
    CategoryMismatch,
    /// Normalized input already accepted (per category or globally).
    ExactDuplicate,
    /// Flagged by the near-duplicate index while removal is enabled.
    NearDuplicate,
}

impl DropReason {
    /// Snake-case reason code as it appears in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedJson => "malformed_json",
            Self::RecordNotObject => "record_not_object",
            Self::MissingRequiredField => "missing_required_field",
            Self::UnknownCategory => "unknown_category",
            Self::InputNotText => "input_not_text",
            Self::InputTooShort => "input_too_short",
            Self::OutputEmpty => "output_empty",
            Self::OutputSchemaInvalid => "output_schema_invalid",
            Self::ScoreOutOfRange => "score_out_of_range",
            Self::CorrectionUnchanged => "correction_unchanged",
            Self::CategoryMismatch => "category_mismatch",
            Self::ExactDuplicate => "exact_duplicate",
            Self::NearDuplicate => "near_duplicate",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates raw records against the static per-category schemas.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    min_input_chars: usize,
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INPUT_CHARS)
    }
}

/// Input and output located in either the unified or the chat shape.
struct Located<'a> {
    input: &'a Value,
    output: Option<Value>,
}

impl RecordValidator {
    /// Create a validator. A minimum of zero is treated as one.
    #[must_use]
    pub fn new(min_input_chars: usize) -> Self {
        Self {
            min_input_chars: min_input_chars.max(1),
        }
    }

    /// Minimum input length in characters.
    #[must_use]
    pub fn min_input_chars(&self) -> usize {
        self.min_input_chars
    }

    /// Validate one record.
    pub fn validate(&self, raw: &RawRecord) -> Result<Record, DropReason> {
        let obj = raw.value.as_object().ok_or(DropReason::RecordNotObject)?;

        let category = match obj.get("category").or_else(|| obj.get("task")) {
            Some(Value::String(s)) if !s.trim().is_empty() => s
                .parse::<Category>()
                .map_err(|_| DropReason::UnknownCategory)?,
            _ => return Err(DropReason::MissingRequiredField),
        };

        let located = locate(obj)?;
        let raw_input = located
            .input
            .as_str()
            .ok_or(DropReason::InputNotText)?;
        let input_text = raw_input.trim();
        if input_text.chars().count() < self.min_input_chars {
            return Err(DropReason::InputTooShort);
        }

        let output = match located.output {
            None | Some(Value::Null) => return Err(DropReason::MissingRequiredField),
            Some(Value::Object(map)) => map,
            Some(Value::String(s)) if s.trim().is_empty() => return Err(DropReason::OutputEmpty),
            Some(Value::String(s)) => match serde_json::from_str::<Value>(&s) {
                Ok(Value::Object(map)) => map,
                _ => return Err(DropReason::OutputSchemaInvalid),
            },
            Some(_) => return Err(DropReason::OutputSchemaInvalid),
        };
        if output.is_empty() {
            return Err(DropReason::OutputEmpty);
        }
        if category
            .required_output_keys()
            .iter()
            .any(|key| !output.contains_key(*key))
        {
            return Err(DropReason::MissingRequiredField);
        }
        check_category_rules(category, input_text, &output)?;

        let mut metadata = match obj.get("metadata") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        let source = metadata
            .get("source")
            .or_else(|| obj.get("source"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_SOURCE)
            .to_string();
        metadata.insert("source".to_string(), Value::String(source.clone()));

        Ok(Record {
            category,
            input_text: input_text.to_string(),
            output,
            source,
            metadata,
            raw_text: (raw_input != input_text).then(|| raw_input.to_string()),
        })
    }
}

/// Find input and output in the unified shape, or fall back to chat messages.
fn locate(obj: &Map<String, Value>) -> Result<Located<'_>, DropReason> {
    if let Some(input) = obj.get("input") {
        return Ok(Located {
            input,
            output: obj.get("output").cloned(),
        });
    }

    let messages = obj
        .get("messages")
        .and_then(Value::as_array)
        .ok_or(DropReason::MissingRequiredField)?;
    let content_for = |role: &str| {
        messages.iter().find_map(|m| {
            (m.get("role").and_then(Value::as_str) == Some(role))
                .then(|| m.get("content"))
                .flatten()
        })
    };

    let input = content_for("user").ok_or(DropReason::MissingRequiredField)?;
    // Assistant turns are usually a JSON object dumped to a string; plain
    // prose is a conversational reply.
    let output = content_for("assistant").map(|content| match content {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ if s.trim().is_empty() => Value::String(String::new()),
            _ => {
                let mut map = Map::new();
                map.insert("response".to_string(), Value::String(s.clone()));
                Value::Object(map)
            }
        },
        other => other.clone(),
    });

    Ok(Located { input, output })
}

fn check_category_rules(
    category: Category,
    input_text: &str,
    output: &Map<String, Value>,
) -> Result<(), DropReason> {
    match category {
        Category::Fluency => {
            let score = match output.get("fluency_score") {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or(DropReason::OutputSchemaInvalid)?;
            if !(0.0..=1.0).contains(&score) {
                return Err(DropReason::ScoreOutOfRange);
            }
        }
        Category::Grammar => {
            let corrected = output
                .get("corrected")
                .and_then(Value::as_str)
                .ok_or(DropReason::OutputSchemaInvalid)?;
            if normalize(corrected) == normalize(input_text) {
                return Err(DropReason::CorrectionUnchanged);
            }
        }
        Category::Vocabulary => {
            let level = output
                .get("level")
                .and_then(Value::as_str)
                .ok_or(DropReason::OutputSchemaInvalid)?;
            if !is_cefr_level(level.trim()) {
                return Err(DropReason::OutputSchemaInvalid);
            }
        }
        Category::Dialogue => {
            let response = output
                .get("response")
                .and_then(Value::as_str)
                .ok_or(DropReason::OutputSchemaInvalid)?;
            if response.trim().chars().count() < MIN_RESPONSE_CHARS {
                return Err(DropReason::OutputSchemaInvalid);
            }
        }
    }
    Ok(())
}

fn is_cefr_level(level: &str) -> bool {
    matches!(level.as_bytes(), [b'A' | b'B' | b'C', b'1' | b'2'])
}
