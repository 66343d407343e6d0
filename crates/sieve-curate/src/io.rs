//! File I/O for JSONL and JSON-array datasets.

use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{CurateError, Result};
use crate::record::{MalformedLine, RawInput, RawRecord, Record};

/// Train partition file name.
pub const TRAIN_FILE: &str = "train.jsonl";

/// Validation partition file name.
pub const VAL_FILE: &str = "val.jsonl";

/// Report file name.
pub const REPORT_FILE: &str = "report.json";

/// On-disk input layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// One JSON record per line.
    Jsonl,
    /// A single JSON array of records.
    JsonArray,
}

impl InputFormat {
    /// Detect the format from the file extension. Anything other than
    /// `.json` is read as JSONL.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::JsonArray,
            _ => Self::Jsonl,
        }
    }
}

/// Read raw records from `path`, detecting the format from its extension.
pub fn read_input<P: AsRef<Path>>(path: P) -> Result<RawInput> {
    let path = path.as_ref();
    match InputFormat::from_path(path) {
        InputFormat::Jsonl => read_jsonl(path),
        InputFormat::JsonArray => read_json_array(path),
    }
}

/// Read a JSONL file. Unparseable lines are collected, not fatal.
pub fn read_jsonl<P: AsRef<Path>>(path: P) -> Result<RawInput> {
    let file = File::open(path)?;
    parse_jsonl(BufReader::new(file))
}

/// Parse JSONL from any buffered reader. Blank lines are skipped.
///
/// Lines are split on raw bytes, so a line with invalid UTF-8 becomes a
/// [`MalformedLine`] like any other unparseable line. Only a failing reader
/// is an error.
pub fn parse_jsonl<R: BufRead>(reader: R) -> Result<RawInput> {
    let mut input = RawInput::default();

    for (line_num, line) in reader.split(b'\n').enumerate() {
        let mut line = line?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match serde_json::from_slice::<Value>(&line) {
            Ok(value) => input.records.push(RawRecord::with_line(value, line_num + 1)),
            Err(e) => input.malformed.push(MalformedLine {
                line: line_num + 1,
                message: e.to_string(),
            }),
        }
    }

    Ok(input)
}

/// Read a file holding one JSON array of records.
pub fn read_json_array<P: AsRef<Path>>(path: P) -> Result<RawInput> {
    let file = File::open(path)?;
    let value: Value = serde_json::from_reader(BufReader::new(file))?;

    match value {
        Value::Array(items) => Ok(items.into()),
        other => Err(CurateError::Parse {
            line: 1,
            message: format!("expected a JSON array of records, found {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Write records as JSONL, one compact object per line.
pub fn write_records_jsonl<P: AsRef<Path>>(path: P, records: &[Record]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    Ok(())
}

/// Read records previously written by [`write_records_jsonl`].
pub fn read_records_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let file = File::open(path)?;
    let mut records = Vec::new();

    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| CurateError::Parse {
            line: line_num + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Write any serializable value as pretty-printed JSON with a trailing newline.
pub fn write_json_pretty<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
