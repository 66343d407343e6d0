//! Integration tests for sieve-curate.
//!
//! Tests end-to-end curation runs with real file I/O.

use serde_json::{json, Value};
use sieve_curate::io::{REPORT_FILE, TRAIN_FILE, VAL_FILE};
use sieve_curate::split::leakage_groups;
use sieve_curate::{
    read_input, read_records_jsonl, write_json_pretty, write_records_jsonl, CancelToken,
    CandidateSource, Category, CurateConfig, CurationOutcome, Curator, DropReason, MemorySource,
    RawInput, ReadinessStatus, Record, StopReason,
};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn fluency(text: &str, source: &str) -> Value {
    json!({
        "category": "fluency",
        "input": text,
        "output": {"fluency_score": 0.85, "reasoning": "natural phrasing"},
        "metadata": {"source": source}
    })
}

fn grammar(text: &str, source: &str) -> Value {
    json!({
        "task": "grammar",
        "input": text,
        "output": {"corrected": format!("{text} Corrected."), "explanation": "tense"},
        "metadata": {"source": source}
    })
}

fn dialogue(text: &str, source: &str) -> Value {
    json!({
        "category": "dialogue",
        "input": text,
        "output": {"response": "That is a thoughtful question, let me explain."},
        "metadata": {"source": source}
    })
}

/// 100 records per category: 90 unique inputs, then 10 exact repeats.
fn create_mixed_dataset() -> Vec<Value> {
    let mut values = Vec::new();
    let makers: [(fn(&str, &str) -> Value, &str); 3] = [
        (fluency, "She quietly read sentence number"),
        (grammar, "He have walked to the store times"),
        (dialogue, "Could you tell me more about topic"),
    ];

    for (make, stem) in makers {
        for i in 0..90 {
            values.push(make(&format!("{stem} {i}"), "corpus"));
        }
        for i in 0..10 {
            values.push(make(&format!("{stem} {i}"), "corpus"));
        }
    }
    values
}

fn run(
    config: CurateConfig,
    input: RawInput,
    sources: &mut [Box<dyn CandidateSource>],
) -> CurationOutcome {
    Curator::new(config)
        .unwrap()
        .run(input, sources, &CancelToken::new())
        .unwrap()
}

fn balanced_config() -> CurateConfig {
    CurateConfig {
        val_fraction: 0.1,
        targets: [
            (Category::Fluency, 90),
            (Category::Grammar, 90),
            (Category::Dialogue, 120),
        ]
        .into_iter()
        .collect(),
        ..CurateConfig::default()
    }
}

fn scarce_dialogue_source() -> Vec<Box<dyn CandidateSource>> {
    let mut pool: Vec<Value> = (0..15)
        .map(|i| dialogue(&format!("A fresh question from the forum, thread {i}"), "forum"))
        .collect();
    // Already present in the primary input.
    pool.push(dialogue("Could you tell me more about topic 3", "forum-mirror"));
    pool.push(dialogue("could you TELL me more about topic 4", "forum-mirror"));

    vec![Box::new(
        MemorySource::new("forum").with_records(Category::Dialogue, pool),
    )]
}

#[test]
fn test_end_to_end_shortfall_scenario() {
    let input: RawInput = create_mixed_dataset().into();
    let mut sources = scarce_dialogue_source();
    let outcome = run(balanced_config(), input, &mut sources);
    let report = &outcome.report;

    assert_eq!(report.input_records, 300);
    assert_eq!(report.drops.ingest[&DropReason::ExactDuplicate], 30);
    for category in [Category::Fluency, Category::Grammar, Category::Dialogue] {
        let c = &report.categories[&category];
        assert_eq!(c.exact_duplicates, 10, "{category}");
        assert!((c.duplicate_rate - 0.1).abs() < 1e-9);
    }

    let dialogue = &report.categories[&Category::Dialogue];
    assert_eq!(dialogue.accepted, 105);
    assert!(dialogue.shortfall >= 15);
    assert_eq!(report.categories[&Category::Fluency].shortfall, 0);
    assert_eq!(report.categories[&Category::Grammar].shortfall, 0);

    let balance = &report.balance.categories[&Category::Dialogue];
    assert_eq!(balance.needed, 30);
    assert_eq!(balance.added, 15);
    assert_eq!(balance.stop_reason, StopReason::SourcesExhausted);
    assert_eq!(balance.sources[0].duplicates, 2);
    assert_eq!(report.drops.balance[&DropReason::ExactDuplicate], 2);

    assert_eq!(report.split.leakage_groups, 0);
    assert_eq!(leakage_groups(&outcome.train, &outcome.val), 0);
    assert_eq!(report.accepted(), 285);
    assert_eq!(outcome.val.len(), 29);
    assert_eq!(report.status, ReadinessStatus::ReadyWithWarnings);
    assert!(report.warnings.iter().any(|w| w.contains("dialogue")));
}

#[test]
fn test_identical_runs_produce_identical_reports() {
    let first = run(
        balanced_config(),
        create_mixed_dataset().into(),
        &mut scarce_dialogue_source(),
    );
    let second = run(
        balanced_config(),
        create_mixed_dataset().into(),
        &mut scarce_dialogue_source(),
    );

    assert_eq!(first.train, second.train);
    assert_eq!(first.val, second.val);
    assert_eq!(
        serde_json::to_string_pretty(&first.report).unwrap(),
        serde_json::to_string_pretty(&second.report).unwrap()
    );
}

#[test]
fn test_different_seed_changes_partition_not_counts() {
    let a = run(balanced_config(), create_mixed_dataset().into(), &mut Vec::new());
    let b = run(
        CurateConfig {
            seed: 7,
            ..balanced_config()
        },
        create_mixed_dataset().into(),
        &mut Vec::new(),
    );

    assert_eq!(a.val.len(), b.val.len());
    assert_ne!(a.val, b.val);
}

#[test]
fn test_curating_curated_output_is_idempotent() {
    let first = run(
        CurateConfig {
            val_fraction: 0.2,
            ..CurateConfig::default()
        },
        create_mixed_dataset().into(),
        &mut Vec::new(),
    );

    let values: Vec<Value> = first
        .train
        .iter()
        .chain(&first.val)
        .map(|r| serde_json::to_value(r).unwrap())
        .collect();
    let second = run(
        CurateConfig {
            val_fraction: 0.2,
            ..CurateConfig::default()
        },
        values.into(),
        &mut Vec::new(),
    );

    assert_eq!(second.report.accepted(), first.report.accepted());
    assert!(!second.report.drops.ingest.contains_key(&DropReason::ExactDuplicate));
    assert_eq!(second.report.drops.total(), 0);
}

#[test]
fn test_shared_input_across_categories_stays_in_one_partition() {
    let mut values = Vec::new();
    for i in 0..60 {
        let text = format!("Please explain idea number {i} in simple words");
        values.push(dialogue(&text, "wiki"));
        values.push(grammar(&text, "wiki"));
    }
    // Per-category dedup keeps both records; they share a (source, text)
    // group and must land on the same side.
    let outcome = run(
        CurateConfig {
            val_fraction: 0.3,
            ..CurateConfig::default()
        },
        values.into(),
        &mut Vec::new(),
    );

    let split = &outcome.report.split;
    assert_eq!(outcome.report.accepted(), 120);
    assert_eq!(split.train_groups + split.val_groups, 60);
    assert_eq!(split.leakage_groups, 0);
    assert_eq!(outcome.val.len(), 36);
    for record in &outcome.val {
        let twins = outcome
            .val
            .iter()
            .filter(|r| r.input_text == record.input_text)
            .count();
        assert_eq!(twins, 2);
    }
}

#[test]
fn test_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let input_path = temp_dir.path().join("dataset.jsonl");
    let lines: Vec<String> = create_mixed_dataset().iter().map(Value::to_string).collect();
    std::fs::write(&input_path, lines.join("\n") + "\n{broken json\n").unwrap();

    let input = read_input(&input_path).unwrap();
    assert_eq!(input.malformed.len(), 1);

    let outcome = run(
        CurateConfig {
            val_fraction: 0.1,
            ..CurateConfig::default()
        },
        input,
        &mut Vec::new(),
    );
    assert_eq!(outcome.report.input_records, 301);
    assert_eq!(outcome.report.drops.ingest[&DropReason::MalformedJson], 1);

    let out = temp_dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    write_records_jsonl(out.join(TRAIN_FILE), &outcome.train).unwrap();
    write_records_jsonl(out.join(VAL_FILE), &outcome.val).unwrap();
    write_json_pretty(out.join(REPORT_FILE), &outcome.report).unwrap();

    let train: Vec<Record> = read_records_jsonl(out.join(TRAIN_FILE)).unwrap();
    let val: Vec<Record> = read_records_jsonl(out.join(VAL_FILE)).unwrap();
    assert_eq!(train, outcome.train);
    assert_eq!(val, outcome.val);

    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(out.join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(report["status"], "ready");
    assert_eq!(report["split"]["val_records"], 27);
}

#[test]
fn test_json_array_with_chat_records() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dataset.json");
    let records: Vec<Value> = (0..20)
        .map(|i| {
            json!({
                "task": "fluency",
                "messages": [
                    {"role": "user", "content": format!("The weather is lovely on day {i}.")},
                    {"role": "assistant", "content": "{\"fluency_score\": 0.9, \"reasoning\": \"fluent\"}"}
                ],
                "metadata": {"source": "WikiText"}
            })
        })
        .collect();
    std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

    let outcome = run(
        CurateConfig {
            val_fraction: 0.25,
            ..CurateConfig::default()
        },
        read_input(&path).unwrap(),
        &mut Vec::new(),
    );

    assert_eq!(outcome.report.accepted(), 20);
    assert_eq!(outcome.val.len(), 5);
    assert!(outcome.train.iter().all(|r| r.source == "WikiText"));
    assert_eq!(outcome.report.sources["WikiText"].train, 15);
}

#[test]
fn test_invalid_records_are_counted_by_reason() {
    let mut values = vec![
        json!("not an object"),
        json!({"category": "fluency", "input": "tiny", "output": {"fluency_score": 0.5, "reasoning": "r"}}),
        json!({"category": "fluency", "input": "Long enough input", "output": {"fluency_score": 3, "reasoning": "r"}}),
        json!({"category": "grammar", "input": "He goes home.", "output": {"corrected": "he goes home.", "explanation": "e"}}),
        json!({"category": "translation", "input": "Bonjour tout le monde"}),
    ];
    values.extend((0..10).map(|i| dialogue(&format!("Valid question number {i}"), "chat")));

    let outcome = run(
        CurateConfig {
            val_fraction: 0.2,
            ..CurateConfig::default()
        },
        values.into(),
        &mut Vec::new(),
    );

    let drops: &BTreeMap<DropReason, usize> = &outcome.report.drops.ingest;
    assert_eq!(drops[&DropReason::RecordNotObject], 1);
    assert_eq!(drops[&DropReason::InputTooShort], 1);
    assert_eq!(drops[&DropReason::ScoreOutOfRange], 1);
    assert_eq!(drops[&DropReason::CorrectionUnchanged], 1);
    assert_eq!(drops[&DropReason::UnknownCategory], 1);
    assert_eq!(outcome.report.accepted(), 10);
    assert_eq!(outcome.report.status, ReadinessStatus::Ready);
}
