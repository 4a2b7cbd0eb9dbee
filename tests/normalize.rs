#[path = "common/mod.rs"]
mod common;

use common::result_record;
use results_etl::{normalize, parse_records, value_to_spaced_string, CanonicalRecord, Record};
use serde_json::{json, Value};

fn record(v: Value) -> Record {
    let mut records = parse_records(v.to_string().as_bytes()).unwrap();
    assert_eq!(records.len(), 1);
    records.remove(0)
}

#[test]
fn nested_fields_become_json_strings() {
    let rec = record(result_record(9, json!(1.0)));
    let canon = normalize(&rec).unwrap().into_record();

    assert!(!canon.challenge.contains_key("extra"));
    assert_eq!(canon.challenge["extra_json"], json!(r#"{"clauses": [[1, -2], [2, 3]], "n": 3}"#));

    assert!(!canon.evaluation.contains_key("extra"));
    assert_eq!(canon.evaluation["extra_json"], json!(r#"{"expected": "x = 1"}"#));

    assert!(!canon.miner.contains_key("chute"));
    assert_eq!(canon.miner["chute_json"], json!(r#"{"name": "chute-9", "gpus": ["h100"]}"#));

    assert_eq!(canon.evaluation["score"], json!(1));
    assert!(canon.evaluation["score"].is_u64(), "score should be an integer after normalization");
}

#[test]
fn empty_evaluation_extra_is_dropped_without_replacement() {
    for empty in [json!({}), json!([]), json!(null), json!(""), json!(0), json!(false)] {
        let mut v = result_record(1, json!(0));
        v["evaluation"]["extra"] = empty.clone();
        let canon = normalize(&record(v)).unwrap().into_record();
        assert!(!canon.evaluation.contains_key("extra"), "extra {empty} should be removed");
        assert!(!canon.evaluation.contains_key("extra_json"), "extra {empty} should not produce extra_json");
    }
}

#[test]
fn null_chute_is_left_alone() {
    let mut v = result_record(1, json!(1));
    v["miner"]["chute"] = Value::Null;
    let canon = normalize(&record(v)).unwrap().into_record();
    assert_eq!(canon.miner.get("chute"), Some(&Value::Null));
    assert!(!canon.miner.contains_key("chute_json"));
}

#[test]
fn normalize_is_idempotent_and_pure() {
    let rec = record(result_record(5, json!(0.0)));
    let before = rec.clone();

    let once = normalize(&rec).unwrap();
    let twice = normalize(once.as_record()).unwrap();
    assert_eq!(once, twice);
    assert_eq!(rec, before, "normalize must not mutate its input");

    // Key order is stable too, so the written lines are byte-identical.
    let mut a = Vec::new();
    let mut b = Vec::new();
    once.write_line(&mut a).unwrap();
    twice.write_line(&mut b).unwrap();
    assert_eq!(a, b);
}

#[test]
fn embedded_json_escapes_non_ascii() {
    let v = json!({"city": "Zürich", "emoji": "🦀", "quote": "a\"b"});
    assert_eq!(
        value_to_spaced_string(&v, true).unwrap(),
        r#"{"city": "Z\u00fcrich", "emoji": "\ud83e\udd80", "quote": "a\"b"}"#
    );
    assert_eq!(value_to_spaced_string(&v, false).unwrap(), r#"{"city": "Zürich", "emoji": "🦀", "quote": "a\"b"}"#);
}

/// Written lines decode back to a canonical record with no free-form nested payloads left.
#[test]
fn written_line_round_trips_flat() {
    let mut v = result_record(2, json!(1));
    v["challenge"]["extra"] = json!({"unicode": "π"});
    let canon = normalize(&record(v)).unwrap();

    let mut line = Vec::new();
    canon.write_line(&mut line).unwrap();
    assert_eq!(line.last(), Some(&b'\n'));
    assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);

    let back: CanonicalRecord = serde_json::from_slice(&line).unwrap();
    assert_eq!(back, canon);
    let r = back.as_record();
    assert!(r.challenge["extra_json"].is_string());
    assert_eq!(r.challenge["extra_json"], json!(r#"{"unicode": "\u03c0"}"#));
    assert!(!r.challenge.contains_key("extra"));
    assert!(!r.evaluation.contains_key("extra"));
    assert!(!r.miner.contains_key("chute"));
}
