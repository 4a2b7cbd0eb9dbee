#[path = "common/mod.rs"]
mod common;

use common::result_record;
use results_etl::{decode_payload, extract_records, parse_records, validate, Payload, RecordError, Score, SkipReason};
use serde_json::json;

/// Scores must be native numbers equal to 0 or 1; everything else is rejected.
#[test]
fn score_domain_accepts_only_zero_and_one() {
    for ok in [json!(0), json!(1), json!(0.0), json!(1.0)] {
        assert!(validate(&result_record(1, ok.clone())), "score {ok} should be valid");
    }
    for bad in [json!(0.5), json!("1"), json!(2), json!(-1), json!(null), json!(true)] {
        assert!(!validate(&result_record(1, bad.clone())), "score {bad} should be rejected");
    }

    let mut no_score = result_record(1, json!(1));
    no_score["evaluation"].as_object_mut().unwrap().remove("score");
    assert!(!validate(&no_score), "missing score should be rejected");

    assert_eq!(Score::from_value(&json!(1.0)), Some(Score::One));
    assert_eq!(Score::from_value(&json!(u64::MAX)), None);
}

#[test]
fn missing_required_key_is_rejected() {
    for key in ["version", "miner", "challenge", "response", "evaluation"] {
        let mut rec = result_record(1, json!(1));
        rec.as_object_mut().unwrap().remove(key);
        assert!(!validate(&rec), "record without `{key}` should be invalid");
    }
    assert!(!validate(&json!("just a string")));
    assert!(!validate(&json!(42)));
}

#[test]
fn non_object_sections_are_rejected() {
    let mut rec = result_record(1, json!(1));
    rec["evaluation"] = json!([1]);
    let err = extract_records(Payload::Single(rec)).unwrap_err();
    assert_eq!(err, RecordError::NotAnObject("evaluation"));
}

/// Arrays keep every valid element and drop the rest; the key only fails when nothing survives.
#[test]
fn array_payload_extracts_valid_elements_only() {
    let payload = json!([
        result_record(1, json!(1)),
        result_record(2, json!(0.5)),
        {"evaluation": {"score": 1}},
        "noise",
        result_record(3, json!(0)),
    ]);
    assert!(validate(&payload));

    let records = extract_records(Payload::from(payload)).unwrap();
    let uids: Vec<i64> = records.iter().map(|r| r.miner["uid"].as_i64().unwrap()).collect();
    assert_eq!(uids, vec![1, 3]);
}

#[test]
fn array_without_valid_elements_reports_best_reason() {
    let only_bad_scores = json!([{"evaluation": {"score": 1}}, result_record(2, json!(7))]);
    assert!(!validate(&only_bad_scores));
    assert_eq!(
        extract_records(Payload::from(only_bad_scores)).unwrap_err(),
        RecordError::InvalidScore("7".to_string())
    );

    let only_incomplete = json!([{"version": 1}, {"miner": {}}]);
    assert_eq!(extract_records(Payload::from(only_incomplete)).unwrap_err(), RecordError::MissingKeys);
}

#[test]
fn empty_and_undecodable_content() {
    assert_eq!(decode_payload(b"").unwrap_err(), SkipReason::Empty);
    assert_eq!(decode_payload(b"  \n\t ").unwrap_err(), SkipReason::Empty);
    assert_eq!(decode_payload(b" [] \n").unwrap_err(), SkipReason::Empty);
    assert!(matches!(decode_payload(b"{\"version\": ").unwrap_err(), SkipReason::Decode(_)));
    assert!(matches!(decode_payload(&[0xff, 0xfe, b'{']).unwrap_err(), SkipReason::Decode(_)));

    let err = parse_records(br#"{"evaluation":{"score":2}}"#).unwrap_err();
    assert_eq!(err, SkipReason::Record(RecordError::MissingKeys));
    assert_eq!(err.to_string(), "missing required keys");
}

#[test]
fn unknown_top_level_fields_are_kept() {
    let mut rec = result_record(4, json!(1));
    rec["block"] = json!(5_000_123);
    let records = parse_records(rec.to_string().as_bytes()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].rest.get("block"), Some(&json!(5_000_123)));
    assert_eq!(records[0].score(), Ok(Score::One));
}
