#[path = "common/mod.rs"]
mod common;

use common::{read_jsonl_values, read_lines, result_record};
use results_etl::{filter_file, filter_line, normalize, parse_records, FilterSpec, Rejection, ScoreFilter};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

fn canonical_line(v: Value) -> String {
    let recs = parse_records(v.to_string().as_bytes()).unwrap();
    let mut buf = Vec::new();
    normalize(&recs[0]).unwrap().write_line(&mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

fn write_input(path: &Path, rows: &[Value]) {
    let text: String = rows.iter().cloned().map(canonical_line).collect();
    fs::write(path, text).unwrap();
}

fn run(input: &Path, output: &Path, spec: &FilterSpec) -> results_etl::FilterSummary {
    filter_file(input, output, spec, false, 8 * 1024, 8 * 1024).unwrap()
}

#[test]
fn keeps_score_one_by_default() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("combined.jsonl");
    let output = tmp.path().join("filtered.jsonl");
    write_input(
        &input,
        &[result_record(1, json!(1)), result_record(1, json!(0)), result_record(2, json!(1))],
    );

    let summary = run(&input, &output, &FilterSpec::new());
    assert_eq!(summary.lines, 3);
    assert_eq!(summary.kept, 2);
    assert_eq!(summary.malformed, 0);

    let uids: Vec<i64> = read_jsonl_values(&output).iter().map(|v| v["uid"].as_i64().unwrap()).collect();
    assert_eq!(uids, vec![1, 2]);
}

#[test]
fn uid_model_and_score_predicates_combine() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("combined.jsonl");
    let output = tmp.path().join("filtered.jsonl");
    write_input(
        &input,
        &[
            result_record(1, json!(1)),
            result_record(1, json!(0)),
            result_record(2, json!(0)),
            result_record(3, json!(1)),
        ],
    );

    let both_for_uid1 = FilterSpec::new().score(ScoreFilter::Both).uid(Some(1));
    assert_eq!(run(&input, &output, &both_for_uid1).kept, 2);

    let zeros = FilterSpec::new().score(ScoreFilter::Zero);
    assert_eq!(run(&input, &output, &zeros).kept, 2);

    let model = FilterSpec::new().score(ScoreFilter::Both).model(Some("org/affine-model-3"));
    let summary = run(&input, &output, &model);
    assert_eq!(summary.kept, 1);
    assert_eq!(read_jsonl_values(&output)[0]["model"], json!("org/affine-model-3"));

    let nothing = FilterSpec::new().uid(Some(2));
    assert_eq!(run(&input, &output, &nothing).kept, 0);
    assert!(read_lines(&output).is_empty());
}

/// Output rows carry exactly the projected fields, in a fixed order.
#[test]
fn projection_shape() {
    let line = canonical_line(result_record(7, json!(1)));
    let rec = filter_line(line.trim_end(), &FilterSpec::new()).unwrap();
    let mut buf = Vec::new();
    results_etl::write_spaced(&mut buf, &rec, false).unwrap();
    assert_eq!(
        String::from_utf8(buf).unwrap(),
        concat!(
            r#"{"uid": 7, "env": "SAT", "prompt": "Solve x", "response": "x = 1", "#,
            r#""model": "org/affine-model-7", "score": 1, "#,
            r#""evaluation_extra_json": "{\"expected\": \"x = 1\"}"}"#
        )
    );
}

#[test]
fn rows_missing_projected_fields_are_dropped() {
    let mut no_prompt = result_record(1, json!(1));
    no_prompt["challenge"].as_object_mut().unwrap().remove("prompt");
    let line = canonical_line(no_prompt);
    assert_eq!(filter_line(&line, &FilterSpec::new()), Err(Rejection::Incomplete));

    let mut null_model = result_record(1, json!(1));
    null_model["miner"]["model"] = Value::Null;
    assert_eq!(filter_line(&canonical_line(null_model), &FilterSpec::new()), Err(Rejection::Incomplete));

    let mut no_uid = result_record(1, json!(1));
    no_uid["miner"].as_object_mut().unwrap().remove("uid");
    let rec = filter_line(&canonical_line(no_uid), &FilterSpec::new()).unwrap();
    assert_eq!(rec.uid, Value::Null);
}

#[test]
fn malformed_and_invalid_lines_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("combined.jsonl");
    let output = tmp.path().join("filtered.jsonl");

    let mut text = canonical_line(result_record(1, json!(1)));
    text.push_str("{not json\n");
    text.push('\n');
    text.push_str("{\"miner\": 5}\r\n");
    text.push_str("{\"evaluation\": {\"score\": 3}, \"challenge\": {}, \"response\": {}, \"miner\": {}}\n");
    text.push_str(&canonical_line(result_record(2, json!(1))));
    fs::write(&input, text).unwrap();

    let summary = run(&input, &output, &FilterSpec::new());
    assert_eq!(summary.lines, 5);
    assert_eq!(summary.kept, 2);
    assert_eq!(summary.malformed, 2);
    assert_eq!(
        filter_line(r#"{"evaluation": {"score": 3}}"#, &FilterSpec::new()),
        Err(Rejection::InvalidScore)
    );
    assert!(!tmp.path().join("filtered.jsonl.inprogress").exists());
}

#[test]
fn score_filter_parsing_and_description() {
    assert_eq!("0".parse::<ScoreFilter>().unwrap(), ScoreFilter::Zero);
    assert_eq!("BOTH".parse::<ScoreFilter>().unwrap(), ScoreFilter::Both);
    assert!("2".parse::<ScoreFilter>().is_err());

    let spec = FilterSpec::new().uid(Some(7)).model(Some("m"));
    assert_eq!(spec.describe().as_deref(), Some("score == 1 AND uid == 7 AND model == 'm'"));
    assert_eq!(FilterSpec::new().score(ScoreFilter::Both).describe(), None);
}

#[test]
fn missing_input_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let res = filter_file(
        &tmp.path().join("absent.jsonl"),
        &tmp.path().join("out.jsonl"),
        &FilterSpec::new(),
        false,
        8 * 1024,
        8 * 1024,
    );
    assert!(res.is_err());
}
