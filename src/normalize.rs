//! Canonicalization of validated records: free-form sub-structures become JSON strings so
//! every output line shares one flat schema.

use crate::json_text::{value_to_spaced_string, write_spaced};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;

/// A record after normalization; the only shape the sink accepts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRecord(Record);

impl CanonicalRecord {
    pub fn as_record(&self) -> &Record {
        &self.0
    }

    pub fn into_record(self) -> Record {
        self.0
    }

    /// Append this record as one newline-terminated line.
    pub fn write_line<W: Write>(&self, mut w: W) -> serde_json::Result<()> {
        write_spaced(&mut w, &self.0, false)?;
        w.write_all(b"\n").map_err(serde_json::Error::io)
    }
}

/// Rewrite a validated record into canonical form. The input is left untouched.
///
/// - `challenge.extra` becomes `challenge.extra_json`
/// - a non-empty `evaluation.extra` becomes `evaluation.extra_json`; an empty one is dropped
/// - a non-null `miner.chute` becomes `miner.chute_json`
/// - `evaluation.score` becomes the integer `0` or `1`
///
/// Applying it to an already canonical record changes nothing. Fails only if an embedded
/// value cannot be serialized.
pub fn normalize(record: &Record) -> serde_json::Result<CanonicalRecord> {
    let mut out = record.clone();

    if let Some(extra) = out.challenge.shift_remove("extra") {
        embed(&mut out.challenge, "extra_json", &extra)?;
    }

    if let Some(extra) = out.evaluation.shift_remove("extra") {
        if !is_empty_value(&extra) {
            embed(&mut out.evaluation, "extra_json", &extra)?;
        }
    }

    if matches!(out.miner.get("chute"), Some(v) if !v.is_null()) {
        if let Some(chute) = out.miner.shift_remove("chute") {
            embed(&mut out.miner, "chute_json", &chute)?;
        }
    }

    if let Ok(score) = out.score() {
        out.evaluation.insert("score".to_string(), Value::from(score.as_u8()));
    }

    Ok(CanonicalRecord(out))
}

fn embed(section: &mut Map<String, Value>, key: &str, value: &Value) -> serde_json::Result<()> {
    section.insert(key.to_string(), Value::String(value_to_spaced_string(value, true)?));
    Ok(())
}

/// Falsy JSON: null, false, zero, and empty strings, arrays or objects.
fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !*b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}
