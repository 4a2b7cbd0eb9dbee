//! Record model: decoded payload shape, the strict five-field record, and the score domain.

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Top-level fields every result record must carry.
pub const REQUIRED_KEYS: [&str; 5] = ["version", "miner", "challenge", "response", "evaluation"];

/// Why a single decoded record was rejected.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("missing required keys")]
    MissingKeys,
    /// Carries the offending value rendered as JSON (`null` when absent).
    #[error("invalid score ({0})")]
    InvalidScore(String),
    #[error("`{0}` is not an object")]
    NotAnObject(&'static str),
}

impl RecordError {
    /// True when the record had every required key and failed a later check.
    pub fn passed_key_check(&self) -> bool {
        !matches!(self, RecordError::MissingKeys)
    }
}

/// Closed score domain of an evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Score {
    Zero,
    One,
}

impl Score {
    /// Coerce a JSON value into the score domain. Only native numbers qualify:
    /// `0`, `1`, `0.0` and `1.0` are accepted; strings, booleans, `0.5` and null are not.
    pub fn from_value(v: &Value) -> Option<Score> {
        let n = v.as_number()?;
        if let Some(i) = n.as_i64() {
            return match i {
                0 => Some(Score::Zero),
                1 => Some(Score::One),
                _ => None,
            };
        }
        if n.as_u64().is_some() {
            return None;
        }
        match n.as_f64() {
            Some(f) if f == 0.0 => Some(Score::Zero),
            Some(f) if f == 1.0 => Some(Score::One),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Score::Zero => 0,
            Score::One => 1,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// A result record with its required sections split out.
///
/// `miner`, `challenge` and `evaluation` are addressed field-by-field downstream, so they
/// must be objects. `version` and `response` are carried opaquely. Any other top-level
/// field lands in `rest` and is written back unchanged.
///
/// Top-level keys are written in the order they were decoded in. Only objects that pass
/// `from_object` deserialize into a `Record`.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub version: Value,
    pub miner: Map<String, Value>,
    pub challenge: Map<String, Value>,
    pub response: Value,
    pub evaluation: Map<String, Value>,
    pub rest: Map<String, Value>,
    key_order: Vec<String>,
}

impl Record {
    /// Split a decoded object into a `Record`, checking the required-field and score contract.
    pub fn from_object(mut obj: Map<String, Value>) -> Result<Record, RecordError> {
        if !REQUIRED_KEYS.iter().all(|k| obj.contains_key(*k)) {
            return Err(RecordError::MissingKeys);
        }
        let key_order: Vec<String> = obj.keys().cloned().collect();
        let version = obj.shift_remove("version").unwrap_or(Value::Null);
        let miner = take_object(&mut obj, "miner")?;
        let challenge = take_object(&mut obj, "challenge")?;
        let response = obj.shift_remove("response").unwrap_or(Value::Null);
        let evaluation = take_object(&mut obj, "evaluation")?;

        let record = Record { version, miner, challenge, response, evaluation, rest: obj, key_order };
        record.score()?;
        Ok(record)
    }

    /// The evaluation score, coerced into the closed domain.
    pub fn score(&self) -> Result<Score, RecordError> {
        match self.evaluation.get("score") {
            Some(v) => Score::from_value(v).ok_or_else(|| RecordError::InvalidScore(v.to_string())),
            None => Err(RecordError::InvalidScore("null".to_string())),
        }
    }

    /// Top-level keys in write order: decoded order first, then keys added to `rest` since.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .key_order
            .iter()
            .map(String::as_str)
            .filter(|k| REQUIRED_KEYS.contains(k) || self.rest.contains_key(*k))
            .collect();
        for k in REQUIRED_KEYS.iter().copied().chain(self.rest.keys().map(String::as_str)) {
            if !keys.contains(&k) {
                keys.push(k);
            }
        }
        keys
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let keys = self.keys();
        let mut map = serializer.serialize_map(Some(keys.len()))?;
        for key in keys {
            match key {
                "version" => map.serialize_entry(key, &self.version)?,
                "miner" => map.serialize_entry(key, &self.miner)?,
                "challenge" => map.serialize_entry(key, &self.challenge)?,
                "response" => map.serialize_entry(key, &self.response)?,
                "evaluation" => map.serialize_entry(key, &self.evaluation)?,
                other => {
                    if let Some(v) = self.rest.get(other) {
                        map.serialize_entry(other, v)?;
                    }
                }
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let obj = Map::<String, Value>::deserialize(deserializer)?;
        Record::from_object(obj).map_err(de::Error::custom)
    }
}

fn take_object(obj: &mut Map<String, Value>, key: &'static str) -> Result<Map<String, Value>, RecordError> {
    match obj.shift_remove(key) {
        Some(Value::Object(m)) => Ok(m),
        _ => Err(RecordError::NotAnObject(key)),
    }
}

/// Decoded shape of a raw object: one record or a list of candidates.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Single(Value),
    Batch(Vec<Value>),
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        match v {
            Value::Array(items) => Payload::Batch(items),
            other => Payload::Single(other),
        }
    }
}
