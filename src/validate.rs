//! Record validation: decode raw object bytes and extract the records that satisfy the
//! required-field and score contract.

use crate::record::{Payload, Record, RecordError};
use serde_json::Value;

/// Why a whole key produced no output.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("empty")]
    Empty,
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Decode raw bytes into a payload. Whitespace-only content and a bare `[]` count as empty.
pub fn decode_payload(raw: &[u8]) -> Result<Payload, SkipReason> {
    let text = std::str::from_utf8(raw).map_err(|e| SkipReason::Decode(e.to_string()))?;
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "[]" {
        return Err(SkipReason::Empty);
    }
    let value: Value = serde_json::from_str(trimmed).map_err(|e| SkipReason::Decode(e.to_string()))?;
    Ok(Payload::from(value))
}

/// Extract every valid record from a payload.
///
/// A single object must pass on its own. In a batch, failing elements are dropped and the
/// batch fails only when no element passes; the reported reason prefers an element that had
/// all required keys over one that did not.
pub fn extract_records(payload: Payload) -> Result<Vec<Record>, RecordError> {
    match payload {
        Payload::Single(Value::Object(obj)) => Record::from_object(obj).map(|r| vec![r]),
        Payload::Single(_) => Err(RecordError::MissingKeys),
        Payload::Batch(items) => {
            let mut records = Vec::with_capacity(items.len());
            let mut reason = RecordError::MissingKeys;
            for item in items {
                let Value::Object(obj) = item else { continue };
                match Record::from_object(obj) {
                    Ok(r) => records.push(r),
                    Err(e) => {
                        if e.passed_key_check() && !reason.passed_key_check() {
                            reason = e;
                        }
                    }
                }
            }
            if records.is_empty() { Err(reason) } else { Ok(records) }
        }
    }
}

/// Whether a decoded JSON value holds at least one valid record.
pub fn validate(decoded: &Value) -> bool {
    match decoded {
        Value::Object(obj) => Record::from_object(obj.clone()).is_ok(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .any(|obj| Record::from_object(obj.clone()).is_ok()),
        _ => false,
    }
}

/// Decode and validate in one step, as the fetch workers do.
pub fn parse_records(raw: &[u8]) -> Result<Vec<Record>, SkipReason> {
    let payload = decode_payload(raw)?;
    Ok(extract_records(payload)?)
}
