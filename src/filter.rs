//! Downstream filter pass: select canonical records by score, uid and model, and project
//! them to a small flat shape.

use crate::json_text::write_spaced;
use crate::ndjson::{NdjsonReader, NdjsonWriter};
use crate::progress::make_count_progress;
use crate::record::Score;
use crate::util::init_tracing_once;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Score predicate of the filter pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScoreFilter {
    Zero,
    #[default]
    One,
    /// No score predicate (records still need a valid score).
    Both,
}

impl ScoreFilter {
    pub fn matches(self, score: Score) -> bool {
        match self {
            ScoreFilter::Zero => score == Score::Zero,
            ScoreFilter::One => score == Score::One,
            ScoreFilter::Both => true,
        }
    }
}

impl FromStr for ScoreFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" => Ok(ScoreFilter::Zero),
            "1" => Ok(ScoreFilter::One),
            "both" => Ok(ScoreFilter::Both),
            other => Err(anyhow!("invalid score filter `{other}` (expected 0, 1 or both)")),
        }
    }
}

impl fmt::Display for ScoreFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScoreFilter::Zero => "0",
            ScoreFilter::One => "1",
            ScoreFilter::Both => "both",
        })
    }
}

/// Predicates combined with AND.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterSpec {
    pub score: ScoreFilter,
    pub uid: Option<i64>,
    pub model: Option<String>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn score(mut self, score: ScoreFilter) -> Self {
        self.score = score;
        self
    }
    pub fn uid(mut self, uid: Option<i64>) -> Self {
        self.uid = uid;
        self
    }
    pub fn model(mut self, model: Option<impl Into<String>>) -> Self {
        self.model = model.map(Into::into);
        self
    }

    /// Human-readable criteria, e.g. `score == 1 AND uid == 7`; `None` when nothing filters.
    pub fn describe(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.score != ScoreFilter::Both {
            parts.push(format!("score == {}", self.score));
        }
        if let Some(uid) = self.uid {
            parts.push(format!("uid == {uid}"));
        }
        if let Some(model) = &self.model {
            parts.push(format!("model == '{model}'"));
        }
        if parts.is_empty() { None } else { Some(parts.join(" AND ")) }
    }
}

/// Flat projection of a canonical record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilteredRecord {
    pub uid: Value,
    pub env: Value,
    pub prompt: Value,
    pub response: Value,
    pub model: Value,
    pub score: u8,
    pub evaluation_extra_json: Value,
}

/// Why a line did not make it into the filtered output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Not JSON, or a section that should be an object is not one.
    Malformed,
    /// Score missing or outside `{0, 1}`.
    InvalidScore,
    /// One of env/prompt/response/model is missing or null.
    Incomplete,
    /// Valid, but a predicate did not match.
    Unmatched,
}

/// Parse one line and apply `spec`.
pub fn filter_line(line: &str, spec: &FilterSpec) -> Result<FilteredRecord, Rejection> {
    let row: Value = serde_json::from_str(line).map_err(|_| Rejection::Malformed)?;
    let row = row.as_object().ok_or(Rejection::Malformed)?;

    let evaluation = section(row, "evaluation")?;
    let challenge = section(row, "challenge")?;
    let response = section(row, "response")?;
    let miner = section(row, "miner")?;

    let field = |m: Option<&Map<String, Value>>, k: &str| -> Value {
        m.and_then(|m| m.get(k)).cloned().unwrap_or(Value::Null)
    };
    let env = field(challenge, "env");
    let prompt = field(challenge, "prompt");
    let resp = field(response, "response");
    let model = field(miner, "model");
    let uid = field(miner, "uid");
    let extra_json = field(evaluation, "extra_json");

    let score = evaluation
        .and_then(|m| m.get("score"))
        .and_then(Score::from_value)
        .ok_or(Rejection::InvalidScore)?;

    if env.is_null() || prompt.is_null() || resp.is_null() || model.is_null() {
        return Err(Rejection::Incomplete);
    }
    if !spec.score.matches(score) {
        return Err(Rejection::Unmatched);
    }
    if let Some(want) = spec.uid {
        if uid.as_i64() != Some(want) {
            return Err(Rejection::Unmatched);
        }
    }
    if let Some(want) = &spec.model {
        if model.as_str() != Some(want.as_str()) {
            return Err(Rejection::Unmatched);
        }
    }

    Ok(FilteredRecord {
        uid,
        env,
        prompt,
        response: resp,
        model,
        score: score.as_u8(),
        evaluation_extra_json: extra_json,
    })
}

/// A missing section reads as empty; a present non-object section makes the line malformed.
fn section<'a>(row: &'a Map<String, Value>, key: &str) -> Result<Option<&'a Map<String, Value>>, Rejection> {
    match row.get(key) {
        None => Ok(None),
        Some(Value::Object(m)) => Ok(Some(m)),
        Some(_) => Err(Rejection::Malformed),
    }
}

/// Counts from one filter pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterSummary {
    pub lines: u64,
    pub kept: u64,
    pub malformed: u64,
    pub output: PathBuf,
}

/// Stream `input` through `spec` and write matching projections to `output`.
/// The output is staged next to its destination and promoted once complete.
pub fn filter_file(
    input: &Path,
    output: &Path,
    spec: &FilterSpec,
    progress: bool,
    read_buf: usize,
    write_buf: usize,
) -> Result<FilterSummary> {
    init_tracing_once();
    match spec.describe() {
        Some(criteria) => tracing::info!("Filtering with criteria: {}", criteria),
        None => tracing::info!("Extracting all data (no score filtering)"),
    }

    let pb = if progress {
        let total = count_lines(input, read_buf)?;
        Some(make_count_progress(total, "Filtering"))
    } else {
        None
    };

    let staging = staging_path(output);
    let mut reader = NdjsonReader::open(input, read_buf).with_context(|| format!("open {}", input.display()))?;
    let mut writer = NdjsonWriter::create(&staging, write_buf).with_context(|| format!("create {}", staging.display()))?;

    let mut summary = FilterSummary { output: output.to_path_buf(), ..Default::default() };
    let mut line = String::with_capacity(16 * 1024);
    let mut out = Vec::with_capacity(4 * 1024);
    while reader.read_line(&mut line)? > 0 {
        if let Some(pb) = &pb { pb.inc(1); }
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;
        match filter_line(&line, spec) {
            Ok(rec) => {
                out.clear();
                write_spaced(&mut out, &rec, false)?;
                writer.write_bytes_line(&out)?;
                summary.kept += 1;
            }
            Err(Rejection::Malformed) => summary.malformed += 1,
            Err(_) => {}
        }
    }
    writer.finish_atomic(output)?;
    if let Some(pb) = pb { pb.finish_with_message("done"); }

    tracing::info!(lines = summary.lines, kept = summary.kept, malformed = summary.malformed, "Number of rows in filtered dataset: {}", summary.kept);
    Ok(summary)
}

fn count_lines(path: &Path, read_buf: usize) -> Result<u64> {
    let mut reader = NdjsonReader::open(path, read_buf).with_context(|| format!("open {}", path.display()))?;
    let mut line = String::new();
    let mut n = 0u64;
    while reader.read_line(&mut line)? > 0 {
        n += 1;
    }
    Ok(n)
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".inprogress");
    output.with_file_name(name)
}
