#![allow(dead_code)]

use anyhow::{anyhow, Result};
use results_etl::{ListPage, MemoryStore, ObjectStore};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read a JSONL file into a vector of `serde_json::Value` (skips empty lines).
pub fn read_jsonl_values(path: &Path) -> Vec<Value> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines()
        .map(|l| l.unwrap())
        .filter(|s| !s.is_empty())
        .map(|s| serde_json::from_str(&s).unwrap())
        .collect()
}

/// Read a text file line-by-line into strings.
pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// A complete, valid result record for miner `uid` with the given score.
pub fn result_record(uid: i64, score: Value) -> Value {
    json!({
        "version": "1.0",
        "miner": {
            "uid": uid,
            "hotkey": format!("5Hk{uid}"),
            "model": format!("org/affine-model-{uid}"),
            "chute": {"name": format!("chute-{uid}"), "gpus": ["h100"]}
        },
        "challenge": {
            "env": "SAT",
            "prompt": "Solve x",
            "extra": {"clauses": [[1, -2], [2, 3]], "n": 3}
        },
        "response": {"response": "x = 1", "latency_seconds": 1.5, "success": true},
        "evaluation": {"score": score, "extra": {"expected": "x = 1"}}
    })
}

/// Store wrapper whose reads fail for every key under `fail_prefix`.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_prefix: String,
}

impl ObjectStore for FlakyStore {
    fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        self.inner.list_page(prefix, token)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        if key.starts_with(&self.fail_prefix) {
            return Err(anyhow!("simulated timeout fetching {key}"));
        }
        self.inner.get(key)
    }
}

/// Store whose listing always fails.
pub struct BrokenListingStore;

impl ObjectStore for BrokenListingStore {
    fn list_page(&self, _prefix: &str, _token: Option<&str>) -> Result<ListPage> {
        Err(anyhow!("listing unavailable"))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        Err(anyhow!("unexpected get for {key}"))
    }
}

/// Store with a declared connection ceiling.
pub struct CappedStore {
    pub inner: MemoryStore,
    pub cap: usize,
}

impl ObjectStore for CappedStore {
    fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        self.inner.list_page(prefix, token)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(key)
    }

    fn max_connections(&self) -> Option<usize> {
        Some(self.cap)
    }
}
