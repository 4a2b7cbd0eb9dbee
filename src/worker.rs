//! Fetch worker pool: a bounded rayon pool that turns keys into canonical records.

use crate::normalize::{normalize, CanonicalRecord};
use crate::sink::{BatchedSink, SinkError};
use crate::store::{ObjectMeta, ObjectStore};
use crate::validate::{parse_records, SkipReason};
use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;

/// A key that produced no output, and why.
#[derive(Clone, Debug, PartialEq)]
pub struct Skip {
    pub key: String,
    pub reason: SkipReason,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.reason, self.key)
    }
}

/// Result of one unit of work; exactly one per dispatched key.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyOutcome {
    Processed { key: String, records: usize },
    Skipped(Skip),
}

/// Fetch, validate and normalize a single key. Never retries.
pub fn process_key(store: &dyn ObjectStore, key: &str) -> Result<Vec<CanonicalRecord>, SkipReason> {
    let raw = store.get(key).map_err(|e| SkipReason::Fetch(format!("{e:#}")))?;
    let records = parse_records(&raw)?;
    records
        .iter()
        .map(normalize)
        .collect::<serde_json::Result<Vec<_>>>()
        .map_err(|e| SkipReason::Encode(e.to_string()))
}

pub struct FetchPool {
    pool: ThreadPool,
    concurrency: usize,
}

impl FetchPool {
    /// Build a pool with `concurrency` workers, clamped to the store's connection ceiling.
    pub fn new(concurrency: usize, store: &dyn ObjectStore) -> Result<Self> {
        let mut n = concurrency.max(1);
        if let Some(cap) = store.max_connections() {
            if n > cap {
                tracing::warn!(requested = n, capacity = cap, "concurrency exceeds store connection capacity; clamping");
                n = cap;
            }
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("fetch-{i}"))
            .build()
            .context("build fetch worker pool")?;
        Ok(Self { pool, concurrency: n })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process one dispatch batch and wait for every key in it.
    ///
    /// Records go straight to `sink`; only a failed flush aborts the batch. Outcomes come
    /// back in key order for the coordinator to tally.
    pub fn run_batch(
        &self,
        store: &dyn ObjectStore,
        keys: &[ObjectMeta],
        sink: &BatchedSink,
    ) -> Result<Vec<KeyOutcome>, SinkError> {
        self.pool.install(|| {
            keys.par_iter()
                .map(|obj| match process_key(store, &obj.key) {
                    Ok(records) => {
                        let n = records.len();
                        sink.append(records)?;
                        Ok(KeyOutcome::Processed { key: obj.key.clone(), records: n })
                    }
                    Err(reason) => {
                        tracing::debug!(key = %obj.key, %reason, "skipped");
                        Ok(KeyOutcome::Skipped(Skip { key: obj.key.clone(), reason }))
                    }
                })
                .collect::<Result<Vec<_>, SinkError>>()
        })
    }
}
