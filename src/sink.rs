//! Batched, append-only NDJSON sink shared by all fetch workers.

use crate::normalize::CanonicalRecord;
use crate::util::append_with_backoff;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// A flush that did not reach the output file.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("open {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialize record for {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("write {records} records to {path} ({confirmed} records confirmed by earlier flushes)")]
    Write {
        path: PathBuf,
        records: usize,
        confirmed: u64,
        #[source]
        source: io::Error,
    },
}

impl SinkError {
    /// Records known to be on disk when this error happened.
    pub fn confirmed(&self) -> u64 {
        match self {
            SinkError::Write { confirmed, .. } => *confirmed,
            _ => 0,
        }
    }
}

/// Buffers canonical records and appends them in whole-line batches.
///
/// `append` may be called from any number of threads. Once the buffer reaches `threshold`
/// records it is swapped out and written with a single `write_all` while holding the file
/// lock, so concurrent flushes queue instead of interleaving.
pub struct BatchedSink {
    path: PathBuf,
    threshold: usize,
    buffer: Mutex<Vec<CanonicalRecord>>,
    file: Mutex<File>,
    written: AtomicU64,
    flushes: AtomicU64,
}

impl BatchedSink {
    /// Open `path` for appending (created if missing).
    pub fn open(path: &Path, threshold: usize) -> Result<Self, SinkError> {
        let file = append_with_backoff(path, 16, 50)
            .map_err(|source| SinkError::Open { path: path.to_path_buf(), source })?;
        let threshold = threshold.max(1);
        Ok(Self {
            path: path.to_path_buf(),
            threshold,
            buffer: Mutex::new(Vec::with_capacity(threshold)),
            file: Mutex::new(file),
            written: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Records confirmed written by completed flushes.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Records currently held in memory.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Buffer `records`, flushing when the threshold is reached.
    pub fn append(&self, records: Vec<CanonicalRecord>) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let ready = {
            let mut buf = self.buffer.lock();
            buf.extend(records);
            if buf.len() >= self.threshold {
                Some(std::mem::replace(&mut *buf, Vec::with_capacity(self.threshold)))
            } else {
                None
            }
        };
        match ready {
            Some(batch) => self.write_batch(batch),
            None => Ok(()),
        }
    }

    /// Flush whatever is buffered, regardless of the threshold.
    pub fn flush(&self) -> Result<(), SinkError> {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return Ok(());
        }
        self.write_batch(batch)
    }

    /// Flush the remainder and return the total number of records written.
    pub fn finish(self) -> Result<u64, SinkError> {
        self.flush()?;
        Ok(self.written())
    }

    fn write_batch(&self, batch: Vec<CanonicalRecord>) -> Result<(), SinkError> {
        let mut bytes = Vec::with_capacity(batch.len() * 512);
        for rec in &batch {
            rec.write_line(&mut bytes)
                .map_err(|source| SinkError::Encode { path: self.path.clone(), source })?;
        }

        let mut file = self.file.lock();
        let res = file.write_all(&bytes).and_then(|_| file.flush());
        if let Err(source) = res {
            let err = SinkError::Write {
                path: self.path.clone(),
                records: batch.len(),
                confirmed: self.written(),
                source,
            };
            tracing::error!(error = %err, "flush failed");
            return Err(err);
        }
        self.written.fetch_add(batch.len() as u64, Ordering::AcqRel);
        self.flushes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(records = batch.len(), total = self.written(), "flushed batch");
        Ok(())
    }
}
