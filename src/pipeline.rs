use crate::config::EtlOptions;
use crate::enumerate::KeyEnumerator;
use crate::filter::{filter_file, FilterSpec, FilterSummary};
use crate::mem::maybe_throttle_low_memory;
use crate::progress::make_count_progress;
use crate::sink::{BatchedSink, SinkError};
use crate::store::{ObjectMeta, ObjectStore};
use crate::util::{init_tracing_once, remove_with_backoff};
use crate::worker::{FetchPool, KeyOutcome, Skip};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{} already exists; confirm overwrite to replace it", .0.display())]
    OutputExists(PathBuf),
    #[error("listing keys under `{prefix}` failed")]
    Enumeration {
        prefix: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Setup(#[from] anyhow::Error),
}

/// Bounded sample of skip reasons plus the full count.
#[derive(Clone, Debug, Default)]
pub struct ErrorLog {
    limit: usize,
    total: u64,
    sample: Vec<Skip>,
}

impl ErrorLog {
    pub fn new(limit: usize) -> Self {
        Self { limit, total: 0, sample: Vec::with_capacity(limit.min(64)) }
    }

    pub fn record(&mut self, skip: Skip) {
        self.total += 1;
        if self.sample.len() < self.limit {
            self.sample.push(skip);
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn sample(&self) -> &[Skip] {
        &self.sample
    }
}

const SHOW_SAMPLE_UP_TO: u64 = 10;

/// Final report of a pipeline run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub keys: u64,
    pub processed: u64,
    pub skipped: u64,
    pub records_written: u64,
    pub errors: ErrorLog,
    pub output: PathBuf,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processing complete in {:.1} seconds", self.elapsed.as_secs_f64())?;
        writeln!(f, "Successfully processed: {} files", self.processed)?;
        writeln!(f, "Errors/skipped: {} files", self.skipped)?;
        writeln!(f, "Records written: {}", self.records_written)?;
        // A long tail of skips is summarized by the count alone.
        if !self.errors.sample().is_empty() && self.errors.total() <= SHOW_SAMPLE_UP_TO {
            writeln!(f, "First few errors:")?;
            for skip in self.errors.sample() {
                writeln!(f, "  - {skip}")?;
            }
        }
        write!(f, "Output saved to: {}", self.output.display())
    }
}

/// Entry point: configure with the builder methods, then `run` against a store.
#[derive(Clone, Default)]
pub struct ResultsEtl {
    pub(crate) opts: EtlOptions,
}

impl ResultsEtl {
    pub fn new() -> Self {
        Self { opts: EtlOptions::default() }
    }

    pub fn with_options(opts: EtlOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &EtlOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self { self.opts = self.opts.with_prefix(prefix); self }
    pub fn key_suffix(mut self, suffix: Option<impl Into<String>>) -> Self { self.opts = self.opts.with_key_suffix(suffix); self }
    pub fn output(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_output(path); self }
    pub fn overwrite(mut self, yes: bool) -> Self { self.opts = self.opts.with_overwrite(yes); self }
    pub fn concurrency(mut self, n: usize) -> Self { self.opts = self.opts.with_concurrency(n); self }
    pub fn dispatch_batch(mut self, n: usize) -> Self { self.opts = self.opts.with_dispatch_batch(n); self }
    pub fn write_batch(mut self, n: usize) -> Self { self.opts = self.opts.with_write_batch(n); self }
    pub fn error_sample(mut self, n: usize) -> Self { self.opts = self.opts.with_error_sample(n); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn low_memory_threshold(mut self, frac: f64) -> Self { self.opts = self.opts.with_low_memory_threshold(frac); self }
    pub fn io_read_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_read_buffer(bytes); self }
    pub fn io_write_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_write_buffer(bytes); self }

    /// True when the configured output already holds data from an earlier run.
    pub fn output_has_data(&self) -> bool {
        output_has_data(&self.opts.output)
    }

    /// Fetch every key under the prefix, normalize valid records and append them to the
    /// output file. Skipped keys are counted, never fatal; listing and write failures are.
    pub fn run(&self, store: &dyn ObjectStore) -> Result<RunSummary, PipelineError> {
        init_tracing_once();
        let started = Instant::now();
        let opts = &self.opts;

        if output_has_data(&opts.output) && !opts.overwrite {
            return Err(PipelineError::OutputExists(opts.output.clone()));
        }

        tracing::info!(prefix = %opts.prefix, "fetching key list");
        let keys: Vec<ObjectMeta> = KeyEnumerator::new(store, opts.prefix.clone())
            .with_suffix(opts.key_suffix.clone())
            .collect::<anyhow::Result<_>>()
            .map_err(|source| PipelineError::Enumeration { prefix: opts.prefix.clone(), source })?;
        tracing::info!("Found {} objects to process.", keys.len());

        let pool = FetchPool::new(opts.concurrency, store)?;
        // Devices and pipes are appended to as-is; only a regular file is reset.
        if fs::metadata(&opts.output).map(|m| m.is_file()).unwrap_or(false) {
            remove_with_backoff(&opts.output, 16, 50)?;
        }
        if let Some(dir) = opts.output.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(anyhow::Error::from)?;
        }
        let sink = BatchedSink::open(&opts.output, opts.write_batch)?;

        let pb = if opts.progress {
            Some(make_count_progress(keys.len() as u64, opts.progress_label.as_deref().unwrap_or("Processing objects")))
        } else {
            None
        };

        let mut processed = 0u64;
        let mut errors = ErrorLog::new(opts.error_sample);

        for (i, batch) in keys.chunks(opts.dispatch_batch).enumerate() {
            maybe_throttle_low_memory(opts.low_memory_threshold);

            let outcomes = pool.run_batch(store, batch, &sink)?;
            for outcome in outcomes {
                match outcome {
                    KeyOutcome::Processed { .. } => processed += 1,
                    KeyOutcome::Skipped(skip) => errors.record(skip),
                }
            }

            if let Some(pb) = &pb { pb.inc(batch.len() as u64); }
            tracing::debug!(batch = i + 1, processed, skipped = errors.total(), written = sink.written(), "batch complete");
        }

        let records_written = sink.finish()?;
        if let Some(pb) = pb { pb.finish_with_message("done"); }

        let summary = RunSummary {
            elapsed: started.elapsed(),
            keys: keys.len() as u64,
            processed,
            skipped: errors.total(),
            records_written,
            errors,
            output: opts.output.clone(),
        };
        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            records = summary.records_written,
            elapsed_s = summary.elapsed.as_secs_f64(),
            "run complete"
        );
        Ok(summary)
    }

    /// Run the filter pass over this pipeline's output file.
    pub fn filter_to(&self, out_path: &Path, spec: &FilterSpec) -> anyhow::Result<FilterSummary> {
        filter_file(&self.opts.output, out_path, spec, self.opts.progress, self.opts.read_buffer_bytes, self.opts.write_buffer_bytes)
    }
}

fn output_has_data(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
