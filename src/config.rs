use std::path::{Path, PathBuf};

/// Key prefix the result objects live under.
pub const DEFAULT_PREFIX: &str = "affine/results/";
/// Default consolidated output file.
pub const DEFAULT_OUTPUT: &str = "combined_data.jsonl";

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct EtlOptions {
    pub prefix: String,
    pub key_suffix: Option<String>,   // only keys ending with this are fetched
    pub output: PathBuf,
    pub overwrite: bool,              // replace an existing, non-empty output
    pub concurrency: usize,           // max fetches in flight (worker threads)
    pub dispatch_batch: usize,        // keys handed to the pool per round
    pub write_batch: usize,           // records buffered before a flush
    pub error_sample: usize,          // skip reasons retained for the summary
    pub progress: bool,               // show progress bar
    pub progress_label: Option<String>, // optional label for progress bar
    pub low_memory_threshold: f64,    // throttle dispatch below this available fraction

    // IO tuning
    pub read_buffer_bytes: usize,     // BufReader capacity
    pub write_buffer_bytes: usize,    // BufWriter capacity
}

impl Default for EtlOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            key_suffix: Some(".json".to_string()),
            output: PathBuf::from(DEFAULT_OUTPUT),
            overwrite: false,
            // Matches the connection ceiling the store client is usually configured with.
            concurrency: 256,
            dispatch_batch: 100,
            write_batch: 1000,
            error_sample: 5,
            progress: true,
            progress_label: None,
            low_memory_threshold: 0.05,

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl EtlOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
    /// `None` fetches every key under the prefix.
    pub fn with_key_suffix(mut self, suffix: Option<impl Into<String>>) -> Self {
        self.key_suffix = suffix.map(Into::into).filter(|s: &String| !s.is_empty());
        self
    }
    pub fn with_output(mut self, path: impl AsRef<Path>) -> Self {
        self.output = path.as_ref().to_path_buf();
        self
    }
    pub fn with_overwrite(mut self, yes: bool) -> Self {
        self.overwrite = yes;
        self
    }
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }
    pub fn with_dispatch_batch(mut self, n: usize) -> Self {
        self.dispatch_batch = n.max(1);
        self
    }
    pub fn with_write_batch(mut self, n: usize) -> Self {
        self.write_batch = n.max(1);
        self
    }
    pub fn with_error_sample(mut self, n: usize) -> Self {
        self.error_sample = n;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
    pub fn with_low_memory_threshold(mut self, frac: f64) -> Self {
        self.low_memory_threshold = frac.clamp(0.0, 1.0);
        self
    }

    // IO buffers tuning
    pub fn with_io_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(8 * 1024);
        self
    }
    pub fn with_io_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer_bytes = bytes.max(8 * 1024);
        self
    }
}
