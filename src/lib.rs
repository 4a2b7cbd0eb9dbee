mod config;
mod util;
mod mem;
mod progress;
mod ndjson;
mod json_text;

mod store;
mod enumerate;
mod record;
mod validate;
mod normalize;
mod sink;
mod worker;
mod pipeline;
mod filter;

pub use crate::config::{EtlOptions, DEFAULT_OUTPUT, DEFAULT_PREFIX};
pub use crate::pipeline::{ErrorLog, PipelineError, ResultsEtl, RunSummary};

// Object store seam and key listing.
pub use crate::store::{DirStore, ListPage, MemoryStore, ObjectMeta, ObjectStore, DEFAULT_PAGE_SIZE};
pub use crate::enumerate::KeyEnumerator;

// Record model, validation and normalization.
pub use crate::record::{Payload, Record, RecordError, Score, REQUIRED_KEYS};
pub use crate::validate::{decode_payload, extract_records, parse_records, validate, SkipReason};
pub use crate::normalize::{normalize, CanonicalRecord};

// Workers and the output sink.
pub use crate::worker::{process_key, FetchPool, KeyOutcome, Skip};
pub use crate::sink::{BatchedSink, SinkError};

// Downstream filter pass.
pub use crate::filter::{filter_file, filter_line, FilterSpec, FilterSummary, FilteredRecord, Rejection, ScoreFilter};

// Shared helpers for binaries.
pub use crate::json_text::{value_to_spaced_string, write_spaced, SpacedFormatter};
pub use crate::mem::{available_memory_fraction, is_low_memory};
pub use crate::ndjson::{NdjsonReader, NdjsonWriter};
pub use crate::progress::make_count_progress;
pub use crate::util::init_tracing_once;
