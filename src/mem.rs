//! Memory guard for the dispatch loop.

use parking_lot::Mutex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use sysinfo::{System, SystemExt};

/// Cached view of system memory, refreshed at most every `REFRESH_EVERY`.
struct MemProbe {
    sys: System,
    refreshed: Option<Instant>,
    available: f64, // available / total (0.0..1.0)
}

static PROBE: OnceLock<Mutex<MemProbe>> = OnceLock::new();
const REFRESH_EVERY: Duration = Duration::from_millis(500);
const BACKOFF: Duration = Duration::from_millis(25);

/// Returns a recent estimate of the available memory fraction (0.0..1.0).
pub fn available_memory_fraction() -> f64 {
    let probe = PROBE.get_or_init(|| {
        Mutex::new(MemProbe { sys: System::new(), refreshed: None, available: 1.0 })
    });
    let mut st = probe.lock();
    let now = Instant::now();
    let stale = st.refreshed.map_or(true, |t| now.duration_since(t) >= REFRESH_EVERY);
    if stale {
        st.sys.refresh_memory();
        let total = st.sys.total_memory() as f64;
        let avail = st.sys.available_memory() as f64;
        st.available = if total > 0.0 { (avail / total).clamp(0.0, 1.0) } else { 1.0 };
        st.refreshed = Some(now);
    }
    st.available
}

/// True if the available-memory fraction is below `threshold` (e.g. 0.05 for 5%).
pub fn is_low_memory(threshold: f64) -> bool {
    available_memory_fraction() < threshold
}

/// Yield briefly before dispatching more fetches while memory is low.
/// A threshold of zero disables the check.
pub fn maybe_throttle_low_memory(threshold: f64) {
    if threshold > 0.0 && is_low_memory(threshold) {
        tracing::debug!(threshold, "low memory; delaying dispatch");
        std::thread::sleep(BACKOFF);
    }
}
