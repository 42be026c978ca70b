use crate::snapshot::CounterSnapshot;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Lock-free performance counter.
///
/// Accumulates an operation count together with the total and worst-case
/// elapsed time of those operations. Every connection and every invocation
/// updates these from many tasks at once, so all fields are plain atomics
/// updated with relaxed ordering; exact cross-field consistency is not
/// required for reporting.
///
/// # Example
///
/// ```rust
/// use apirpc_metrics::PerfCounter;
/// use std::time::Instant;
///
/// let counter = PerfCounter::new();
/// let start = Instant::now();
/// // ... do some work ...
/// counter.record(start);
///
/// assert_eq!(counter.count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct PerfCounter {
    /// Number of recorded operations
    count: AtomicU64,
    /// Sum of elapsed time across all operations, in microseconds
    total_us: AtomicU64,
    /// Slowest single operation seen, in microseconds
    max_us: AtomicU64,
}

impl PerfCounter {
    /// Creates a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one operation that started at `start_time`.
    pub fn record(&self, start_time: Instant) {
        let elapsed_us = start_time.elapsed().as_micros() as u64;
        self.increment(1, elapsed_us);
    }

    /// Adds `value` operations that together took `elapsed_us` microseconds.
    pub fn increment(&self, value: u64, elapsed_us: u64) {
        self.count.fetch_add(value, Ordering::Relaxed);
        self.total_us.fetch_add(elapsed_us, Ordering::Relaxed);
        self.max_us.fetch_max(elapsed_us, Ordering::Relaxed);
    }

    /// Number of recorded operations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Total elapsed time in microseconds.
    pub fn total_us(&self) -> u64 {
        self.total_us.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time copy of the counter.
    pub fn snapshot(&self) -> CounterSnapshot {
        let count = self.count();
        let total_us = self.total_us();
        CounterSnapshot {
            count,
            total_us,
            avg_us: if count == 0 { 0 } else { total_us / count },
            max_us: self.max_us.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for PerfCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        write!(f, "{} ({:.2}ms)", snapshot.count, snapshot.avg_us as f64 / 1000.0)
    }
}
