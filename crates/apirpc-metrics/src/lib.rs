//! ApiRpc Statistics
//!
//! Shared, process-lifetime counters for the ApiRpc client and the periodic
//! reporter that logs them.
//!
//! # Architecture
//!
//! - [`PerfCounter`]: lock-free count / total time / max time accumulator
//! - [`ClientStats`]: the four counters a client carries (invoke, process,
//!   send, receive), each an independently shareable `Arc` handle
//! - [`StatReporter`]: background task that logs a one-line summary every
//!   period, skipping reports identical to the previous one
//! - [`StatsSnapshot`]: serializable copy of all counters
//!
//! Counters are passed explicitly to the components that update them; there
//! is no global registry.
//!
//! # Usage Example
//!
//! ```rust
//! use apirpc_metrics::ClientStats;
//! use std::time::Instant;
//!
//! let stats = ClientStats::new();
//!
//! let start = Instant::now();
//! // ... send a message ...
//! stats.send.record(start);
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.send.count, 1);
//! ```

mod collector;
mod counter;
mod reporter;
mod snapshot;

pub use collector::ClientStats;
pub use counter::PerfCounter;
pub use reporter::StatReporter;
pub use snapshot::{CounterSnapshot, HostInfo, StatsSnapshot};
