// Copyright 2025 ApiRpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::counter::PerfCounter;
use crate::snapshot::StatsSnapshot;
use std::sync::Arc;
use std::time::Instant;

/// The four statistics counters shared by a client and its connections.
///
/// Each counter is an independent `Arc<PerfCounter>` handle so that it can be
/// injected into exactly the components that update it:
///
/// - `invoke` and `process` are owned by the invocation engine and the
///   request handler
/// - `send` and `receive` are handed to every transport connection the
///   client creates
///
/// Tests substitute their own `ClientStats` and assert on the accumulated
/// counts directly; nothing here is global.
///
/// # Example
///
/// ```rust
/// use apirpc_metrics::ClientStats;
/// use std::time::Instant;
///
/// let stats = ClientStats::new();
/// stats.invoke.record(Instant::now());
///
/// assert_eq!(stats.snapshot().invoke.count, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    pub invoke: Arc<PerfCounter>,
    pub process: Arc<PerfCounter>,
    pub send: Arc<PerfCounter>,
    pub receive: Arc<PerfCounter>,
}

impl ClientStats {
    /// Creates a fresh set of zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed logical call.
    pub fn record_invoke(&self, start_time: Instant) {
        self.invoke.record(start_time);
    }

    /// Records an inbound request handled locally.
    pub fn record_process(&self, start_time: Instant) {
        self.process.record(start_time);
    }

    /// Takes a snapshot of all four counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            invoke: self.invoke.snapshot(),
            process: self.process.snapshot(),
            send: self.send.snapshot(),
            receive: self.receive.snapshot(),
        }
    }

    /// Formats the one-line statistics report.
    ///
    /// Counters that never fired are left out so an idle client produces a
    /// short line.
    pub fn format_stat(&self) -> String {
        let parts: Vec<String> = [
            ("Invoke", &self.invoke),
            ("Process", &self.process),
            ("Send", &self.send),
            ("Receive", &self.receive),
        ]
        .iter()
        .filter(|(_, counter)| counter.count() > 0)
        .map(|(name, counter)| format!("{}: {}", name, counter))
        .collect();

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_are_independent() {
        let stats = ClientStats::new();
        stats.send.increment(3, 30);
        stats.receive.increment(1, 10);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.send.count, 3);
        assert_eq!(snapshot.receive.count, 1);
        assert_eq!(snapshot.invoke.count, 0);
        assert_eq!(snapshot.process.count, 0);
    }

    #[test]
    fn test_clone_shares_counters() {
        let stats = ClientStats::new();
        let clone = stats.clone();
        clone.invoke.increment(1, 0);
        assert_eq!(stats.invoke.count(), 1);
    }

    #[test]
    fn test_format_stat_skips_idle_counters() {
        let stats = ClientStats::new();
        assert_eq!(stats.format_stat(), "");

        stats.invoke.increment(1, 2000);
        stats.send.increment(1, 1000);
        assert_eq!(stats.format_stat(), "Invoke: 1 (2.00ms) Send: 1 (1.00ms)");
    }
}
