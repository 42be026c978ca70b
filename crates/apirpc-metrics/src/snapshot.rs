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

use serde::{Deserialize, Serialize};

/// Point-in-time copy of a single [`PerfCounter`](crate::PerfCounter)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub count: u64,
    pub total_us: u64,
    pub avg_us: u64,
    pub max_us: u64,
}

/// Snapshot of all client statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Logical calls issued by the invocation engine
    pub invoke: CounterSnapshot,
    /// Inbound requests processed by the local handler
    pub process: CounterSnapshot,
    /// Messages written to the transport
    pub send: CounterSnapshot,
    /// Replies read from the transport
    pub receive: CounterSnapshot,
}

/// Host information returned by the built-in `Api/Info` action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub name: String,
    pub version: String,
    pub uptime_ms: u64,
}

impl HostInfo {
    pub fn new(name: impl Into<String>, uptime_ms: u64) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_ms,
        }
    }
}
