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

//! # ApiRpc CLI
//!
//! Command-line interface for the ApiRpc client.
//!
//! ## Key Commands
//!
//! - `apirpc call`: invoke an action and print the JSON result
//! - `apirpc notify`: send a one-way action
//! - `apirpc serve`: run a demo server exposing the `Demo` controller
//!
//! Server lists are comma separated (`tcp://127.0.0.1:9001,127.0.0.1:9002`)
//! and fall back to the `APIRPC_SERVERS` environment variable.

pub mod demo;


use anyhow::{anyhow, Result};
use serde_json::Value;

/// Environment variable consulted when no server list is given
pub const SERVERS_ENV: &str = "APIRPC_SERVERS";

/// Picks the server list from the flag, then from `env_value`.
pub fn resolve_servers(flag: Option<String>, env_value: Option<String>) -> Result<String> {
    flag.or(env_value)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow!("No servers given, use --servers or set {}", SERVERS_ENV))
}

/// Parses the `--args` value; an empty string means no arguments.
pub fn parse_args(args: &str) -> Result<Option<Value>> {
    if args.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(args).map_err(|e| anyhow!("Invalid JSON in args: {}", e))?;
    Ok(Some(value))
}
