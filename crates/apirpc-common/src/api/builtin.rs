//! Built-in `Api` controller
//!
//! Every host registers these actions so that peers can discover what it
//! serves:
//!
//! - `Api/All`: sorted list of registered action names
//! - `Api/Info`: host name, version and uptime

use crate::api::action::ActionRegistry;
use apirpc_metrics::HostInfo;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Instant;

pub const API_ALL: &str = "Api/All";
pub const API_INFO: &str = "Api/Info";

/// Registers the built-in `Api` controller on `registry`.
pub fn register_api_controller(registry: &Arc<ActionRegistry>, host: impl Into<String>) {
    let host = host.into();
    let started = Instant::now();

    // Weak reference, the registry owns this closure
    let weak: Weak<ActionRegistry> = Arc::downgrade(registry);
    registry.register(API_ALL, move |_ctx, _args: Value| {
        let names = weak.upgrade().map(|r| r.names()).unwrap_or_default();
        async move { Ok(json!(names)) }
    });

    registry.register(API_INFO, move |_ctx, _args: Value| {
        let info = HostInfo::new(host.clone(), started.elapsed().as_millis() as u64);
        async move { Ok(serde_json::to_value(info)?) }
    });
}
