//! Actions served by `apirpc serve`.

use apirpc_common::api::{register_api_controller, ActionRegistry};
use apirpc_common::ApiRpcError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builds a registry with the `Api` controller and the `Demo` actions:
///
/// - `Demo/Echo`: returns its arguments
/// - `Demo/Add`: sums a JSON array of integers
/// - `Demo/Sleep`: waits the given number of milliseconds
/// - `Demo/Fail`: fails with `{"code": .., "message": ..}`
/// - `Demo/Log`: logs its arguments, meant for one-way sends
pub fn registry(host: &str) -> Arc<ActionRegistry> {
    let registry = Arc::new(ActionRegistry::new());
    register_api_controller(&registry, host);

    registry.register("Demo/Echo", |_, args: Value| async move { Ok(args) });

    registry.register("Demo/Add", |_, args: Value| async move {
        let items = args
            .as_array()
            .ok_or_else(|| ApiRpcError::api(400, "Expected an array of integers"))?;
        let mut sum = 0i64;
        for item in items {
            sum += item
                .as_i64()
                .ok_or_else(|| ApiRpcError::api(400, format!("Not an integer: {}", item)))?;
        }
        Ok(json!(sum))
    });

    registry.register("Demo/Sleep", |_, args: Value| async move {
        let ms = args.as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!(ms))
    });

    registry.register("Demo/Fail", |_, args: Value| async move {
        let code = args["code"].as_i64().unwrap_or(500) as i32;
        let message = args["message"].as_str().unwrap_or("Demo failure").to_string();
        Err(ApiRpcError::api(code, message))
    });

    registry.register("Demo/Log", |ctx, args: Value| async move {
        info!(host = %ctx.host, flag = ctx.flag, %args, "demo log");
        Ok(Value::Null)
    });

    registry
}
