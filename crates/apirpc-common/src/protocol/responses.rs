//! ApiRpc Reply Body
//!
//! This module defines the encoded body carried by reply messages.

use serde::{Deserialize, Serialize};

/// Result value of an action (JSON value)
pub type ApiResult = serde_json::Value;

/// Encoded body of a reply message.
///
/// # Reply Flow
///
/// 1. The remote host receives a request message and runs the action
/// 2. It builds an `ApiReply` (code 0 with the result, or a non-zero code
///    with the error message as `data`)
/// 3. The reply is encoded into a message that echoes the request sequence
/// 4. The client decodes it, turning non-zero codes into application errors
///
/// # Example
///
/// ```
/// use apirpc_common::protocol::responses::ApiReply;
/// use serde_json::json;
///
/// let ok = ApiReply::success(json!({"token": "abc"}));
/// assert!(ok.is_success());
///
/// let denied = ApiReply::error(401, "session expired");
/// assert_eq!(denied.code, 401);
/// assert_eq!(denied.data, json!("session expired"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiReply {
    /// Status code, 0 on success
    pub code: i32,
    /// Result value on success, error message on failure
    #[serde(default)]
    pub data: ApiResult,
}

impl ApiReply {
    /// Creates a successful reply.
    pub fn success(data: ApiResult) -> Self {
        ApiReply { code: 0, data }
    }

    /// Creates an error reply carrying a status code.
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        ApiReply {
            code,
            data: ApiResult::String(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Error message of a failed reply.
    pub fn message(&self) -> String {
        match &self.data {
            ApiResult::String(s) => s.clone(),
            ApiResult::Null => String::new(),
            other => other.to_string(),
        }
    }
}
