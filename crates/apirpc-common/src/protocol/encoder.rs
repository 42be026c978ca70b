use crate::protocol::error::{ApiRpcError, Result};
use crate::protocol::requests::ApiRequest;
use crate::protocol::responses::ApiReply;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

/// Serializes action calls and their results to and from message payloads.
///
/// The encoder only deals with payload bytes; framing and correlation belong
/// to the transport.
pub trait Encoder: Send + Sync {
    /// Encodes a call to `action`.
    fn encode_request(&self, action: &str, args: Option<&Value>) -> Result<Vec<u8>>;

    /// Decodes a request payload.
    fn decode_request(&self, payload: &[u8]) -> Result<ApiRequest>;

    /// Encodes a reply body.
    fn encode_reply(&self, reply: &ApiReply) -> Result<Vec<u8>>;

    /// Decodes a reply body without interpreting its code.
    fn decode_reply(&self, payload: &[u8]) -> Result<ApiReply>;

    /// Decodes a reply payload into the action's result value.
    ///
    /// Non-zero codes become [`ApiRpcError::Api`] so that callers can tell a
    /// remote rejection apart from a transport failure.
    fn decode_result(&self, payload: &[u8]) -> Result<Value> {
        let reply = self.decode_reply(payload)?;
        if reply.is_success() {
            Ok(reply.data)
        } else {
            Err(ApiRpcError::api(reply.code, reply.message()))
        }
    }
}

/// Converts a decoded result value into the caller's requested type.
///
/// A `null` result converts into `Option::None`, `()` and other types that
/// accept unit.
pub fn convert_result<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ApiRpcError::InvalidResponse(format!("Cannot convert result: {}", e)))
}

/// JSON encoder
///
/// Payloads are the JSON serialization of [`ApiRequest`] and [`ApiReply`].
/// When `log_payloads` is set every encoded and decoded payload is emitted at
/// `trace` level, which is the diagnostic hook used while debugging wire
/// issues.
///
/// # Example
///
/// ```
/// use apirpc_common::protocol::{Encoder, JsonEncoder};
/// use serde_json::json;
///
/// let encoder = JsonEncoder::new();
/// let payload = encoder.encode_request("User/Login", Some(&json!({"user": "admin"}))).unwrap();
/// let request = encoder.decode_request(&payload).unwrap();
///
/// assert_eq!(request.action, "User/Login");
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonEncoder {
    log_payloads: bool,
}

impl JsonEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables payload tracing.
    pub fn with_logging(mut self, log_payloads: bool) -> Self {
        self.log_payloads = log_payloads;
        self
    }

    fn log(&self, direction: &str, payload: &[u8]) {
        if self.log_payloads {
            trace!(
                direction,
                payload = %String::from_utf8_lossy(payload),
                "encoder payload"
            );
        }
    }
}

impl Encoder for JsonEncoder {
    fn encode_request(&self, action: &str, args: Option<&Value>) -> Result<Vec<u8>> {
        let request = ApiRequest::new(action, args.cloned());
        let payload = serde_json::to_vec(&request)?;
        self.log("encode_request", &payload);
        Ok(payload)
    }

    fn decode_request(&self, payload: &[u8]) -> Result<ApiRequest> {
        self.log("decode_request", payload);
        Ok(serde_json::from_slice(payload)?)
    }

    fn encode_reply(&self, reply: &ApiReply) -> Result<Vec<u8>> {
        let payload = serde_json::to_vec(reply)?;
        self.log("encode_reply", &payload);
        Ok(payload)
    }

    fn decode_reply(&self, payload: &[u8]) -> Result<ApiReply> {
        self.log("decode_reply", payload);
        serde_json::from_slice(payload)
            .map_err(|e| ApiRpcError::InvalidResponse(format!("Malformed reply: {}", e)))
    }
}
