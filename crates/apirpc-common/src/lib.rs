//! ApiRpc Common Types and Transport
//!
//! This crate provides the pieces shared by every ApiRpc participant:
//!
//! - **Protocol Layer**: error taxonomy, message envelope, request and reply
//!   payloads and the [`Encoder`] that turns them into bytes
//! - **Action Model**: action registry, the built-in `Api` controller and the
//!   [`ApiHandler`](api::ApiHandler) that answers request messages
//! - **Transport Layer**: frame codec, TCP socket client and TCP server
//!
//! # Architecture
//!
//! - **Transport**: TCP with keep-alive connections
//! - **Serialization**: JSON payloads inside binary frames
//! - **Frame Format**: `[u32 BE length] [kind] [flag] [u32 BE sequence] [payload]`
//! - **Max Frame Size**: 100 MB
//!
//! # Example
//!
//! ```
//! use apirpc_common::{ApiRpcError, Encoder, JsonEncoder, Message};
//! use serde_json::json;
//!
//! let encoder = JsonEncoder::new();
//! let payload = encoder.encode_request("Math/Add", Some(&json!([1, 2]))).unwrap();
//! let request = Message::new(payload);
//! assert!(request.expects_reply());
//!
//! let err = ApiRpcError::api(401, "token expired");
//! assert!(err.is_unauthorized());
//! ```

pub mod api;
pub mod protocol;
pub mod transport;

pub use protocol::*;
