//! ApiRpc Transport Layer
//!
//! Framing and TCP plumbing for ApiRpc messages.
//!
//! # Wire Format
//!
//! ```text
//! [4-byte length as u32 big-endian] [kind u8] [flag u8] [sequence u32 big-endian] [payload]
//! ```
//!
//! # Components
//!
//! - **[`FrameCodec`]**: frames [`Message`](crate::protocol::Message)s on async streams
//! - **[`SocketClient`]** / **[`TcpSocketClient`]**: one client connection with reply correlation
//! - **[`TcpServer`]**: accepts connections and answers requests through a handler
//!
//! # Message Size Limits
//!
//! Frames larger than [`MAX_FRAME_SIZE`] (100 MB) are rejected on both read
//! and write.

pub mod codec;
pub mod tcp;
pub mod tcp_server;

pub use codec::{FrameCodec, MAX_FRAME_SIZE};
pub use tcp::{parse_endpoint, SocketClient, TcpSocketClient, DEFAULT_TIMEOUT};
pub use tcp_server::TcpServer;

#[cfg(test)]
mod tests;
