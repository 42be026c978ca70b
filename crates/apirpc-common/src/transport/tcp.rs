use std::sync::Arc;
use std::time::{Duration, Instant};

use apirpc_metrics::PerfCounter;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::api::RequestHandler;
use crate::protocol::error::{ApiRpcError, Result};
use crate::protocol::Message;
use crate::transport::codec::FrameCodec;

/// Default timeout for connect and write operations (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Strips the optional `tcp://` scheme from an endpoint address.
///
/// # Errors
///
/// Returns a configuration error for empty addresses and for schemes other
/// than `tcp`.
pub fn parse_endpoint(endpoint: &str) -> Result<&str> {
    let trimmed = endpoint.trim();
    let addr = match trimmed.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("tcp") => rest,
        Some((scheme, _)) => {
            return Err(ApiRpcError::Configuration(format!(
                "Unsupported scheme '{}' in endpoint '{}'",
                scheme, endpoint
            )))
        }
        None => trimmed,
    };

    if addr.is_empty() {
        return Err(ApiRpcError::Configuration(format!("Empty endpoint '{}'", endpoint)));
    }
    Ok(addr)
}

/// A message-level connection to one endpoint.
///
/// A socket client is owned by exactly one caller at a time, so every I/O
/// method takes `&mut self`.
#[async_trait]
pub trait SocketClient: Send + Sync {
    /// Endpoint this client connects to.
    fn endpoint(&self) -> &str;

    /// Per-call timeout.
    fn timeout(&self) -> Duration;

    /// Open and not broken by a failed or interrupted exchange.
    fn is_active(&self) -> bool;

    /// Establishes the network connection.
    async fn open(&mut self) -> Result<()>;

    /// Writes a message without waiting for a reply.
    async fn send_message(&mut self, msg: &Message) -> Result<()>;

    /// Writes a request and waits for the reply carrying its sequence.
    async fn send_message_async(&mut self, msg: &Message) -> Result<Message>;

    /// Closes the connection.
    async fn close(&mut self, reason: &str);
}

/// TCP socket client.
///
/// The client is configured before [`open`](SocketClient::open): call timeout,
/// send/receive counters, the frame codec and an optional handler for
/// requests the server pushes while a reply is awaited.
///
/// # Broken State
///
/// The client marks itself broken for the duration of every exchange and
/// clears the mark only when the exchange completes. A failed exchange, or a
/// future dropped mid-exchange by a cancelled caller, therefore leaves the
/// client broken, and pools discard it instead of reusing a stream in an
/// unknown state.
///
/// # Example
///
/// ```no_run
/// use apirpc_common::protocol::Message;
/// use apirpc_common::transport::{FrameCodec, SocketClient, TcpSocketClient};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut client = TcpSocketClient::new("tcp://127.0.0.1:7000");
/// client.set_timeout(Duration::from_secs(5));
/// client.add_codec(FrameCodec::new(Duration::from_secs(5)));
/// client.open().await?;
///
/// let reply = client.send_message_async(&Message::new(b"{}".to_vec())).await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpSocketClient {
    endpoint: String,
    timeout: Duration,
    codec: FrameCodec,
    stat_send: Option<Arc<PerfCounter>>,
    stat_receive: Option<Arc<PerfCounter>>,
    handler: Option<Arc<dyn RequestHandler>>,
    stream: Option<TcpStream>,
    broken: bool,
}

impl TcpSocketClient {
    /// Creates an unopened client for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            codec: FrameCodec::default(),
            stat_send: None,
            stat_receive: None,
            handler: None,
            stream: None,
            broken: false,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_stat_send(&mut self, counter: Arc<PerfCounter>) {
        self.stat_send = Some(counter);
    }

    pub fn set_stat_receive(&mut self, counter: Arc<PerfCounter>) {
        self.stat_receive = Some(counter);
    }

    /// Handler for requests initiated by the server.
    pub fn set_handler(&mut self, handler: Arc<dyn RequestHandler>) {
        self.handler = Some(handler);
    }

    /// Attaches the frame codec.
    pub fn add_codec(&mut self, codec: FrameCodec) {
        self.codec = codec;
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| ApiRpcError::Connection(format!("{} is not open", self.endpoint)))
    }

    async fn write(&mut self, msg: &Message) -> Result<()> {
        let start = Instant::now();
        let codec = self.codec.clone();
        let timeout = self.timeout;
        let stream = self.stream()?;

        tokio::time::timeout(timeout, codec.write_frame(stream, msg))
            .await
            .map_err(|_| ApiRpcError::Timeout(timeout.as_millis() as u64))??;

        if let Some(counter) = &self.stat_send {
            counter.record(start);
        }
        Ok(())
    }

    /// Reads frames until the reply for `sequence` arrives.
    ///
    /// Requests pushed by the server are answered through the handler.
    /// Replies with another sequence are stale and dropped.
    async fn read_reply(&mut self, sequence: u32) -> Result<Message> {
        loop {
            let codec = self.codec.clone();
            let stream = self.stream()?;
            let msg = codec.read_frame(stream).await?.ok_or_else(|| {
                ApiRpcError::Connection(format!("{} closed the connection", self.endpoint))
            })?;

            if msg.reply {
                if msg.sequence == sequence {
                    return Ok(msg);
                }
                debug!(
                    endpoint = %self.endpoint,
                    expected = sequence,
                    received = msg.sequence,
                    "dropping stale reply"
                );
                continue;
            }

            let Some(handler) = self.handler.clone() else {
                debug!(endpoint = %self.endpoint, "no handler for pushed request");
                continue;
            };
            if let Some(reply) = handler.handle(msg).await {
                let stream = self.stream()?;
                codec.write_frame(stream, &reply).await?;
            }
        }
    }
}

#[async_trait]
impl SocketClient for TcpSocketClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_active(&self) -> bool {
        self.stream.is_some() && !self.broken
    }

    async fn open(&mut self) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        let addr = parse_endpoint(&self.endpoint)?.to_string();
        let timeout = self.timeout;

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| {
                ApiRpcError::Connection(format!(
                    "Connecting to {} timed out after {}ms",
                    addr,
                    timeout.as_millis()
                ))
            })?
            .map_err(|e| ApiRpcError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;

        // Small request frames, send immediately
        let _ = stream.set_nodelay(true);

        debug!(endpoint = %self.endpoint, "connection opened");
        self.stream = Some(stream);
        self.broken = false;
        Ok(())
    }

    async fn send_message(&mut self, msg: &Message) -> Result<()> {
        self.broken = true;
        self.write(msg).await?;
        self.broken = false;
        Ok(())
    }

    async fn send_message_async(&mut self, msg: &Message) -> Result<Message> {
        self.broken = true;
        self.write(msg).await?;

        let start = Instant::now();
        let reply_timeout = self.codec.timeout;
        let reply = tokio::time::timeout(reply_timeout, self.read_reply(msg.sequence))
            .await
            .map_err(|_| ApiRpcError::Timeout(reply_timeout.as_millis() as u64))??;

        if let Some(counter) = &self.stat_receive {
            counter.record(start);
        }

        self.broken = false;
        Ok(reply)
    }

    async fn close(&mut self, reason: &str) {
        if self.stream.take().is_some() {
            debug!(endpoint = %self.endpoint, reason, "connection closed");
        }
    }
}
