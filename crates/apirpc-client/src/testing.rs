//! Scripted transport fakes for unit tests

use apirpc_common::protocol::error::{ApiRpcError, Result};
use apirpc_common::protocol::{ApiReply, Encoder, JsonEncoder, Message};
use apirpc_common::transport::SocketClient;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::factory::{ConnectOptions, Connector};

/// Decides the outcome of one send: `(endpoint, request) -> reply`
pub(crate) type Script = dyn Fn(&str, &Message) -> Result<Message> + Send + Sync;

struct ScriptedSocket {
    endpoint: String,
    active: bool,
    script: Arc<Script>,
    sends: Arc<AtomicUsize>,
    delay: Option<Duration>,
    timeout: Duration,
    dropped: Arc<AtomicUsize>,
}

impl Drop for ScriptedSocket {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScriptedSocket {
    async fn exchange(&mut self, msg: &Message) -> Result<Message> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        // Broken until the exchange completes, like the TCP client
        self.active = false;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = (self.script)(&self.endpoint, msg);
        if !matches!(&result, Err(e) if e.is_transport()) {
            self.active = true;
        }
        result
    }
}

#[async_trait]
impl SocketClient for ScriptedSocket {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn open(&mut self) -> Result<()> {
        self.active = true;
        Ok(())
    }

    async fn send_message(&mut self, msg: &Message) -> Result<()> {
        self.exchange(msg).await.map(|_| ())
    }

    async fn send_message_async(&mut self, msg: &Message) -> Result<Message> {
        self.exchange(msg).await
    }

    async fn close(&mut self, _reason: &str) {
        self.active = false;
    }
}

/// Connects only to the endpoints in `up`; every socket runs `script`.
///
/// Endpoints marked hanging stall for the connect timeout and then fail.
pub(crate) struct ScriptedConnector {
    up: Vec<String>,
    hanging: Vec<String>,
    script: Arc<Script>,
    delay: Option<Duration>,
    attempts: Mutex<Vec<String>>,
    sends: Arc<AtomicUsize>,
    dropped: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub(crate) fn new<S>(up: &[&str], script: S) -> Self
    where
        S: Fn(&str, &Message) -> Result<Message> + Send + Sync + 'static,
    {
        Self {
            up: up.iter().map(|s| s.to_string()).collect(),
            hanging: Vec::new(),
            script: Arc::new(script),
            delay: None,
            attempts: Mutex::new(Vec::new()),
            sends: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delays every send by `delay`.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes connecting to `endpoints` stall until the connect timeout.
    pub(crate) fn with_hanging(mut self, endpoints: &[&str]) -> Self {
        self.hanging = endpoints.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Endpoints connected to so far, in order.
    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Sockets released so far.
    pub(crate) fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, endpoint: &str, options: &ConnectOptions) -> Result<Box<dyn SocketClient>> {
        self.attempts.lock().unwrap().push(endpoint.to_string());
        if self.hanging.iter().any(|h| h == endpoint) {
            tokio::time::sleep(options.timeout).await;
            return Err(ApiRpcError::Connection(format!("{} timed out", endpoint)));
        }
        if !self.up.iter().any(|up| up == endpoint) {
            return Err(ApiRpcError::Connection(format!("{} refused", endpoint)));
        }
        Ok(Box::new(ScriptedSocket {
            endpoint: endpoint.to_string(),
            active: true,
            script: self.script.clone(),
            sends: self.sends.clone(),
            delay: self.delay,
            timeout: options.timeout,
            dropped: self.dropped.clone(),
        }))
    }
}

pub(crate) fn ok_reply(request: &Message, data: Value) -> Result<Message> {
    let payload = JsonEncoder::new().encode_reply(&ApiReply::success(data))?;
    Ok(request.create_reply(payload))
}

pub(crate) fn error_reply(request: &Message, code: i32, message: &str) -> Result<Message> {
    let payload = JsonEncoder::new().encode_reply(&ApiReply::error(code, message))?;
    Ok(request.create_error_reply(payload))
}
