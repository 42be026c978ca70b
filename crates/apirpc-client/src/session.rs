use apirpc_common::protocol::error::{ApiRpcError, Result};
use apirpc_common::protocol::{Encoder, Message};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::factory::EndpointFactory;
use crate::pool::Pool;
use crate::selector::ServerList;

/// Pool of connections to the configured servers.
pub type ConnectionPool = Pool<EndpointFactory>;

/// The client seen as one logical session.
///
/// Calls fan out over every pooled connection. A send that fails at the
/// transport level is retried on another connection, up to one attempt per
/// configured server. A reply carrying an application error is final: the
/// server processed the call, so retrying could repeat its side effects.
pub struct Session {
    pool: ConnectionPool,
    servers: ServerList,
    encoder: Arc<dyn Encoder>,
}

impl Session {
    pub fn new(pool: ConnectionPool, servers: ServerList, encoder: Arc<dyn Encoder>) -> Self {
        Self {
            pool,
            servers,
            encoder,
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Encodes a call to `action` into a request message.
    pub fn create_message(&self, action: &str, args: Option<&Value>, flag: u8) -> Result<Message> {
        let payload = self.encoder.encode_request(action, args)?;
        Ok(Message::new(payload).with_flag(flag))
    }

    /// Sends a one-way message, failing over on transport errors.
    pub async fn send(&self, msg: Message) -> Result<()> {
        let msg = msg.into_one_way();
        self.transmit(&msg).await.map(|_| ())
    }

    /// Sends a request and decodes the reply's result, failing over on
    /// transport errors.
    ///
    /// # Errors
    ///
    /// - [`ApiRpcError::Api`] as soon as a server rejects the call
    /// - [`ApiRpcError::Timeout`] when the reply does not arrive within the
    ///   connection's timeout; not failed over
    /// - the last transport error once every attempt failed
    /// - pool errors, which are not retried
    pub async fn send_async(&self, msg: &Message) -> Result<Value> {
        self.transmit(msg)
            .await?
            .ok_or_else(|| ApiRpcError::InvalidResponse("Request was sent as one-way".to_string()))
    }

    async fn transmit(&self, msg: &Message) -> Result<Option<Value>> {
        let attempts = self.servers.len();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let mut conn = self.pool.acquire().await?;

            // The call timeout bounds the reply wait only; acquiring may
            // have tried several endpoints already
            let outcome = if msg.one_way {
                conn.send_message(msg).await.map(|_| None)
            } else {
                let timeout = conn.timeout();
                match tokio::time::timeout(timeout, conn.send_message_async(msg)).await {
                    Ok(Ok(reply)) => self.encoder.decode_result(&reply.payload).map(Some),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(ApiRpcError::Timeout(timeout.as_millis() as u64)),
                }
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transport() => {
                    warn!(
                        attempt,
                        attempts,
                        endpoint = conn.endpoint(),
                        error = %e,
                        "send failed, trying next connection"
                    );
                    conn.discard();
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ApiRpcError::Configuration("Server list is empty".to_string())))
    }
}
