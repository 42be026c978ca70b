use crate::api::action::{ActionRegistry, Controller};
use crate::protocol::error::{ApiRpcError, Result};
use crate::protocol::{ApiReply, Encoder, Message};
use apirpc_metrics::PerfCounter;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Handles request messages arriving on a connection.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Processes one request, returning the reply to write back.
    ///
    /// Returns `None` for one-way requests.
    async fn handle(&self, request: Message) -> Option<Message>;
}

/// Request handler that dispatches to an [`ActionRegistry`].
///
/// Unknown actions are answered with code 404, application errors keep their
/// code and any other failure is answered with code 500.
pub struct ApiHandler {
    host: String,
    registry: Arc<ActionRegistry>,
    encoder: Arc<dyn Encoder>,
    stat_process: Option<Arc<PerfCounter>>,
}

impl ApiHandler {
    pub fn new(host: impl Into<String>, registry: Arc<ActionRegistry>, encoder: Arc<dyn Encoder>) -> Self {
        Self {
            host: host.into(),
            registry,
            encoder,
            stat_process: None,
        }
    }

    /// Counts every processed request on `counter`.
    pub fn with_stat_process(mut self, counter: Arc<PerfCounter>) -> Self {
        self.stat_process = Some(counter);
        self
    }

    async fn dispatch(&self, request: &Message) -> Result<Value> {
        let api_request = self.encoder.decode_request(&request.payload)?;
        let action = self
            .registry
            .find(&api_request.action)
            .ok_or_else(|| ApiRpcError::ActionNotFound(api_request.action.clone()))?;

        debug!(host = %self.host, action = %action.name(), "dispatching request");

        let controller = Controller::new(self.host.clone(), action);
        controller
            .invoke(api_request.args.unwrap_or(Value::Null), request.flag)
            .await
    }

    fn encode_reply(&self, request: &Message, result: Result<Value>) -> Option<Message> {
        let (reply, is_error) = match result {
            Ok(value) => (ApiReply::success(value), false),
            Err(e) => {
                warn!(host = %self.host, error = %e, "request failed");
                let message = match &e {
                    ApiRpcError::Api { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                (ApiReply::error(e.status_code(), message), true)
            }
        };

        match self.encoder.encode_reply(&reply) {
            Ok(payload) if is_error => Some(request.create_error_reply(payload)),
            Ok(payload) => Some(request.create_reply(payload)),
            Err(e) => {
                warn!(host = %self.host, error = %e, "failed to encode reply");
                None
            }
        }
    }
}

#[async_trait]
impl RequestHandler for ApiHandler {
    async fn handle(&self, request: Message) -> Option<Message> {
        let start = Instant::now();
        let result = self.dispatch(&request).await;

        if let Some(counter) = &self.stat_process {
            counter.record(start);
        }

        if !request.expects_reply() {
            return None;
        }

        self.encode_reply(&request, result)
    }
}
