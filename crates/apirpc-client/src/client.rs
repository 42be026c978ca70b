use apirpc_common::api::{
    register_api_controller, ActionRegistry, ApiAction, ApiHandler, Controller, RequestHandler,
};
use apirpc_common::protocol::error::{ApiRpcError, Result};
use apirpc_common::protocol::{convert_result, Encoder, JsonEncoder};
use apirpc_metrics::{ClientStats, StatReporter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, PoolConfig};
use crate::factory::{ConnectOptions, Connector, EndpointFactory, TcpConnector};
use crate::pool::{Pool, PoolStats};
use crate::selector::ServerList;
use crate::session::Session;

/// Lifecycle state of an [`ApiClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClientStatus {
    Closed,
    Opening,
    Active,
}

#[derive(Default)]
struct State {
    session: Option<Arc<Session>>,
    reporter: Option<JoinHandle<()>>,
}

/// Load-balancing, failover-capable RPC client.
///
/// # Architecture
///
/// - Connections come from a bounded [`Pool`] whose factory picks servers
///   round-robin, skipping unreachable ones
/// - Each call goes through the [`Session`], which fails over to another
///   connection on transport errors
/// - A reply with code 401 makes the client retry the whole call once
/// - A call that outlives the configured timeout fails with
///   [`ApiRpcError::TimedOut`] naming the action
///
/// The client opens lazily on the first call, or explicitly with
/// [`open`](Self::open).
///
/// # Example
///
/// ```rust,no_run
/// use apirpc_client::ApiClient;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::new("tcp://10.0.0.1:7000,tcp://10.0.0.2:7000");
///
/// let sum: i64 = client.invoke_async("Math/Add", Some(json!([1, 2])), 0).await?;
/// assert_eq!(sum, 3);
///
/// client.close("done").await;
/// # Ok(())
/// # }
/// ```
pub struct ApiClient {
    config: ClientConfig,
    servers: ServerList,
    connector: Arc<dyn Connector>,
    encoder: Arc<dyn Encoder>,
    registry: Arc<ActionRegistry>,
    handler: Arc<dyn RequestHandler>,
    stats: ClientStats,
    status: Mutex<ClientStatus>,
    state: tokio::sync::Mutex<State>,
}

impl ApiClient {
    /// Creates a TCP client for a comma-separated server list.
    ///
    /// An empty list is accepted here but [`open`](Self::open) rejects it.
    pub fn new(servers: &str) -> Self {
        Self::builder().servers(servers).build()
    }

    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Handle to the server list; changes apply to new connections.
    pub fn servers(&self) -> &ServerList {
        &self.servers
    }

    /// Actions this client answers when a server calls back.
    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn status(&self) -> ClientStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: ClientStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Pool counters while the client is open.
    pub async fn pool_stats(&self) -> Option<PoolStats> {
        let state = self.state.lock().await;
        state.session.as_ref().map(|s| s.pool().stats())
    }

    /// Opens the client by establishing one connection.
    ///
    /// Returns `Ok(true)` when already open. Returns `Ok(false)` when no
    /// server could be reached; the client then stays closed.
    ///
    /// # Errors
    ///
    /// [`ApiRpcError::Configuration`] when the server list is empty.
    pub async fn open(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.session.is_some() {
            return Ok(true);
        }

        if self.servers.is_empty() {
            return Err(ApiRpcError::Configuration(format!(
                "{} has no servers configured",
                self.config.name
            )));
        }

        self.set_status(ClientStatus::Opening);

        let options = ConnectOptions::new(self.config.timeout(), self.stats.clone())
            .with_handler(self.handler.clone());
        let factory = EndpointFactory::new(self.servers.clone(), self.connector.clone(), options);
        let pool = Pool::new(factory, self.config.pool.clone());

        // One scoped checkout proves that a server is reachable
        if let Err(e) = pool.acquire().await.map(drop) {
            warn!(client = %self.config.name, error = %e, "failed to open");
            pool.close();
            self.set_status(ClientStatus::Closed);
            return Ok(false);
        }

        self.show_service();

        state.reporter =
            StatReporter::new(self.config.name.clone(), self.stats.clone(), self.config.stat_period()).spawn();
        state.session = Some(Arc::new(Session::new(
            pool,
            self.servers.clone(),
            self.encoder.clone(),
        )));
        self.set_status(ClientStatus::Active);
        Ok(true)
    }

    fn show_service(&self) {
        info!(
            client = %self.config.name,
            servers = ?self.servers.snapshot(),
            actions = self.registry.len(),
            timeout_ms = self.config.timeout_ms,
            "service opened"
        );
    }

    /// Disposes every connection and marks the client closed.
    ///
    /// `reason` only appears in logs. Calling `close` on a closed client does
    /// nothing.
    pub async fn close(&self, reason: &str) {
        let mut state = self.state.lock().await;
        let Some(session) = state.session.take() else {
            return;
        };

        if let Some(reporter) = state.reporter.take() {
            reporter.abort();
        }
        session.pool().close();
        self.set_status(ClientStatus::Closed);
        info!(client = %self.config.name, reason, "service closed");
    }

    /// Closes the client with the reason `"<name>Dispose"`.
    pub async fn dispose(&self) {
        let reason = format!("{}Dispose", self.config.name);
        self.close(&reason).await;
    }

    async fn ensure_open(&self) -> Result<Arc<Session>> {
        if let Some(session) = self.state.lock().await.session.clone() {
            return Ok(session);
        }

        if !self.open().await? {
            return Err(ApiRpcError::Connection(format!(
                "{} could not reach any server",
                self.config.name
            )));
        }

        self.state.lock().await.session.clone().ok_or_else(|| {
            ApiRpcError::Connection(format!("{} was closed while opening", self.config.name))
        })
    }

    /// Calls `action` and waits for its result.
    ///
    /// The call is retried once when the server answers 401. Other
    /// application errors and transport errors left after failover are
    /// returned as is; a call exceeding the timeout fails with
    /// [`ApiRpcError::TimedOut`].
    pub async fn invoke_value(&self, action: &str, args: Option<Value>, flag: u8) -> Result<Value> {
        let start = Instant::now();

        let result = match self.invoke_once(action, args.as_ref(), flag).await {
            Err(e) if e.is_unauthorized() => {
                debug!(client = %self.config.name, action, "unauthorized, retrying once");
                self.invoke_once(action, args.as_ref(), flag).await
            }
            other => other,
        };

        self.stats.record_invoke(start);

        result.map_err(|e| match e {
            ApiRpcError::Timeout(_) => ApiRpcError::timed_out(action, e),
            other => other,
        })
    }

    /// Calls `action` and converts its result to `T`.
    pub async fn invoke_async<T: DeserializeOwned>(
        &self,
        action: &str,
        args: Option<Value>,
        flag: u8,
    ) -> Result<T> {
        let value = self.invoke_value(action, args, flag).await?;
        convert_result(value)
    }

    async fn invoke_once(&self, action: &str, args: Option<&Value>, flag: u8) -> Result<Value> {
        let session = self.ensure_open().await?;
        let msg = session.create_message(action, args, flag)?;
        session.send_async(&msg).await
    }

    /// Sends `action` without waiting for a result.
    ///
    /// Returns `Ok(false)` when the client cannot be opened.
    pub async fn invoke(&self, action: &str, args: Option<Value>, flag: u8) -> Result<bool> {
        match self.open().await {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(e) => {
                warn!(client = %self.config.name, action, error = %e, "cannot open for one-way call");
                return Ok(false);
            }
        }

        let Some(session) = self.state.lock().await.session.clone() else {
            return Ok(false);
        };

        let msg = session.create_message(action, args.as_ref(), flag)?;
        session.send(msg).await?;
        Ok(true)
    }

    /// Resolves a locally registered action.
    pub fn find_action(&self, action: &str) -> Option<Arc<ApiAction>> {
        self.registry.find(action)
    }

    /// Binds `api` to this client so it can be invoked directly.
    pub fn create_controller(&self, api: &Arc<ApiAction>) -> Controller {
        Controller::new(self.config.name.clone(), api.clone())
    }
}

impl Drop for ApiClient {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(reporter) = state.reporter.take() {
            reporter.abort();
        }
        let Some(session) = state.session.take() else {
            return;
        };

        session.pool().close();
        self.set_status(ClientStatus::Closed);
        let reason = format!("{}Drop", self.config.name);
        info!(client = %self.config.name, reason = %reason, "service closed");
    }
}

/// Builder for [`ApiClient`].
///
/// Collaborators left unset get defaults: [`TcpConnector`], [`JsonEncoder`]
/// (tracing payloads when `log_payloads` is set), a fresh
/// [`ActionRegistry`] and fresh [`ClientStats`].
#[derive(Default)]
pub struct ApiClientBuilder {
    servers: Vec<String>,
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    encoder: Option<Arc<dyn Encoder>>,
    registry: Option<Arc<ActionRegistry>>,
    stats: Option<ClientStats>,
}

impl ApiClientBuilder {
    /// Appends the endpoints of a comma-separated list.
    pub fn servers(mut self, servers: &str) -> Self {
        self.servers.extend(ServerList::parse(servers).snapshot());
        self
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.servers.push(server.into());
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn stat_period(mut self, period: Duration) -> Self {
        self.config.stat_period_secs = period.as_secs();
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn registry(mut self, registry: Arc<ActionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn stats(mut self, stats: ClientStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn build(self) -> ApiClient {
        let config = self.config;

        let encoder = self
            .encoder
            .unwrap_or_else(|| Arc::new(JsonEncoder::new().with_logging(config.log_payloads)));
        let registry = self.registry.unwrap_or_default();
        register_api_controller(&registry, config.name.clone());

        let stats = self.stats.unwrap_or_default();
        let handler = ApiHandler::new(config.name.clone(), registry.clone(), encoder.clone())
            .with_stat_process(stats.process.clone());

        ApiClient {
            servers: ServerList::new(self.servers),
            connector: self.connector.unwrap_or_else(|| Arc::new(TcpConnector)),
            encoder,
            registry,
            handler: Arc::new(handler),
            stats,
            status: Mutex::new(ClientStatus::Closed),
            state: tokio::sync::Mutex::new(State::default()),
            config,
        }
    }
}
