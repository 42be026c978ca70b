use apirpc_common::api::RequestHandler;
use apirpc_common::protocol::error::Result;
use apirpc_common::transport::{FrameCodec, SocketClient, TcpSocketClient};
use apirpc_metrics::ClientStats;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::pool::PoolFactory;
use crate::selector::{RoundRobin, ServerList};

/// Everything a connection is configured with before it is opened.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Call and connect timeout
    pub timeout: Duration,
    /// Shared counters; connections update `send` and `receive`
    pub stats: ClientStats,
    /// Answers requests the server pushes over the connection
    pub handler: Option<Arc<dyn RequestHandler>>,
}

impl ConnectOptions {
    pub fn new(timeout: Duration, stats: ClientStats) -> Self {
        Self {
            timeout,
            stats,
            handler: None,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handler = Some(handler);
        self
    }
}

/// Builds and opens a transport connection to one endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str, options: &ConnectOptions) -> Result<Box<dyn SocketClient>>;
}

/// Connector producing [`TcpSocketClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &str, options: &ConnectOptions) -> Result<Box<dyn SocketClient>> {
        let mut client = TcpSocketClient::new(endpoint);
        client.set_timeout(options.timeout);
        client.set_stat_send(options.stats.send.clone());
        client.set_stat_receive(options.stats.receive.clone());
        // Message codec; payloads are encoder output, not user packets
        client.add_codec(FrameCodec::new(options.timeout));
        if let Some(handler) = &options.handler {
            client.set_handler(handler.clone());
        }

        client.open().await?;
        Ok(Box::new(client))
    }
}

/// Pool factory that opens connections against the server list, choosing
/// the endpoint round-robin.
pub struct EndpointFactory {
    servers: ServerList,
    selector: RoundRobin,
    connector: Arc<dyn Connector>,
    options: ConnectOptions,
}

impl EndpointFactory {
    pub fn new(servers: ServerList, connector: Arc<dyn Connector>, options: ConnectOptions) -> Self {
        Self {
            servers,
            selector: RoundRobin::new(),
            connector,
            options,
        }
    }

    pub fn servers(&self) -> &ServerList {
        &self.servers
    }
}

#[async_trait]
impl PoolFactory for EndpointFactory {
    type Item = Box<dyn SocketClient>;

    async fn create(&self) -> Result<Box<dyn SocketClient>> {
        let servers = self.servers.snapshot();
        let connector = &self.connector;
        let options = &self.options;

        self.selector
            .connect_first(&servers, |endpoint| async move {
                connector.connect(&endpoint, options).await
            })
            .await
    }

    fn is_broken(&self, conn: &Box<dyn SocketClient>) -> bool {
        !conn.is_active()
    }

    fn dispose(&self, conn: Box<dyn SocketClient>) {
        // Dropping the client closes its socket
        debug!(endpoint = conn.endpoint(), "disposing connection");
        drop(conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ok_reply, ScriptedConnector};
    use serde_json::Value;

    fn factory(up: &[&str]) -> (EndpointFactory, Arc<ScriptedConnector>) {
        let connector = Arc::new(ScriptedConnector::new(up, |_, msg| ok_reply(msg, Value::Null)));
        let factory = EndpointFactory::new(
            ServerList::parse("a:1,b:2,c:3"),
            connector.clone(),
            ConnectOptions::new(Duration::from_secs(1), ClientStats::new()),
        );
        (factory, connector)
    }

    #[tokio::test]
    async fn test_create_selects_reachable_endpoint() {
        let (factory, connector) = factory(&["c:3"]);

        let conn = factory.create().await.unwrap();
        assert_eq!(conn.endpoint(), "c:3");
        assert_eq!(connector.attempts(), vec!["a:1", "b:2", "c:3"]);
    }

    #[tokio::test]
    async fn test_successive_creates_rotate_endpoints() {
        let (factory, _) = factory(&["a:1", "b:2", "c:3"]);

        let mut endpoints = Vec::new();
        for _ in 0..4 {
            endpoints.push(factory.create().await.unwrap().endpoint().to_string());
        }
        assert_eq!(endpoints, vec!["a:1", "b:2", "c:3", "a:1"]);
    }

    #[tokio::test]
    async fn test_create_fails_with_last_error() {
        let (factory, _) = factory(&[]);
        let err = factory.create().await.err().unwrap();
        assert_eq!(err.to_string(), "Connection error: c:3 refused");
    }

    #[tokio::test]
    async fn test_create_sees_server_list_changes() {
        let (factory, connector) = factory(&["d:4"]);
        factory.servers().set(vec!["d:4".to_string()]);

        let conn = factory.create().await.unwrap();
        assert_eq!(conn.endpoint(), "d:4");
        assert_eq!(connector.attempts(), vec!["d:4"]);
    }

    #[tokio::test]
    async fn test_inactive_connection_is_broken() {
        let (factory, _) = factory(&["a:1"]);
        let mut conn = factory.create().await.unwrap();
        assert!(!factory.is_broken(&conn));

        conn.close("test").await;
        assert!(factory.is_broken(&conn));
    }

    #[tokio::test]
    async fn test_tcp_connector_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let options = ConnectOptions::new(Duration::from_secs(1), ClientStats::new());
        let err = TcpConnector.connect(&addr, &options).await.err().unwrap();
        assert!(err.is_transport());
    }
}
