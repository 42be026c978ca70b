use apirpc_common::protocol::error::{ApiRpcError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Shared, mutable list of server endpoints.
///
/// Cloning yields another handle to the same list, so changes made through
/// [`ApiClient::servers`](crate::ApiClient::servers) are seen by the next
/// connection attempt.
#[derive(Debug, Clone, Default)]
pub struct ServerList {
    inner: Arc<RwLock<Vec<String>>>,
}

impl ServerList {
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(servers)),
        }
    }

    /// Parses a comma-separated endpoint list, skipping blank entries.
    ///
    /// ```rust
    /// use apirpc_client::ServerList;
    ///
    /// let servers = ServerList::parse("tcp://a:1, b:2,,");
    /// assert_eq!(servers.snapshot(), vec!["tcp://a:1", "b:2"]);
    /// ```
    pub fn parse(servers: &str) -> Self {
        Self::new(
            servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// Replaces the whole list.
    pub fn set(&self, servers: Vec<String>) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = servers;
    }

    pub fn add(&self, server: impl Into<String>) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(server.into());
    }

    /// Removes every occurrence of `server`, returning whether any was found.
    pub fn remove(&self, server: &str) -> bool {
        let mut servers = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let before = servers.len();
        servers.retain(|s| s != server);
        servers.len() != before
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Round-robin endpoint selector.
///
/// Every connection attempt takes the next cursor value, so concurrent
/// attempts start at different endpoints. From its start index an attempt
/// tries each endpoint once, in list order, until one connects.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the next starting index for a list of `len` endpoints.
    ///
    /// Returns 0 for an empty list without advancing the cursor.
    pub fn start_index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.cursor.fetch_add(1, Ordering::Relaxed) % len
    }

    /// Connects to the first reachable endpoint, starting at the next
    /// round-robin index.
    ///
    /// # Errors
    ///
    /// - [`ApiRpcError::Configuration`] for an empty list
    /// - the error of the last endpoint tried when all of them fail
    pub async fn connect_first<T, F, Fut>(&self, servers: &[String], mut connect: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if servers.is_empty() {
            return Err(ApiRpcError::Configuration("Server list is empty".to_string()));
        }

        let len = servers.len();
        let start = self.start_index(len);
        let mut last_error = None;

        for i in 0..len {
            let endpoint = &servers[(start + i) % len];
            match connect(endpoint.clone()).await {
                Ok(conn) => {
                    debug!(%endpoint, "connected");
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "failed to connect");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ApiRpcError::Connection("No endpoint could be reached".to_string())))
    }
}
