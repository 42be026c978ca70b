//! ApiRpc Client
//!
//! Load-balancing, failover-capable client for ApiRpc servers.
//!
//! # Architecture
//!
//! - [`Pool`]: generic bounded object pool with scoped checkouts
//! - [`RoundRobin`] / [`ServerList`]: endpoint selection over a mutable
//!   server list
//! - [`EndpointFactory`] / [`Connector`]: builds and opens one connection per
//!   pool miss
//! - [`Session`]: send with failover across connections
//! - [`ApiClient`]: open/close lifecycle, invocation with a single retry on
//!   401 and timeout reporting
//!
//! # Example
//!
//! ```rust,no_run
//! use apirpc_client::ApiClient;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::builder()
//!     .servers("tcp://127.0.0.1:7000")
//!     .timeout(Duration::from_secs(5))
//!     .build();
//!
//! if client.open().await? {
//!     let actions: Vec<String> = client.invoke_async("Api/All", None, 0).await?;
//!     println!("{:?}", actions);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod factory;
pub mod pool;
pub mod selector;
pub mod session;

#[cfg(test)]
mod testing;

pub use client::{ApiClient, ApiClientBuilder, ClientStatus};
pub use config::{ClientConfig, PoolConfig};
pub use factory::{ConnectOptions, Connector, EndpointFactory, TcpConnector};
pub use pool::{Pool, PoolFactory, PoolStats, Pooled};
pub use selector::{RoundRobin, ServerList};
pub use session::{ConnectionPool, Session};
