use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::api::RequestHandler;
use crate::protocol::error::{ApiRpcError, Result};
use crate::protocol::Message;
use crate::transport::codec::FrameCodec;

/// Async TCP server speaking the ApiRpc frame protocol.
///
/// Each accepted connection runs on its own task and processes requests in
/// order until the peer disconnects. A handler returning `None` (one-way
/// requests) writes nothing back.
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    codec: FrameCodec,
}

impl TcpServer {
    /// Binds a server to `bind_addr` (e.g. "0.0.0.0:7000").
    pub async fn bind(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            ApiRpcError::Connection(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        Ok(Self {
            listener,
            codec: FrameCodec::default(),
        })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| ApiRpcError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Serves requests through a [`RequestHandler`].
    pub async fn serve(&self, handler: Arc<dyn RequestHandler>) -> Result<()> {
        self.run_with_handler(move |msg| {
            let handler = handler.clone();
            async move { handler.handle(msg).await }
        })
        .await
    }

    /// Accepts connections forever, answering each request with `handler`.
    pub async fn run_with_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Message>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = self.listener.accept().await.map_err(|e| {
                ApiRpcError::Connection(format!("Failed to accept connection: {}", e))
            })?;

            debug!(%peer_addr, "connection established");

            let handler = handler.clone();
            let codec = self.codec.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, codec, handler).await {
                    warn!(%peer_addr, error = %e, "connection error");
                }
            });
        }
    }
}

async fn handle_connection<F, Fut>(mut stream: TcpStream, codec: FrameCodec, handler: Arc<F>) -> Result<()>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Message>> + Send + 'static,
{
    let _ = stream.set_nodelay(true);

    while let Some(request) = codec.read_frame(&mut stream).await? {
        if request.reply {
            debug!(sequence = request.sequence, "ignoring unsolicited reply");
            continue;
        }

        if let Some(reply) = handler(request).await {
            codec.write_frame(&mut stream, &reply).await?;
        }
    }

    info!("connection closed by peer");
    Ok(())
}
