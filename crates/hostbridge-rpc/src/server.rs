use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hostbridge_frame::{FrameConfig, FrameError, JsonFrameCodec};
use hostbridge_transport::{TcpTransport, DEFAULT_PORT};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::CommandDispatcher;
use crate::error::Result;
use crate::protocol::{ErrorObject, Response};

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind. Default: `127.0.0.1:8080`.
    pub bind_addr: String,
    /// Maximum concurrent connections; further connections are closed on
    /// accept. `None` means unlimited.
    pub max_connections: Option<usize>,
    /// Framing limits applied to every connection.
    pub frame: FrameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            max_connections: None,
            frame: FrameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Override the bind address.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Cap concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Override framing limits.
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}

/// Cloneable handle for stopping a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// Stop accepting and close every connection after its current request.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// TCP listener serving JSON-RPC requests through a [`CommandDispatcher`].
///
/// Every accepted connection gets its own task. Requests on one connection
/// are handled in order, one at a time; connections are independent of each
/// other up to the host thread, where all commands share one FIFO queue.
pub struct RpcServer<C> {
    transport: TcpTransport,
    dispatcher: Arc<CommandDispatcher<C>>,
    config: ServerConfig,
    shutdown: CancellationToken,
    next_conn_id: AtomicU64,
}

impl<C: 'static> RpcServer<C> {
    /// Bind the listening socket.
    pub async fn bind(config: ServerConfig, dispatcher: CommandDispatcher<C>) -> Result<Self> {
        let transport = TcpTransport::bind(config.bind_addr.as_str()).await?;
        Ok(Self {
            transport,
            dispatcher: Arc::new(dispatcher),
            config,
            shutdown: CancellationToken::new(),
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// The bound address (useful after binding port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// A handle that can stop this server from elsewhere.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
            local_addr: self.local_addr(),
        }
    }

    /// Accept connections until shutdown, then wait for open connections
    /// to finish their current request.
    ///
    /// Accept failures are logged and do not stop the server.
    pub async fn serve(self) -> Result<()> {
        let limit = self
            .config
            .max_connections
            .map(|max| Arc::new(Semaphore::new(max)));
        let mut connections = JoinSet::new();

        info!(addr = %self.local_addr(), "rpc server accepting connections");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.transport.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(%err, "accept failed");
                            continue;
                        }
                    };

                    let permit = match &limit {
                        Some(limit) => match Arc::clone(limit).try_acquire_owned() {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                warn!(%peer, "connection limit reached; refusing connection");
                                continue;
                            }
                        },
                        None => None,
                    };

                    let seq = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                    let conn_id = format!("conn-{seq}");
                    info!(%conn_id, %peer, "client connected");

                    let dispatcher = Arc::clone(&self.dispatcher);
                    let frame = self.config.frame.clone();
                    let shutdown = self.shutdown.child_token();
                    connections.spawn(async move {
                        let _permit = permit;
                        serve_connection(conn_id, stream, dispatcher, frame, shutdown).await;
                    });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(err) = joined {
                        error!(%err, "connection task failed");
                    }
                }
            }
        }

        info!(open = connections.len(), "rpc server shutting down");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

type ResponseSink = FramedWrite<OwnedWriteHalf, JsonFrameCodec>;

async fn serve_connection<C: 'static>(
    conn_id: String,
    stream: TcpStream,
    dispatcher: Arc<CommandDispatcher<C>>,
    frame: FrameConfig,
    shutdown: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let mut requests = FramedRead::new(read_half, JsonFrameCodec::with_config(frame.clone()));
    let mut responses = FramedWrite::new(write_half, JsonFrameCodec::with_config(frame));
    let mut handled = 0u64;

    let reason = loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break "server shutting down",
            next = requests.next() => next,
        };

        match next {
            None => break "client disconnected",
            Some(Ok(frame)) => {
                handled += 1;
                let Some(response) = dispatcher.dispatch_bytes(&frame.payload).await else {
                    continue;
                };
                if let Err(err) = write_response(&mut responses, response).await {
                    warn!(%conn_id, %err, "failed to write response");
                    break "write failed";
                }
            }
            Some(Err(FrameError::FrameTooLarge { size, max })) => {
                warn!(%conn_id, size, max, "request frame too large; closing connection");
                let response = Response::error(
                    None,
                    ErrorObject::parse_error(format!("request exceeds {max} bytes")),
                );
                let _ = write_response(&mut responses, response).await;
                break "request too large";
            }
            Some(Err(FrameError::ConnectionClosed)) => break "client disconnected mid-request",
            Some(Err(err)) => {
                warn!(%conn_id, %err, "read failed");
                break "read failed";
            }
        }
    };

    info!(%conn_id, handled, reason, "connection closed");
}

/// Write one response. A response too large for the frame limit is
/// replaced by an internal error carrying the same id.
async fn write_response(sink: &mut ResponseSink, response: Response) -> Result<()> {
    let payload = Bytes::from(serde_json::to_vec(&response)?);
    match sink.send(payload).await {
        Err(FrameError::FrameTooLarge { size, max }) => {
            debug!(size, max, "response too large; sending error instead");
            let message = format!("response of {size} bytes exceeds {max} bytes");
            let fallback = Response::error(response.id, ErrorObject::internal_error(message));
            sink.send(Bytes::from(serde_json::to_vec(&fallback)?)).await?;
            Ok(())
        }
        other => Ok(other?),
    }
}
