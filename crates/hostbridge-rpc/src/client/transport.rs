use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::SinkExt;
use hostbridge_frame::{FrameDecoder, JsonFrameCodec};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::FramedWrite;
use tracing::{debug, info, warn};

use super::config::ClientConfig;
use super::id::generate_request_id;
use super::pending::{CallResult, PendingRequestTable};
use crate::error::{Result, RpcError};
use crate::protocol::{Request, RequestId, Response};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// One outbound connection with response correlation.
///
/// A background task reads the socket, reassembles frames and completes the
/// matching pending call. Calls from many tasks may be in flight at once; the
/// server answers each one with its own id.
pub struct TransportClient {
    config: ClientConfig,
    writer: Mutex<FramedWrite<OwnedWriteHalf, JsonFrameCodec>>,
    pending: PendingRequestTable,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl TransportClient {
    /// Connect to `config.addr`, bounded by `config.connect_timeout`.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let stream = hostbridge_transport::connect(&config.addr, config.connect_timeout).await?;
        let (read_half, write_half) = stream.into_split();

        let pending = PendingRequestTable::new();
        let connected = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_responses(
            read_half,
            FrameDecoder::with_config(config.frame.clone()),
            pending.clone(),
            Arc::clone(&connected),
            config.addr.clone(),
        ));
        let codec = JsonFrameCodec::with_config(config.frame.clone());
        let writer = FramedWrite::new(write_half, codec);

        info!(addr = %config.addr, "connected to server");
        Ok(Self {
            config,
            writer: Mutex::new(writer),
            pending,
            connected,
            reader,
        })
    }

    /// Send a command and wait for its result.
    ///
    /// Resolves with the response's `result`, or fails with
    /// [`RpcError::Remote`] for an error response, [`RpcError::Timeout`]
    /// after `request_timeout`, or [`RpcError::Disconnected`] if the
    /// connection drops first.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        let id = RequestId::Str(generate_request_id());
        self.call(Request::new(method, params, id.clone()), id).await
    }

    /// Send a notification. No response is expected or awaited.
    ///
    /// The write is bounded by `request_timeout`.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.ensure_connected()?;
        let timeout = self.config.request_timeout;
        let request = Request::notification(method, params);
        match tokio::time::timeout(timeout, self.write(&request)).await {
            Ok(written) => written,
            Err(_) => {
                warn!(method, ?timeout, "notification write timed out");
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Register, write and wait, all under one deadline.
    async fn call(&self, request: Request, id: RequestId) -> Result<Value> {
        let timeout = self.config.request_timeout;
        let deadline = Instant::now() + timeout;

        self.ensure_connected()?;
        let mut completion = self.pending.register(id.clone(), request.method.as_str())?;

        // The reader flags the disconnect before failing pending calls, so a
        // call registered after that sweep is caught here.
        if !self.is_connected() {
            self.pending.expire(&id);
            return Err(self.disconnected());
        }

        // A peer that stops reading stalls the write; the deadline still holds.
        match tokio::time::timeout_at(deadline, self.write(&request)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.pending.expire(&id);
                return Err(err);
            }
            Err(_) if self.pending.expire(&id) => {
                warn!(%id, method = %request.method, ?timeout, "command timed out while sending");
                return Err(RpcError::Timeout {
                    method: request.method,
                    timeout,
                });
            }
            Err(_) => return self.settle(completion.await),
        }
        debug!(%id, method = %request.method, pending = self.pending.len(), "request sent");

        match tokio::time::timeout_at(deadline, &mut completion).await {
            Ok(outcome) => self.settle(outcome),
            Err(_) if self.pending.expire(&id) => {
                warn!(%id, method = %request.method, ?timeout, "command timed out");
                Err(RpcError::Timeout {
                    method: request.method,
                    timeout,
                })
            }
            // Completed while the timer fired; take the outcome.
            Err(_) => self.settle(completion.await),
        }
    }

    fn settle(
        &self,
        outcome: std::result::Result<CallResult, oneshot::error::RecvError>,
    ) -> Result<Value> {
        outcome.unwrap_or_else(|_| Err(self.disconnected()))
    }

    async fn write(&self, request: &Request) -> Result<()> {
        let payload = Bytes::from(serde_json::to_vec(request)?);
        let mut writer = self.writer.lock().await;
        writer.send(payload).await?;
        Ok(())
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(self.disconnected())
        }
    }

    fn disconnected(&self) -> RpcError {
        RpcError::Disconnected(format!("not connected to {}", self.config.addr))
    }

    /// Whether the connection is still open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of calls awaiting a response.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Server address.
    pub fn addr(&self) -> &str {
        &self.config.addr
    }

    /// Close the connection, failing any calls still in flight.
    pub async fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.reader.abort();
        let failed = self
            .pending
            .fail_all(|| RpcError::Disconnected("connection closed by client".into()));
        if let Err(err) = self.writer.lock().await.get_mut().shutdown().await {
            debug!(%err, "socket shutdown failed");
        }
        info!(addr = %self.config.addr, failed, "connection closed");
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("addr", &self.config.addr)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending.len())
            .finish()
    }
}

async fn read_responses(
    mut socket: OwnedReadHalf,
    mut decoder: FrameDecoder,
    pending: PendingRequestTable,
    connected: Arc<AtomicBool>,
    addr: String,
) {
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let reason = loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) => break "server closed the connection".to_string(),
            Ok(n) => n,
            Err(err) => break err.to_string(),
        };
        for value in decoder.push_json(&chunk[..n]) {
            match serde_json::from_value::<Response>(value) {
                Ok(response) => {
                    pending.resolve(response);
                }
                Err(err) => warn!(%addr, %err, "discarding message that is not a response"),
            }
        }
    };

    connected.store(false, Ordering::SeqCst);
    let failed = pending.fail_all(|| RpcError::Disconnected(reason.clone()));
    info!(%addr, %reason, failed, "connection lost");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hostbridge_frame::FrameConfig;
    use serde_json::json;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::host::HostThread;
    use crate::server::{RpcServer, ServerConfig, ServerHandle};
    use crate::test_support::spawn_test_host;

    async fn start_server() -> (HostThread, ServerHandle) {
        let (host, dispatcher) = spawn_test_host();
        let config = ServerConfig::default().with_bind_addr("127.0.0.1:0");
        let server = RpcServer::bind(config, dispatcher).await.unwrap();
        let handle = server.handle();
        tokio::spawn(server.serve());
        (host, handle)
    }

    fn config_for(addr: impl ToString) -> ClientConfig {
        ClientConfig::with_addr(addr.to_string()).request_timeout(Duration::from_secs(5))
    }

    /// Accept one connection and collect the requests it sends.
    async fn read_requests(stream: &mut TcpStream, count: usize) -> Vec<Value> {
        let mut decoder = FrameDecoder::new();
        let mut requests = Vec::new();
        let mut chunk = [0u8; 1024];
        while requests.len() < count {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0);
            requests.extend(decoder.push_json(&chunk[..n]));
        }
        requests
    }

    #[tokio::test]
    async fn send_command_round_trip() {
        let (_host, server) = start_server().await;
        let client = TransportClient::connect(config_for(server.local_addr())).await.unwrap();

        let result = client.send_command("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
        assert_eq!(client.pending(), 0);
    }

    #[tokio::test]
    async fn remote_error_is_rejected_with_code() {
        let (_host, server) = start_server().await;
        let client = TransportClient::connect(config_for(server.local_addr())).await.unwrap();

        let err = client
            .send_command("get_parameter", json!({"name": "missing"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::Remote { code: -32001, ref message, .. } if message == "not found"
        ));

        let err = client.send_command("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Remote { code: -32601, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_share_one_connection() {
        let (_host, server) = start_server().await;
        let client = TransportClient::connect(config_for(server.local_addr())).await.unwrap();
        let client = Arc::new(client);

        let calls: Vec<_> = (0..16)
            .map(|n| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.send_command("echo", json!({"n": n})).await })
            })
            .collect();
        for (n, call) in calls.into_iter().enumerate() {
            assert_eq!(call.await.unwrap().unwrap(), json!({"n": n}));
        }
    }

    #[tokio::test]
    async fn responses_out_of_order_reach_their_callers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let requests = read_requests(&mut stream, 2).await;
            // Answer the second request first, split across two writes.
            let second = json!({"id": requests[1]["id"], "result": "second"}).to_string();
            let first = json!({"id": requests[0]["id"], "result": "first"}).to_string();
            let (head, tail) = second.split_at(7);
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            stream.write_all(format!("{tail}{first}").as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let client = TransportClient::connect(config_for(addr)).await.unwrap();
        let (a, b) = tokio::join!(
            client.send_command("first", json!({})),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                client.send_command("second", json!({})).await
            }
        );
        assert_eq!(a.unwrap(), "first");
        assert_eq!(b.unwrap(), "second");
    }

    #[tokio::test]
    async fn silent_server_times_out_and_late_response_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (late_tx, late_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let requests = read_requests(&mut stream, 1).await;
            let _ = late_rx.await;
            let late = json!({"id": requests[0]["id"], "result": "late"}).to_string();
            let _ = stream.write_all(late.as_bytes()).await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let config =
            ClientConfig::with_addr(addr.to_string()).request_timeout(Duration::from_millis(100));
        let client = TransportClient::connect(config).await.unwrap();

        let err = client.send_command("sleep", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout { ref method, .. } if method == "sleep"));
        assert_eq!(client.pending(), 0);

        late_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.is_connected());
        assert_eq!(client.pending(), 0);
    }

    #[tokio::test]
    async fn stalled_write_is_bounded_by_request_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            // Hold the connection open without ever reading from it.
            let (_stream, _) = listener.accept().await.unwrap();
            let _ = done_rx.await;
        });

        let config = ClientConfig::with_addr(addr.to_string())
            .request_timeout(Duration::from_millis(200))
            .frame_config(FrameConfig {
                max_frame_size: 64 * 1024 * 1024,
            });
        let client = TransportClient::connect(config).await.unwrap();
        // Far more than loopback socket buffers absorb.
        let blob = "x".repeat(32 * 1024 * 1024);

        let started = std::time::Instant::now();
        let (big, small) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(client.send_command("echo", json!({ "blob": blob })), async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                client.send_command("echo", json!({})).await
            })
        })
        .await
        .expect("calls must resolve within their own timeout");

        assert!(matches!(big, Err(RpcError::Timeout { ref method, .. }) if method == "echo"));
        assert!(matches!(small, Err(RpcError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(client.pending(), 0);
        let _ = done_tx.send(());
    }

    #[tokio::test]
    async fn disconnect_fails_pending_calls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_requests(&mut stream, 1).await;
            // Drop the connection without answering.
        });

        let client = TransportClient::connect(config_for(addr)).await.unwrap();
        let err = client.send_command("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Disconnected(_)));
        assert!(!client.is_connected());

        let err = client.send_command("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Disconnected(_)));
    }

    #[tokio::test]
    async fn notify_gets_no_response_but_runs() {
        let (_host, server) = start_server().await;
        let client = TransportClient::connect(config_for(server.local_addr())).await.unwrap();

        client
            .notify("set_parameter", json!({"name": "N", "value": 3}))
            .await
            .unwrap();
        assert_eq!(client.pending(), 0);
        let value = client
            .send_command("get_parameter", json!({"name": "N"}))
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn close_rejects_further_calls() {
        let (_host, server) = start_server().await;
        let client = TransportClient::connect(config_for(server.local_addr())).await.unwrap();
        client.close().await;
        assert!(!client.is_connected());
        assert!(matches!(
            client.send_command("echo", json!({})).await,
            Err(RpcError::Disconnected(_))
        ));
    }

    #[tokio::test]
    async fn connect_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TransportClient::connect(config_for(addr)).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }
}
