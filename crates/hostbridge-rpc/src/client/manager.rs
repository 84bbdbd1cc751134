use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::config::ClientConfig;
use super::transport::TransportClient;
use crate::error::Result;

/// Lazily connects and reuses one [`TransportClient`].
///
/// Construct one per process and share it (e.g. in an `Arc`). Callers that
/// find no live connection serialize on the manager, so at most one connect
/// attempt is in flight; a failed attempt leaves nothing behind and the next
/// call tries again.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ClientConfig,
    client: Mutex<Option<Arc<TransportClient>>>,
}

impl ConnectionManager {
    /// Create a manager. No connection is made until first use.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    /// Return the live connection, connecting first if there is none.
    pub async fn get_connection(&self) -> Result<Arc<TransportClient>> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            if client.is_connected() {
                return Ok(Arc::clone(client));
            }
            debug!(addr = %self.config.addr, "previous connection lost; reconnecting");
        }

        let client = Arc::new(TransportClient::connect(self.config.clone()).await?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Send a command over the managed connection.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        self.get_connection().await?.send_command(method, params).await
    }

    /// Whether a live connection is held.
    pub async fn is_connected(&self) -> bool {
        self.client
            .lock()
            .await
            .as_ref()
            .is_some_and(|client| client.is_connected())
    }

    /// Close and forget the current connection, if any.
    pub async fn disconnect(&self) {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client.close().await;
            info!(addr = %self.config.addr, "disconnected");
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
