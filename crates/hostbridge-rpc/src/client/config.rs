use std::time::Duration;

use hostbridge_frame::FrameConfig;
use hostbridge_transport::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT};

/// Default time to wait for a command's response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for [`TransportClient`](super::TransportClient) and
/// [`ConnectionManager`](super::ConnectionManager).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address. Default: `127.0.0.1:8080`.
    pub addr: String,
    /// Maximum time to establish the connection.
    pub connect_timeout: Duration,
    /// Maximum time to wait for each response.
    pub request_timeout: Duration,
    /// Framing limits for responses.
    pub frame: FrameConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            frame: FrameConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Config for the given server address.
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Override the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override framing limits.
    pub fn frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}
