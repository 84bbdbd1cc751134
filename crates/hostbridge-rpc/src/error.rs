use std::time::Duration;

use serde_json::Value;

use crate::protocol::{ErrorObject, RequestId};

/// Errors that can occur in bridge, server and client operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] hostbridge_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] hostbridge_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The execution bridge refused or lost the work item.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// I/O error outside the transport layer (e.g. spawning the host thread).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response arrived within the request timeout.
    #[error("command timed out after {timeout:?}: {method}")]
    Timeout { method: String, timeout: Duration },

    /// The connection dropped before a response arrived.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// The server answered with a JSON-RPC error object.
    #[error("{message} (code {code})")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// A request id was reused while the first call was still pending.
    #[error("request id {0} is already pending")]
    DuplicateId(RequestId),
}

impl From<ErrorObject> for RpcError {
    fn from(error: ErrorObject) -> Self {
        Self::Remote {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

/// Errors raised by the [`ExecutionBridge`](crate::ExecutionBridge).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// `submit` was called before the host thread initialized the bridge.
    #[error("execution bridge used before initialization")]
    NotInitialized,

    /// `initialize` was called a second time.
    #[error("execution bridge already initialized")]
    AlreadyInitialized,

    /// `submit` was called from the host thread, which would wait on itself.
    #[error("submit called from the host thread")]
    ReentrantSubmit,

    /// The bridge was closed and accepts no more work.
    #[error("execution bridge is closed")]
    Closed,

    /// The work item was dropped before it ran.
    #[error("work item cancelled before it ran")]
    Cancelled,

    /// The work item panicked on the host thread.
    #[error("work item panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, RpcError>;
