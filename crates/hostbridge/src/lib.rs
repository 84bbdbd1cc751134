//! Run commands on a privileged host thread from many JSON-RPC clients.
//!
//! hostbridge accepts JSON-RPC requests over TCP, marshals each command onto
//! a single host thread in arrival order, and correlates every response back
//! to its caller.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP bind, accept and connect with timeouts
//! - [`frame`]: brace-delimited JSON framing for the wire protocol
//! - [`schema`]: optional per-method JSON Schema validation (behind `schema` feature)
//! - [`rpc`]: protocol types, execution bridge, dispatcher, server and client
//!
//! The most used types are re-exported at the crate root.

/// Re-export transport types.
pub mod transport {
    pub use hostbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hostbridge_frame::*;
}

/// Re-export schema types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use hostbridge_schema::*;
}

/// Re-export rpc types.
pub mod rpc {
    pub use hostbridge_rpc::*;
}

pub use hostbridge_rpc::{
    ClientConfig, CommandDispatcher, CommandError, CommandRegistry, ConnectionManager,
    ExecutionBridge, HostSignal, HostThread, RpcError, RpcServer, ServerConfig, ServerHandle,
    TransportClient,
};
