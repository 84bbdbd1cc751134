//! JSON-RPC bridge between network clients and a single host thread.
//!
//! Many clients connect over TCP and send JSON-RPC requests. Every command
//! runs on one privileged host thread, in arrival order, and each caller
//! gets its own correlated response.
//!
//! Server side:
//! - [`RpcServer`] accepts connections and reads frames per connection.
//! - [`CommandDispatcher`] validates a request, looks up its handler in the
//!   [`CommandRegistry`] and builds the response.
//! - [`ExecutionBridge`] queues the handler call and runs it on the host
//!   thread when the host signals it; [`HostThread`] is a ready-made host
//!   loop for processes that own their privileged thread.
//!
//! Client side:
//! - [`TransportClient`] owns one connection and correlates responses.
//! - [`ConnectionManager`] lazily connects and reuses a `TransportClient`.

pub mod bridge;
pub mod client;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod protocol;
pub mod registry;
pub mod server;

#[cfg(test)]
mod test_support;

pub use bridge::{ExecutionBridge, HostSignal};
pub use client::{ClientConfig, ConnectionManager, PendingRequestTable, TransportClient};
pub use command::{parse_params, CommandError, CommandHandler};
pub use dispatcher::CommandDispatcher;
pub use error::{BridgeError, Result, RpcError};
pub use host::HostThread;
pub use protocol::{ErrorCode, ErrorObject, Request, RequestId, Response, JSONRPC_VERSION};
pub use registry::CommandRegistry;
pub use server::{RpcServer, ServerConfig, ServerHandle};
