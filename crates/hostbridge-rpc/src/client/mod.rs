//! Client side: one correlated connection and a lazily connecting manager.

mod config;
mod id;
mod manager;
mod pending;
mod transport;

pub use config::ClientConfig;
pub use id::generate_request_id;
pub use manager::ConnectionManager;
pub use pending::PendingRequestTable;
pub use transport::TransportClient;
