//! TCP transport for hostbridge.
//!
//! This is the lowest layer of hostbridge. It binds the listening socket the
//! server accepts on and opens outbound client connections with a bounded
//! connect timeout. Framing and protocol concerns live in the crates above.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{connect, TcpTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT};
