//! Brace-delimited JSON message framing.
//!
//! The hostbridge wire carries bare JSON objects back to back, with no
//! length prefix and no newline delimiter. A reader finds message
//! boundaries by tracking `{`/`}` nesting depth, skipping braces that
//! appear inside string literals. One socket read may deliver half a
//! message or several of them; the types here hide that.
//!
//! - [`FrameDecoder`] is the push-style buffer: feed it chunks, get back
//!   every complete object.
//! - `JsonFrameCodec` (feature `async`) plugs the same scanner into
//!   `tokio_util::codec`.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod decoder;
pub mod error;

#[cfg(feature = "async")]
pub use async_codec::JsonFrameCodec;
pub use codec::{
    encode_frame, encode_json, scan_frame, Frame, FrameConfig, ScanState, DEFAULT_MAX_FRAME_SIZE,
};
pub use decoder::FrameDecoder;
pub use error::{FrameError, Result};
