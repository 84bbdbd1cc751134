use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{encode_frame, scan_frame, Frame, FrameConfig, ScanState};
use crate::error::{FrameError, Result};

/// `tokio_util` codec over the brace-delimited JSON wire.
///
/// Decoding yields one [`Frame`] per top-level object. Encoding writes the
/// payload bytes as-is; callers pass a serialized JSON object.
///
/// A [`FrameError::FrameTooLarge`] from `decode` is reported once per
/// oversized object and the rest of that object is skipped. `FramedRead`
/// ends the stream after any decode error, so the server closes the
/// connection after replying.
#[derive(Debug, Default)]
pub struct JsonFrameCodec {
    state: ScanState,
    config: FrameConfig,
}

impl JsonFrameCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            state: ScanState::default(),
            config,
        }
    }
}

impl Decoder for JsonFrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        scan_frame(src, &mut self.state, self.config.max_frame_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.state.in_frame() {
            debug!(buffered = src.len(), "stream ended inside a frame");
            src.clear();
            self.state = ScanState::default();
            return Err(FrameError::ConnectionClosed);
        }
        src.clear();
        Ok(None)
    }
}

impl Encoder<Bytes> for JsonFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.config.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: item.len(),
                max: self.config.max_frame_size,
            });
        }
        encode_frame(&item, dst)
    }
}
