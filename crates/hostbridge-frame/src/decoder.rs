use bytes::BytesMut;
use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::{scan_frame, Frame, FrameConfig, ScanState};
use crate::error::FrameError;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Push-style frame decoder.
///
/// Owns an append-only byte buffer. Each [`push`](Self::push) appends a chunk
/// and returns every object completed by it, keeping any trailing partial
/// object for the next chunk. The output does not depend on how the stream
/// was split into chunks.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    state: ScanState,
    config: FrameConfig,
}

impl FrameDecoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: ScanState::default(),
            config,
        }
    }

    /// Append `chunk` and return every frame it completes.
    ///
    /// An object that outgrows `max_frame_size` is dropped, including any of
    /// its bytes that arrive in later chunks. Decoding resumes at the object
    /// that follows it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            match scan_frame(&mut self.buf, &mut self.state, self.config.max_frame_size) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(FrameError::FrameTooLarge { size, max }) => {
                    warn!(size, max, "discarding oversized frame");
                }
                Err(err) => {
                    warn!(%err, "frame scan failed; clearing buffer");
                    self.reset();
                    break;
                }
            }
        }
        frames
    }

    /// Append `chunk` and return every complete object it yields, parsed.
    ///
    /// A balanced span that is not valid JSON is logged and skipped; the
    /// frames after it are still returned.
    pub fn push_json(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.push(chunk)
            .into_iter()
            .filter_map(|frame| match frame.parse::<Value>() {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(%err, size = frame.wire_size(), "discarding malformed JSON frame");
                    None
                }
            })
            .collect()
    }

    /// Bytes held for an object that has not closed yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Whether an object is partially buffered.
    pub fn has_partial(&self) -> bool {
        self.state.in_frame() && !self.state.is_discarding()
    }

    /// Drop all buffered bytes.
    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            debug!(discarded = self.buf.len(), "frame decoder reset");
        }
        self.buf.clear();
        self.state = ScanState::default();
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
