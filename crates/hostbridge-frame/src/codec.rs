use bytes::{Buf, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{FrameError, Result};

/// Default maximum size of a single frame: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One complete top-level JSON object cut from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The raw object bytes, from the opening `{` through the matching `}`.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Size of the frame on the wire.
    pub fn wire_size(&self) -> usize {
        self.payload.len()
    }

    /// The frame as UTF-8 text.
    pub fn as_str(&self) -> Result<&str> {
        Ok(std::str::from_utf8(&self.payload)?)
    }

    /// Deserialize the frame.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Incremental scan position for [`scan_frame`].
///
/// Carried between calls so a frame that arrives over many reads is scanned
/// once, not once per read. Reset to the default after each emitted frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    discarding: bool,
}

impl ScanState {
    /// Whether the scanner is inside an unfinished object.
    pub fn in_frame(&self) -> bool {
        self.depth > 0
    }

    /// Whether the scanner is skipping the tail of an oversized object.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Feed one byte; returns true when it closes the outermost object.
    fn step(&mut self, byte: u8) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return false;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' => self.depth += 1,
            b'}' => {
                self.depth -= 1;
                return self.depth == 0;
            }
            _ => {}
        }
        false
    }
}

/// Append a raw payload to `dst`.
///
/// The payload must already be a single JSON object; the wire has no
/// delimiter of its own.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    dst.reserve(payload.len());
    dst.extend_from_slice(payload);
    Ok(())
}

/// Serialize `value` and append it to `dst`.
pub fn encode_json<T: Serialize>(value: &T, dst: &mut BytesMut) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    encode_frame(&payload, dst)
}

/// Cut the next complete object out of `src`.
///
/// Returns `Ok(None)` when the buffer holds no complete object yet; the
/// partial object stays in `src` untouched and `state` remembers how far it
/// was scanned. On success the frame bytes are consumed from `src`.
///
/// Between objects, whitespace is skipped silently and any other byte
/// (including a stray `}`) is discarded with a warning. Braces inside string
/// literals do not count toward nesting.
///
/// An object that grows past `max_frame_size` before it closes is reported
/// once with [`FrameError::FrameTooLarge`]. Its bytes are dropped, and later
/// calls keep tracking its nesting and strings while dropping the rest of it,
/// so scanning resumes exactly at the object that follows.
pub fn scan_frame(
    src: &mut BytesMut,
    state: &mut ScanState,
    max_frame_size: usize,
) -> Result<Option<Frame>> {
    if state.discarding && !skip_oversized_tail(src, state) {
        return Ok(None);
    }

    if !state.in_frame() {
        let skip = src.iter().position(|b| *b == b'{').unwrap_or(src.len());
        if skip > 0 {
            if src[..skip].iter().any(|b| !b.is_ascii_whitespace()) {
                warn!(discarded = skip, "discarding bytes outside of a JSON object");
            }
            src.advance(skip);
        }
        if src.is_empty() {
            return Ok(None);
        }
        *state = ScanState {
            pos: 1,
            depth: 1,
            ..ScanState::default()
        };
    }

    while state.pos < src.len() {
        let byte = src[state.pos];
        state.pos += 1;

        if state.step(byte) {
            let len = state.pos;
            *state = ScanState::default();
            if len > max_frame_size {
                src.advance(len);
                return Err(FrameError::FrameTooLarge {
                    size: len,
                    max: max_frame_size,
                });
            }
            return Ok(Some(Frame::new(src.split_to(len).freeze())));
        }
    }

    if state.pos > max_frame_size {
        let size = state.pos;
        src.advance(size);
        state.pos = 0;
        state.discarding = true;
        return Err(FrameError::FrameTooLarge {
            size,
            max: max_frame_size,
        });
    }

    Ok(None)
}

/// Drop bytes of an oversized object until it closes.
///
/// Returns true once the object has ended and `state` is back to idle.
fn skip_oversized_tail(src: &mut BytesMut, state: &mut ScanState) -> bool {
    match src.iter().position(|b| state.step(*b)) {
        Some(end) => {
            src.advance(end + 1);
            *state = ScanState::default();
            true
        }
        None => {
            src.clear();
            false
        }
    }
}

/// Configuration for framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum size of one object in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
