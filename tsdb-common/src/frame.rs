//! # Response Framing
//!
//! Purpose: Turn an arbitrary TCP byte stream into discrete response frames,
//! tolerating any split of the stream into chunks.
//!
//! ## Design Principles
//! 1. **Length-Prefixed**: Frames never depend on a delimiter inside the payload.
//! 2. **Pure Step Function**: `decode_frame` only touches the buffer it is given.
//! 3. **Retain the Tail**: Incomplete bytes stay in the buffer verbatim.
//! 4. **Fail on Proof Only**: A short buffer means "wait", never "error".
//!
//! ## Frame Layout
//!
//! ```text
//! +-----------+-----------------+----------------------+
//! | status:1B | length:8B (BE)  | payload: length bytes|
//! +-----------+-----------------+----------------------+
//! status: 0x01 success, 0x00 failure
//! ```

use std::borrow::Cow;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Size of the fixed response header (status byte + u64 length).
pub const HEADER_LEN: usize = 9;

/// Default ceiling for a single payload. `GET ALL` replies can be large, but
/// anything past this is treated as a desynchronised stream.
pub const DEFAULT_MAX_FRAME_LEN: u64 = 256 * 1024 * 1024;

const STATUS_FAILURE: u8 = 0x00;
const STATUS_SUCCESS: u8 = 0x01;

/// One complete server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// True when the server reported success.
    pub success: bool,
    /// Raw payload bytes (UTF-8 text by convention).
    pub payload: Bytes,
}

impl Frame {
    /// Builds a frame from a status flag and payload.
    pub fn new(success: bool, payload: impl Into<Bytes>) -> Self {
        Frame {
            success,
            payload: payload.into(),
        }
    }

    /// Decodes the payload as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Total number of bytes this frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

/// Appends the wire encoding of `frame` to `out`.
///
/// Used by servers and test harnesses; the client only decodes.
pub fn encode_frame(frame: &Frame, out: &mut BytesMut) {
    out.reserve(frame.wire_len());
    out.put_u8(if frame.success {
        STATUS_SUCCESS
    } else {
        STATUS_FAILURE
    });
    out.put_u64(frame.payload.len() as u64);
    out.put_slice(&frame.payload);
}

/// Attempts to split one frame off the front of `buf`.
///
/// **Input**: accumulated bytes and the payload ceiling.
/// **Output**: `Ok(Some(frame))` when a whole frame was present (exactly
/// `9 + length` bytes are consumed), `Ok(None)` when more bytes are needed
/// (the buffer is left untouched).
///
/// **Logic**:
/// 1. Validate the status byte as soon as it is visible.
/// 2. Once the header is complete, validate the declared length.
/// 3. Split header + payload off only when the payload is fully buffered.
pub fn decode_frame(buf: &mut BytesMut, max_len: u64) -> ProtocolResult<Option<Frame>> {
    let status = match buf.first() {
        Some(&status) => status,
        None => return Ok(None),
    };
    let success = match status {
        STATUS_SUCCESS => true,
        STATUS_FAILURE => false,
        other => return Err(ProtocolError::InvalidStatus(other)),
    };

    if buf.len() < HEADER_LEN {
        return Ok(None);
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&buf[1..HEADER_LEN]);
    let len = u64::from_be_bytes(len_bytes);
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }

    let len = usize::try_from(len).map_err(|_| ProtocolError::FrameTooLarge {
        len,
        max: usize::MAX as u64,
    })?;
    if buf.len() - HEADER_LEN < len {
        return Ok(None);
    }

    buf.advance(HEADER_LEN);
    let payload = buf.split_to(len).freeze();
    Ok(Some(Frame { success, payload }))
}

/// Result of one [`FrameDecoder::feed`] call.
///
/// Frames that were complete before a corrupt header are kept, since their
/// bytes have already left the buffer.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Complete frames, in stream order.
    pub frames: Vec<Frame>,
    /// Set when the stream turned out to be corrupt after `frames`.
    pub error: Option<ProtocolError>,
}

impl Decoded {
    /// Collapses into a plain result, discarding frames if an error was hit.
    pub fn into_result(self) -> ProtocolResult<Vec<Frame>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.frames),
        }
    }
}

/// Stateful accumulator that yields frames as chunks arrive.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_len: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        FrameDecoder::new()
    }
}

impl FrameDecoder {
    /// Creates a decoder with the default payload ceiling.
    pub fn new() -> Self {
        FrameDecoder::with_max_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates a decoder with an explicit payload ceiling.
    pub fn with_max_len(max_len: u64) -> Self {
        FrameDecoder {
            buffer: BytesMut::with_capacity(4 * 1024),
            max_len,
        }
    }

    /// Appends `bytes` and returns every frame that is now complete, in order.
    ///
    /// An empty chunk is a no-op. Decoding stops at the first corrupt header:
    /// the frames before it are returned alongside the error and the corrupt
    /// bytes stay buffered. The stream is unrecoverable at that point and the
    /// owner should drop it.
    pub fn feed(&mut self, bytes: &[u8]) -> Decoded {
        if !bytes.is_empty() {
            self.buffer.extend_from_slice(bytes);
        }

        let mut decoded = Decoded::default();
        loop {
            match decode_frame(&mut self.buffer, self.max_len) {
                Ok(Some(frame)) => decoded.frames.push(frame),
                Ok(None) => break,
                Err(err) => {
                    decoded.error = Some(err);
                    break;
                }
            }
        }
        decoded
    }

    /// Number of buffered bytes not yet forming a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any buffered residue.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
