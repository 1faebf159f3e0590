// Length-prefixed framing: a 4-byte big-endian payload length followed by
// the encoded payload. `FrameBuffer` is the receive side; it accumulates
// whatever the socket delivered and yields complete payloads in order.

use crate::codec::{DecodeError, EncodeError};

pub const LENGTH_PREFIX: usize = 4;

/// Default ceiling for a single frame payload (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Prefix `payload` with its length.
pub fn encode_frame(payload: &[u8], max_frame_size: u32) -> Result<Vec<u8>, EncodeError> {
    if payload.len() > max_frame_size as usize {
        return Err(EncodeError::FrameTooLarge {
            len: payload.len(),
            max: max_frame_size,
        });
    }
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

#[derive(Debug, Clone)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
    max_frame_size: u32,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameBuffer {
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_size,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete payload, or `None` while the frame is partial.
    ///
    /// An oversized length prefix is an error; the stream cannot be
    /// resynchronised after it, so callers should discard the buffer.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        if self.buffer.len() < LENGTH_PREFIX {
            return Ok(None);
        }
        let mut len_bytes = [0u8; LENGTH_PREFIX];
        len_bytes.copy_from_slice(&self.buffer[..LENGTH_PREFIX]);
        let len = u32::from_be_bytes(len_bytes);
        if len > self.max_frame_size {
            return Err(DecodeError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }
        let end = LENGTH_PREFIX + len as usize;
        if self.buffer.len() < end {
            return Ok(None);
        }
        let payload = self.buffer[LENGTH_PREFIX..end].to_vec();
        self.buffer.drain(..end);
        Ok(Some(payload))
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
