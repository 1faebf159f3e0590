//! Message payload codec: tagged JSON document, zlib compressed.
//!
//! The decoder only knows the tags of [`Value`]; anything else in the
//! document is a [`DecodeError`], never a constructed object.

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

use crate::value::Value;

/// Upper bound for a decompressed payload document.
pub const MAX_DOCUMENT_SIZE: usize = 64 * 1024 * 1024;

/// Deepest run of nested sequences/mappings a payload may carry. Every
/// tagged container costs the JSON parser two levels of its 128-level
/// recursion limit and the innermost leaf one more, so 63 is the most the
/// decoder accepts; `encode` enforces the same bound.
pub const MAX_NESTING_DEPTH: usize = 63;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("value contains a non-finite float")]
    NonFiniteFloat,
    #[error("value nests deeper than {max} sequences or mappings")]
    TooDeep { max: usize },
    #[error("failed to serialize value: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to compress payload: {0}")]
    Compress(#[source] io::Error),
    #[error("frame payload too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: u32 },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decompress payload: {0}")]
    Decompress(#[source] io::Error),
    #[error("decompressed document exceeds {max} bytes")]
    DocumentTooLarge { max: usize },
    #[error("malformed or disallowed document: {0}")]
    Document(#[from] serde_json::Error),
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: u32, max: u32 },
}

/// Serialize and compress a value.
pub fn encode(value: &Value) -> Result<Vec<u8>, EncodeError> {
    if value.nests_deeper_than(MAX_NESTING_DEPTH) {
        return Err(EncodeError::TooDeep {
            max: MAX_NESTING_DEPTH,
        });
    }
    if !value.is_finite() {
        return Err(EncodeError::NonFiniteFloat);
    }
    let document = serde_json::to_vec(value)?;
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(document.len() / 2 + 16),
        Compression::default(),
    );
    encoder
        .write_all(&document)
        .map_err(EncodeError::Compress)?;
    encoder.finish().map_err(EncodeError::Compress)
}

/// Decompress and deserialize a payload produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<Value, DecodeError> {
    decode_with_limit(bytes, MAX_DOCUMENT_SIZE)
}

pub fn decode_with_limit(bytes: &[u8], max_document: usize) -> Result<Value, DecodeError> {
    let mut document = Vec::new();
    ZlibDecoder::new(bytes)
        .take(max_document as u64 + 1)
        .read_to_end(&mut document)
        .map_err(DecodeError::Decompress)?;
    if document.len() > max_document {
        return Err(DecodeError::DocumentTooLarge { max: max_document });
    }
    let value = serde_json::from_slice(&document)?;
    Ok(value)
}
