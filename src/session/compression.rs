// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Per-frame compression envelope.
//!
//! Every application frame starts with a one-byte tag: `0` for raw bytes,
//! `1` for a zstd frame. The sender only compresses when it actually pays
//! off, so tiny payloads and high-entropy data (anything already encrypted
//! or compressed) skip the codec entirely.

use serde::{Deserialize, Serialize};

use super::error::SessionError;

const COMPRESSION_NONE: u8 = 0;
const COMPRESSION_ZSTD: u8 = 1;

/// Tuning for the compression envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Frames shorter than this are never compressed.
    pub min_size: usize,
    /// Zstd compression level.
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            min_size: 100,
            level: 3,
        }
    }
}

fn envelope(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(1 + body.len());
    framed.push(tag);
    framed.extend_from_slice(body);
    framed
}

/// Wrap a frame in the compression envelope.
///
/// Falls back to the raw encoding when the frame is below the size
/// threshold or when the compressed form plus its tag byte would not be
/// smaller than the original.
pub fn compress(data: &[u8], config: &CompressionConfig) -> Result<Vec<u8>, SessionError> {
    if data.len() < config.min_size {
        return Ok(envelope(COMPRESSION_NONE, data));
    }
    let compressed = zstd::stream::encode_all(data, config.level)?;
    if compressed.len() + 1 >= data.len() {
        return Ok(envelope(COMPRESSION_NONE, data));
    }
    Ok(envelope(COMPRESSION_ZSTD, &compressed))
}

/// Undo [`compress`]. An empty frame or an unrecognized tag is an error.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, SessionError> {
    let (&tag, body) = data
        .split_first()
        .ok_or(SessionError::UnknownCompressionType)?;
    match tag {
        COMPRESSION_NONE => Ok(body.to_vec()),
        COMPRESSION_ZSTD => Ok(zstd::stream::decode_all(body)?),
        _ => Err(SessionError::UnknownCompressionType),
    }
}
