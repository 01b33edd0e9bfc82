// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tag-length-value codec for handshake framing.
//!
//! Tags and lengths are little-endian with configurable widths. Elements
//! serialize in ascending tag order, which makes the encoding canonical:
//! both peers re-serializing the same element map produce identical bytes.
//! The ECDHE-PSK transcript hash depends on that property.

use std::collections::BTreeMap;
use thiserror::Error;

/// TLV parse failures
#[derive(Debug, Error)]
pub enum TlvError {
    /// Data ended inside a tag/length header
    #[error("Invalid TLV data: not enough data for type and length")]
    TruncatedHeader,

    /// Declared value length runs past the end of the data
    #[error("Invalid TLV data: not enough data for value")]
    TruncatedValue,
}

/// Sorted tag-to-value map with fixed-width wire framing.
///
/// Both widths are in bytes and must be between 1 and 8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    elements: BTreeMap<u64, Vec<u8>>,
    tag_size: usize,
    length_size: usize,
}

impl Tlv {
    /// Create an empty map with the given field widths
    pub fn new(tag_size: usize, length_size: usize) -> Self {
        debug_assert!((1..=8).contains(&tag_size));
        debug_assert!((1..=8).contains(&length_size));
        Self {
            elements: BTreeMap::new(),
            tag_size,
            length_size,
        }
    }

    /// Parse a serialized element sequence.
    ///
    /// Duplicate tags keep the last occurrence. Empty input parses to an
    /// empty map.
    pub fn parse(tag_size: usize, length_size: usize, data: &[u8]) -> Result<Self, TlvError> {
        let mut tlv = Self::new(tag_size, length_size);
        let mut offset = 0usize;
        while offset < data.len() {
            if offset + tag_size + length_size > data.len() {
                return Err(TlvError::TruncatedHeader);
            }
            let tag = read_le(&data[offset..offset + tag_size]);
            offset += tag_size;
            let value_len = read_le(&data[offset..offset + length_size]);
            offset += length_size;
            if value_len > (data.len() - offset) as u64 {
                return Err(TlvError::TruncatedValue);
            }
            let value_len = value_len as usize;
            tlv.elements
                .insert(tag, data[offset..offset + value_len].to_vec());
            offset += value_len;
        }
        Ok(tlv)
    }

    /// Insert or overwrite an element
    pub fn set(&mut self, tag: u64, value: Vec<u8>) {
        self.elements.insert(tag, value);
    }

    /// Look up an element's value
    pub fn get(&self, tag: u64) -> Option<&[u8]> {
        self.elements.get(&tag).map(Vec::as_slice)
    }

    /// Serialize all elements in ascending tag order
    pub fn serialize(&self) -> Vec<u8> {
        let total: usize = self
            .elements
            .values()
            .map(|v| self.tag_size + self.length_size + v.len())
            .sum();
        let mut out = Vec::with_capacity(total);
        for (tag, value) in &self.elements {
            write_le(&mut out, *tag, self.tag_size);
            write_le(&mut out, value.len() as u64, self.length_size);
            out.extend_from_slice(value);
        }
        out
    }
}

fn read_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn write_le(out: &mut Vec<u8>, mut value: u64, width: usize) {
    for _ in 0..width {
        out.push((value & 0xFF) as u8);
        value >>= 8;
    }
}
