// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Little-endian monotonic counter backing the AEAD nonce scheme.
//!
//! The counter is a fixed-width byte array interpreted as a little-endian
//! integer. Incrementing ripples a carry upward from byte 0. Exhausting the
//! width is fatal rather than wrapping: a wrapped counter would reuse a
//! nonce under the same key.

use std::cmp::Ordering;

use crate::cipher::error::CipherError;

/// Fixed-width little-endian counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    bytes: Vec<u8>,
}

impl Counter {
    /// Create a zeroed counter of `size` bytes
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size],
        }
    }

    /// Adopt an existing counter value
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Width in bytes
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Current value, little-endian
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Advance the counter by one.
    ///
    /// # Errors
    ///
    /// [`CipherError::CounterOverflow`] once every byte wraps; the counter
    /// (and the key it was protecting) must be abandoned at that point.
    pub fn increment(&mut self) -> Result<(), CipherError> {
        for byte in self.bytes.iter_mut() {
            let (value, overflowed) = byte.overflowing_add(1);
            *byte = value;
            if !overflowed {
                return Ok(());
            }
        }
        Err(CipherError::CounterOverflow)
    }

    /// Numeric comparison against another counter of the same width.
    ///
    /// # Errors
    ///
    /// [`CipherError::CounterSizeMismatch`] when the widths differ; mixed
    /// widths indicate a programming error, not a protocol condition.
    pub fn compare(&self, other: &Counter) -> Result<Ordering, CipherError> {
        if self.bytes.len() != other.bytes.len() {
            return Err(CipherError::CounterSizeMismatch);
        }
        // Most significant byte lives at the end.
        for i in (0..self.bytes.len()).rev() {
            match self.bytes[i].cmp(&other.bytes[i]) {
                Ordering::Equal => continue,
                unequal => return Ok(unequal),
            }
        }
        Ok(Ordering::Equal)
    }
}
