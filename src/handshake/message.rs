// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Handshake message framing.
//!
//! A handshake message is a TLV with 1-byte tags and 4-byte lengths.
//! Serialization is canonical (ascending tags), so either peer can
//! re-serialize a received message and obtain the exact bytes that were on
//! the wire.

use crate::handshake::tlv::{Tlv, TlvError};

const TAG_SIZE: usize = 1;
const LENGTH_SIZE: usize = 4;

/// Element tags carried by a handshake message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementType {
    /// Selects the handshake protocol: `[0]` SPAKE2+, `[1]` ECDHE-PSK
    ProtocolType = 0,
    /// The handshake payload for the current step
    CipherMessage = 1,
    /// Names the credential: UTF-8 username or resumption-key index
    KeyIndex = 2,
}

/// One handshake frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    tlv: Tlv,
}

impl HandshakeMessage {
    /// Create an empty message
    pub fn new() -> Self {
        Self {
            tlv: Tlv::new(TAG_SIZE, LENGTH_SIZE),
        }
    }

    /// Parse a received frame. Unknown tags are kept and ignored.
    pub fn parse(data: &[u8]) -> Result<Self, TlvError> {
        Ok(Self {
            tlv: Tlv::parse(TAG_SIZE, LENGTH_SIZE, data)?,
        })
    }

    /// Insert or overwrite an element
    pub fn set_element(&mut self, element: ElementType, value: Vec<u8>) {
        self.tlv.set(element as u64, value);
    }

    /// Look up an element
    pub fn get_element(&self, element: ElementType) -> Option<&[u8]> {
        self.tlv.get(element as u64)
    }

    /// Canonical wire bytes
    pub fn serialize(&self) -> Vec<u8> {
        self.tlv.serialize()
    }
}

impl Default for HandshakeMessage {
    fn default() -> Self {
        Self::new()
    }
}
