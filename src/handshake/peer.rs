// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! The trait the session layer drives a handshake through.
//!
//! Handshake computation is pure CPU work, so the trait is synchronous;
//! the session layer owns the transport awaits between steps.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::aead::KEY_SIZE;
use crate::cipher::error::CipherError;
use crate::handshake::error::HandshakeError;
use crate::handshake::message::HandshakeMessage;

/// One directional 32-byte session key.
///
/// Wiped on drop. The debug representation never shows the key bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Wrap raw KDF output.
    ///
    /// # Errors
    ///
    /// Fails unless the slice is exactly [`KEY_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        let array: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CipherError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Either side of an authentication handshake.
///
/// The driver calls [`next_message`](HandshakePeer::next_message) in a
/// loop, feeding in each received frame; `Ok(None)` with
/// [`is_complete`](HandshakePeer::is_complete) true means there is nothing
/// more to send. Clients start the exchange with `next_message(None)`;
/// servers require a peer message on every call.
pub trait HandshakePeer: Send {
    /// Advance the handshake one step
    fn next_message(
        &mut self,
        peer_message: Option<&HandshakeMessage>,
    ) -> Result<Option<HandshakeMessage>, HandshakeError>;

    /// Whether the key schedule is established
    fn is_complete(&self) -> bool;

    /// Key protecting client-to-server frames.
    ///
    /// Only available once the handshake is complete; may be read
    /// repeatedly.
    fn client_key(&mut self) -> Result<SessionKey, HandshakeError>;

    /// Key protecting server-to-client frames
    fn server_key(&mut self) -> Result<SessionKey, HandshakeError>;
}
