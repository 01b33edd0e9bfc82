// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ChaCha20-Poly1305 framing with counter nonces and replay protection.
//!
//! Every frame on the wire is `nonce(12) || ciphertext+tag`. The nonce is a
//! little-endian counter advanced before each encryption, so the first
//! frame a fresh [`Encryptor`] emits carries counter value 1, never 0. The
//! [`Decryptor`] accepts only frames whose counter is strictly greater than
//! the last one it authenticated; anything else is treated as a replay.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use std::cmp::Ordering;

use crate::cipher::counter::Counter;
use crate::cipher::error::CipherError;

/// AEAD key width in bytes
pub const KEY_SIZE: usize = 32;
/// IETF ChaCha20-Poly1305 nonce width in bytes
pub const NONCE_SIZE: usize = 12;
/// Poly1305 tag width in bytes
pub const TAG_SIZE: usize = 16;

fn new_cipher(key: &[u8]) -> Result<ChaCha20Poly1305, CipherError> {
    ChaCha20Poly1305::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: key.len(),
    })
}

/// Sending half of an encrypted channel
pub struct Encryptor {
    cipher: ChaCha20Poly1305,
    counter: Counter,
}

impl Encryptor {
    /// Create an encryptor with a zeroed counter.
    ///
    /// # Errors
    ///
    /// Fails if the key is not exactly [`KEY_SIZE`] bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        Ok(Self {
            cipher: new_cipher(key)?,
            counter: Counter::new(NONCE_SIZE),
        })
    }

    /// Encrypt one frame.
    ///
    /// The counter is advanced before use and its value doubles as both the
    /// nonce and the frame's position in the stream.
    ///
    /// # Errors
    ///
    /// Counter exhaustion or an AEAD failure. After an error the encryptor
    /// must not be reused.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.counter.increment()?;
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(self.counter.bytes()), plaintext)
            .map_err(|_| CipherError::EncryptionFailed)?;
        let mut frame = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        frame.extend_from_slice(self.counter.bytes());
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }
}

/// Receiving half of an encrypted channel
pub struct Decryptor {
    cipher: ChaCha20Poly1305,
    last_counter: Counter,
}

impl Decryptor {
    /// Create a decryptor with the replay floor at zero.
    ///
    /// # Errors
    ///
    /// Fails if the key is not exactly [`KEY_SIZE`] bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        Ok(Self {
            cipher: new_cipher(key)?,
            last_counter: Counter::new(NONCE_SIZE),
        })
    }

    /// Decrypt one frame.
    ///
    /// # Errors
    ///
    /// * [`CipherError::CipherTextTooShort`] — frame shorter than
    ///   nonce plus tag.
    /// * [`CipherError::ReplayDetected`] — frame counter not strictly
    ///   greater than the replay floor (checked before any decryption
    ///   work).
    /// * [`CipherError::DecryptionFailed`] — authentication failure; the
    ///   replay floor is left untouched so a garbage frame cannot burn
    ///   counter space.
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CipherError::CipherTextTooShort);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let candidate = Counter::from_bytes(nonce_bytes);
        if candidate.compare(&self.last_counter)? != Ordering::Greater {
            return Err(CipherError::ReplayDetected);
        }
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::DecryptionFailed)?;
        // Adopt the counter only once the frame authenticated.
        self.last_counter = candidate;
        Ok(plaintext)
    }
}
