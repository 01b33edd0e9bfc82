// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error type shared by the cipher primitives

use thiserror::Error;

/// Errors raised by counters, AEAD framing, key derivation and group math
#[derive(Debug, Error)]
pub enum CipherError {
    /// The nonce counter exhausted its fixed width
    #[error("Counter overflow")]
    CounterOverflow,

    /// Two counters of different widths were compared
    #[error("Counter size mismatch")]
    CounterSizeMismatch,

    /// Incoming frame shorter than nonce plus tag
    #[error("Cipher text too short")]
    CipherTextTooShort,

    /// Frame counter at or below the replay floor
    #[error("Replay message detected")]
    ReplayDetected,

    /// AEAD seal failure
    #[error("Encryption failed")]
    EncryptionFailed,

    /// AEAD open failure (tag mismatch or corrupt frame)
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Key material has the wrong length
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required key width
        expected: usize,
        /// Width actually supplied
        actual: usize,
    },

    /// Point bytes failed to decompress onto the curve
    #[error("Invalid point encoding")]
    InvalidPoint,

    /// Scalar bytes are not a canonical mod-l encoding
    #[error("Invalid scalar encoding")]
    InvalidScalar,

    /// HKDF-Expand asked for more output than 255 blocks
    #[error("Requested KDF output too long: {requested} bytes")]
    KdfOutputTooLong {
        /// Requested output length
        requested: usize,
    },

    /// HKDF-Expand requires a 32-byte PRK
    #[error("Invalid PRK length: expected 32 bytes, got {actual}")]
    InvalidPrkLength {
        /// PRK width actually supplied
        actual: usize,
    },
}
