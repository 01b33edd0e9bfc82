// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Restricted HKDF-SHA256.
//!
//! Extract feeds the salt straight in as the HMAC key, which caps usable
//! salts at one SHA-256 block; every salt in this protocol is at most 32
//! bytes, so the output matches RFC 5869 bit for bit. Expand is the
//! standard counter-mode HMAC chain. Keep the restriction: the handshake
//! transcripts depend on this exact construction.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::cipher::error::CipherError;

/// PRK width produced by [`extract`]
pub const PRK_SIZE: usize = 32;

/// HKDF-Extract: `HMAC-SHA256(key = salt, msg = ikm)`
pub fn extract(salt: &[u8], ikm: &[u8]) -> [u8; PRK_SIZE] {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
    prk.into()
}

/// HKDF-Expand to `length` bytes of output keyed by `info`.
///
/// # Errors
///
/// * [`CipherError::InvalidPrkLength`] — the PRK must be exactly
///   [`PRK_SIZE`] bytes.
/// * [`CipherError::KdfOutputTooLong`] — `length` exceeds 255 blocks
///   (8160 bytes).
pub fn expand(length: usize, info: &[u8], prk: &[u8]) -> Result<Vec<u8>, CipherError> {
    if prk.len() != PRK_SIZE {
        return Err(CipherError::InvalidPrkLength { actual: prk.len() });
    }
    let hk = Hkdf::<Sha256>::from_prk(prk)
        .map_err(|_| CipherError::InvalidPrkLength { actual: prk.len() })?;
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm)
        .map_err(|_| CipherError::KdfOutputTooLong { requested: length })?;
    Ok(okm)
}
