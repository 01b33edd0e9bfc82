// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! edwards25519 group arithmetic for the PAKE handshake.
//!
//! Scalars are little-endian mod-l values, points travel compressed, and
//! peer-supplied encodings must decompress cleanly or the handshake aborts.
//! Scalar-base multiplication here is plain `x * B` on edwards25519 with no
//! clamping; this is not the X25519 function.

use curve25519_dalek::edwards::CompressedEdwardsY;
use rand::rngs::OsRng;

pub use curve25519_dalek::edwards::EdwardsPoint;
pub use curve25519_dalek::scalar::Scalar;

use crate::cipher::error::CipherError;

/// Scalar width in bytes
pub const SCALAR_SIZE: usize = 32;
/// Compressed point width in bytes
pub const POINT_SIZE: usize = 32;

/// Generate a uniformly random scalar
pub fn random_scalar() -> Scalar {
    Scalar::random(&mut OsRng)
}

/// Decode and validate a compressed point received from a peer.
///
/// # Errors
///
/// [`CipherError::InvalidPoint`] when the slice is not [`POINT_SIZE`]
/// bytes or does not decompress onto the curve.
pub fn decode_point(bytes: &[u8]) -> Result<EdwardsPoint, CipherError> {
    let array: [u8; POINT_SIZE] = bytes.try_into().map_err(|_| CipherError::InvalidPoint)?;
    CompressedEdwardsY(array)
        .decompress()
        .ok_or(CipherError::InvalidPoint)
}

/// Decode a canonical scalar, e.g. a stored registration verifier.
///
/// # Errors
///
/// [`CipherError::InvalidScalar`] when the slice is not [`SCALAR_SIZE`]
/// bytes or is not a canonical mod-l encoding.
pub fn decode_scalar(bytes: &[u8]) -> Result<Scalar, CipherError> {
    let array: [u8; SCALAR_SIZE] = bytes.try_into().map_err(|_| CipherError::InvalidScalar)?;
    Option::<Scalar>::from(Scalar::from_canonical_bytes(array)).ok_or(CipherError::InvalidScalar)
}

/// Compressed byte form of a point
pub fn encode_point(point: &EdwardsPoint) -> [u8; POINT_SIZE] {
    point.compress().to_bytes()
}
