// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cipher primitives for the secure channel.
//!
//! ## Components
//!
//! - **counter**: little-endian monotonic counters (AEAD nonces)
//! - **aead**: ChaCha20-Poly1305 framing with replay protection
//! - **kdf**: the restricted HKDF-SHA256 used by both handshakes
//! - **group**: edwards25519 scalar/point helpers for SPAKE2+
//!
//! Everything in here is synchronous, deterministic given its inputs, and
//! free of I/O; the session layer owns all asynchrony.

pub mod aead;
pub mod counter;
pub mod error;
pub mod group;
pub mod kdf;

pub use aead::{Decryptor, Encryptor, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use counter::Counter;
pub use error::CipherError;
