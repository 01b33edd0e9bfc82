// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Registration record export and import.
//!
//! A new user runs the password hash locally and sends the server a compact
//! base64 string instead of the password. The string is a TLV container
//! with one-byte tags and four-byte lengths, carrying the username, the
//! salt, both verifier values and optional public metadata as JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use thiserror::Error;

use crate::cipher::group::{decode_point, decode_scalar, encode_point};
use crate::handshake::error::HandshakeError;
use crate::handshake::spake2p::{register, RegistrationRecord, SALT_SIZE};
use crate::handshake::tlv::{Tlv, TlvError};

const TAG_SIZE: usize = 1;
const LENGTH_SIZE: usize = 4;

enum RegistrationTag {
    Username = 0,
    Salt = 1,
    W0 = 2,
    L = 3,
    PublicMetadata = 4,
}

/// Failures while producing or reading a registration string.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A required TLV element is absent.
    #[error("Invalid registration string: missing {0}")]
    MissingElement(&'static str),

    /// An element is present but cannot be decoded.
    #[error("Invalid registration string: invalid {0}")]
    InvalidElement(&'static str),

    /// The outer base64 wrapper is malformed.
    #[error("Invalid registration string: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The TLV container is malformed.
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// The metadata payload is not valid JSON.
    #[error("Invalid registration metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// Deriving the verifier values failed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

/// Everything a server needs to enroll one user.
pub struct RegistrationExport {
    pub username: String,
    pub record: RegistrationRecord,
    /// Free-form JSON the user chose to publish, e.g. a display name.
    pub public_metadata: Option<Value>,
}

/// Derive a fresh registration record and pack it for transport.
///
/// Runs the full Argon2id derivation, so expect it to take a noticeable
/// fraction of a second.
pub fn export_registration(
    username: &str,
    password: &str,
    public_metadata: Option<&Value>,
) -> Result<String, RegistrationError> {
    let record = register(username, password)?;

    let mut tlv = Tlv::new(TAG_SIZE, LENGTH_SIZE);
    tlv.set(
        RegistrationTag::Username as u64,
        username.as_bytes().to_vec(),
    );
    tlv.set(RegistrationTag::Salt as u64, record.salt.to_vec());
    tlv.set(RegistrationTag::W0 as u64, record.w0.to_bytes().to_vec());
    tlv.set(RegistrationTag::L as u64, encode_point(&record.l).to_vec());
    if let Some(metadata) = public_metadata {
        tlv.set(
            RegistrationTag::PublicMetadata as u64,
            serde_json::to_vec(metadata)?,
        );
    }

    Ok(STANDARD.encode(tlv.serialize()))
}

/// Unpack a registration string back into its typed record.
pub fn parse_registration(registration: &str) -> Result<RegistrationExport, RegistrationError> {
    let raw = STANDARD.decode(registration)?;
    let tlv = Tlv::parse(TAG_SIZE, LENGTH_SIZE, &raw)?;

    let username = tlv
        .get(RegistrationTag::Username as u64)
        .ok_or(RegistrationError::MissingElement("username"))?;
    let username = std::str::from_utf8(username)
        .map_err(|_| RegistrationError::InvalidElement("username"))?
        .to_owned();

    let salt_bytes = tlv
        .get(RegistrationTag::Salt as u64)
        .ok_or(RegistrationError::MissingElement("salt"))?;
    let salt: [u8; SALT_SIZE] = salt_bytes
        .try_into()
        .map_err(|_| RegistrationError::InvalidElement("salt"))?;

    let w0_bytes = tlv
        .get(RegistrationTag::W0 as u64)
        .ok_or(RegistrationError::MissingElement("w0"))?;
    let w0 = decode_scalar(w0_bytes).map_err(|_| RegistrationError::InvalidElement("w0"))?;

    let l_bytes = tlv
        .get(RegistrationTag::L as u64)
        .ok_or(RegistrationError::MissingElement("L"))?;
    let l = decode_point(l_bytes).map_err(|_| RegistrationError::InvalidElement("L"))?;

    let public_metadata = match tlv.get(RegistrationTag::PublicMetadata as u64) {
        Some(bytes) => Some(serde_json::from_slice(bytes)?),
        None => None,
    };

    Ok(RegistrationExport {
        username,
        record: RegistrationRecord { w0, l, salt },
        public_metadata,
    })
}
