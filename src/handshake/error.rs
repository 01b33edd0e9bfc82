// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Handshake failure modes shared by both authentication protocols

use thiserror::Error;

use crate::cipher::error::CipherError;
use crate::handshake::message::ElementType;
use crate::handshake::step::StepError;
use crate::handshake::tlv::TlvError;

/// Errors aborting a handshake.
///
/// Any error here is terminal for the peer that produced it: the step
/// checker is left unstable and the connection must be re-established with
/// fresh credentials.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// A message was supplied where none is allowed
    #[error("Unexpected peer message")]
    UnexpectedPeerMessage,

    /// The current step requires a peer message
    #[error("Missing peer message")]
    MissingPeerMessage,

    /// The peer drove the exchange past its last step
    #[error("Exceeding max call count")]
    ExceedingMaxCallCount,

    /// Message exchange attempted after the handshake finished
    #[error("Invalid step in {0} handshake")]
    InvalidDispatchStep(&'static str),

    /// Additional first-message elements may not use reserved tags
    #[error("Invalid additional element type: {0:?}")]
    InvalidAdditionalElement(ElementType),

    /// A required element is absent from the peer message
    #[error("Missing handshake element: {0:?}")]
    MissingElement(ElementType),

    /// An element had the wrong exact length
    #[error("Invalid message length: expected {expected} bytes, got {actual}")]
    InvalidMessageLength {
        /// Required length
        expected: usize,
        /// Length actually received
        actual: usize,
    },

    /// An element fell short of its minimum length
    #[error("Handshake message too short: expected at least {minimum} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum acceptable length
        minimum: usize,
        /// Length actually received
        actual: usize,
    },

    /// A looked-up pre-shared key had the wrong length
    #[error("Invalid PSK length: expected {expected} bytes, got {actual}")]
    InvalidPskLength {
        /// Required length
        expected: usize,
        /// Length of the stored key
        actual: usize,
    },

    /// No registration record for the presented username
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// No pre-shared key for the presented key index
    #[error("Unknown key index: {0}")]
    UnknownKeyIndex(String),

    /// The key index is not valid UTF-8 where a username is expected
    #[error("Key index is not valid UTF-8")]
    InvalidKeyIndexEncoding,

    /// The Diffie-Hellman share produced an all-zero shared secret
    #[error("Weak peer public key")]
    WeakPublicKey,

    /// A PAKE share collapsed to the identity element
    #[error("Degenerate handshake share")]
    DegenerateShare,

    /// The server's proof did not decrypt to the client share
    #[error("ShareP ConfirmV mismatch")]
    ConfirmVMismatch,

    /// The client's proof did not decrypt to the server share
    #[error("Invalid confirm P")]
    ConfirmPMismatch,

    /// An ECDHE confirmation did not match the transcript hash
    #[error("Confirmation message does not match transcript hash")]
    ConfirmationMismatch,

    /// Session keys requested before the handshake finished
    #[error("Handshake not complete")]
    HandshakeNotComplete,

    /// Required state from an earlier step is absent
    #[error("Internal handshake state missing")]
    MissingInternalState,

    /// The password hash rejected its inputs
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// Step sequencing violation
    #[error(transparent)]
    Step(#[from] StepError),

    /// Frame parse failure
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// Underlying cipher failure
    #[error(transparent)]
    Cipher(#[from] CipherError),
}
