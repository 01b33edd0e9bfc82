// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::cipher::CipherError;
use crate::handshake::{HandshakeError, TlvError};

/// Errors reported by the transport and session layers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Neither credentials nor a resumption key are available.
    #[error("No credential provided")]
    NoCredential,

    /// The peer went away mid-exchange, or an operation needed an open
    /// transport and found none.
    #[error("Connection closed")]
    ConnectionClosed,

    /// `connect` called while the transport is already open.
    #[error("Connection is already open")]
    AlreadyOpen,

    /// The negotiation response is missing fields or malformed.
    #[error("Invalid server response")]
    InvalidServerResponse,

    /// A frame arrived with a compression tag we do not know.
    #[error("Unknown compression type")]
    UnknownCompressionType,

    /// `send` was called before the handshake installed the outgoing cipher.
    #[error("Encryption not established")]
    EncryptionNotEstablished,

    /// `receive` was called before the handshake installed the incoming cipher.
    #[error("Decryption not established")]
    DecryptionNotEstablished,

    /// The endpoint URL did not parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Transport-level WebSocket failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The authenticated key exchange failed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// A handshake frame failed to parse.
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// An application frame failed authenticated decryption, or the
    /// outgoing counter ran out.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// A negotiation payload could not be encoded.
    #[error("Invalid negotiation payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The zstd layer rejected a frame.
    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),
}
