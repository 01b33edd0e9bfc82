// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Transport and secure session layer.
//!
//! The [`Connection`] trait is the only seam between layers: the WebSocket
//! transport implements it, the in-memory [`pipe`] implements it, and
//! [`SecureConnection`] both consumes and implements it. Stacking looks
//! like:
//!
//! ```text
//! RpcClient
//!   └─ SecureConnection      handshake, AEAD, compression
//!        └─ WebSocketConnection | PipeConnection
//! ```

pub mod compression;
pub mod connection;
pub mod error;
pub mod pipe;
pub mod secure;
pub mod websocket;

pub use compression::CompressionConfig;
pub use connection::Connection;
pub use error::SessionError;
pub use pipe::{pipe, PipeConnection};
pub use secure::{SecureConnection, SessionConfig, PROTOCOL_PASSWORD, PROTOCOL_PSK};
pub use websocket::WebSocketConnection;
