// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;

use super::error::SessionError;

/// A bidirectional message channel.
///
/// Implementations keep their state behind interior mutability so one
/// shared handle can serve a sender and a receive loop concurrently. The
/// secure session wraps any `Connection` and is itself one, so layers
/// stack.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Open the channel. Fails if it is already open.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Deliver one message to the peer.
    async fn send(&self, data: Vec<u8>) -> Result<(), SessionError>;

    /// Wait for the next message. `Ok(None)` means the peer closed the
    /// channel in an orderly way; errors are transport faults.
    async fn receive(&self) -> Result<Option<Vec<u8>>, SessionError>;

    /// Tear the channel down. Idempotent.
    async fn close(&self);

    /// Whether the channel is currently unusable.
    fn is_closed(&self) -> bool;
}
