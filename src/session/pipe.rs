// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! In-memory connection pair.
//!
//! Gives two [`Connection`] handles whose sends come out of the other
//! side's receives. Used to run both ends of the protocol inside one
//! process, which is how the integration tests drive a real server peer
//! without a network.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::{Mutex, Notify};

use super::connection::Connection;
use super::error::SessionError;

/// One end of an in-memory duplex channel.
pub struct PipeConnection {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: AtomicBool,
    // Wakes a receive parked on an idle channel when this end closes;
    // `close` cannot take the rx lock away from it.
    closing: Notify,
}

/// Create a connected pair. Both ends start out open; `connect` is a no-op.
pub fn pipe() -> (PipeConnection, PipeConnection) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();
    (
        PipeConnection {
            tx: Mutex::new(Some(tx_a)),
            rx: Mutex::new(rx_b),
            closed: AtomicBool::new(false),
            closing: Notify::new(),
        },
        PipeConnection {
            tx: Mutex::new(Some(tx_b)),
            rx: Mutex::new(rx_a),
            closed: AtomicBool::new(false),
            closing: Notify::new(),
        },
    )
}

#[async_trait]
impl Connection for PipeConnection {
    async fn connect(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::ConnectionClosed);
        }
        Ok(())
    }

    async fn send(&self, data: Vec<u8>) -> Result<(), SessionError> {
        let tx = self.tx.lock().await;
        tx.as_ref()
            .and_then(|tx| tx.send(data).ok())
            .ok_or(SessionError::ConnectionClosed)
    }

    async fn receive(&self) -> Result<Option<Vec<u8>>, SessionError> {
        let mut rx = self.rx.lock().await;
        let closing = self.closing.notified();
        tokio::pin!(closing);
        // Register for the close signal before checking the flag, so a
        // close landing in between cannot be missed.
        closing.as_mut().enable();
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        tokio::select! {
            data = rx.recv() => Ok(data),
            _ = closing => Ok(None),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.closing.notify_waiters();
        // Dropping the sender ends the peer's receive stream; closing the
        // receiver makes the peer's sends fail.
        *self.tx.lock().await = None;
        self.rx.lock().await.close();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
