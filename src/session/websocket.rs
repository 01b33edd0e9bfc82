// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Client WebSocket transport.
//!
//! Carries the session protocol as binary WebSocket messages, one frame
//! per message. Text frames are ignored; the protocol is binary only.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use super::connection::Connection;
use super::error::SessionError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket-backed [`Connection`].
///
/// The writer and reader halves live behind separate locks so sends do not
/// block a task parked in [`Connection::receive`]. Lock order is always
/// writer before reader.
pub struct WebSocketConnection {
    url: Url,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: Mutex<Option<SplitStream<WsStream>>>,
    closed: AtomicBool,
}

impl WebSocketConnection {
    /// Build a transport for `host_and_path`, given without a scheme;
    /// `use_tls` selects `wss://` over `ws://`.
    pub fn new(host_and_path: &str, use_tls: bool) -> Result<Self, SessionError> {
        let scheme = if use_tls { "wss" } else { "ws" };
        let url = Url::parse(&format!("{scheme}://{host_and_path}"))?;
        Ok(Self {
            url,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            closed: AtomicBool::new(true),
        })
    }

    /// The full endpoint URL including the scheme.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn connect(&self) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        let mut reader = self.reader.lock().await;
        if writer.is_some() && !self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::AlreadyOpen);
        }
        // Stale halves from a dropped connection are discarded here.
        *writer = None;
        *reader = None;

        debug!(url = %self.url, "connecting websocket");
        let (stream, _response) = connect_async(self.url.as_str()).await?;
        let (sink, source) = stream.split();
        *writer = Some(sink);
        *reader = Some(source);
        self.closed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, data: Vec<u8>) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(SessionError::ConnectionClosed)?;
        sink.send(Message::Binary(data)).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Vec<u8>>, SessionError> {
        let mut reader = self.reader.lock().await;
        let source = match reader.as_mut() {
            Some(source) => source,
            None => return Ok(None),
        };
        let result = loop {
            match source.next().await {
                Some(Ok(Message::Binary(data))) => break Ok(Some(data)),
                Some(Ok(Message::Close(_))) | None => break Ok(None),
                // Text, ping and pong frames are not part of the protocol.
                Some(Ok(_)) => continue,
                Some(Err(e)) => break Err(SessionError::from(e)),
            }
        };
        if !matches!(result, Ok(Some(_))) {
            *reader = None;
            self.closed.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            // Best effort; the peer may already be gone.
            let _ = sink.send(Message::Close(None)).await;
        }
        let mut reader = self.reader.lock().await;
        *reader = None;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
