// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-process server end of a secure session.
//!
//! Drives the server role of the handshake, the key negotiation and the
//! framed application traffic, so client-side tests run against the full
//! protocol without a real deployment. Works over an in-memory pipe or an
//! accepted WebSocket.

// Each test crate exercises a different subset of the driver.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use fabstir_chat_sdk::cipher::{Decryptor, Encryptor};
use fabstir_chat_sdk::handshake::{
    ecdhe_psk, register, spake2p, ElementType, HandshakeMessage, HandshakePeer, Psk,
    RegistrationRecord,
};
use fabstir_chat_sdk::session::compression::{compress, decompress};
use fabstir_chat_sdk::session::{
    CompressionConfig, Connection, PipeConnection, PROTOCOL_PSK,
};

/// Accounts and issued resumption keys, shared across the connections of
/// one logical server.
#[derive(Default)]
pub struct ServerState {
    registrations: Mutex<HashMap<String, RegistrationRecord>>,
    resumption_keys: Mutex<HashMap<Vec<u8>, Psk>>,
    key_counter: AtomicU64,
    report_under_attack: AtomicBool,
}

impl ServerState {
    pub fn new() -> Arc<Self> {
        // Route SDK logs into the harness capture of whichever test runs first.
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Arc::new(Self::default())
    }

    /// Create an account the SPAKE2+ handshake can authenticate against.
    pub fn add_account(&self, username: &str, password: &str) {
        let record = register(username, password).expect("registration");
        self.registrations
            .lock()
            .unwrap()
            .insert(username.to_string(), record);
    }

    pub fn add_record(&self, username: &str, record: RegistrationRecord) {
        self.registrations
            .lock()
            .unwrap()
            .insert(username.to_string(), record);
    }

    /// Report `wasUnderAttack` in the next negotiation response.
    pub fn flag_under_attack(&self) {
        self.report_under_attack.store(true, Ordering::SeqCst);
    }

    pub fn issued_key_count(&self) -> u64 {
        self.key_counter.load(Ordering::SeqCst)
    }
}

/// The transport under one server-side connection.
pub enum ServerTransport {
    Pipe(PipeConnection),
    WebSocket(WebSocketStream<TcpStream>),
}

impl ServerTransport {
    async fn send(&mut self, data: Vec<u8>) {
        match self {
            Self::Pipe(pipe) => pipe.send(data).await.expect("pipe send"),
            Self::WebSocket(stream) => stream
                .send(Message::Binary(data))
                .await
                .expect("websocket send"),
        }
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        match self {
            Self::Pipe(pipe) => pipe.receive().await.expect("pipe receive"),
            Self::WebSocket(stream) => loop {
                match stream.next().await {
                    Some(Ok(Message::Binary(data))) => break Some(data),
                    Some(Ok(Message::Close(_))) => {
                        // Finish the closing handshake so the client sees
                        // an orderly shutdown. The sink-level close flushes
                        // the queued reply; `close(None)` would refuse to
                        // send after the peer's close frame.
                        let _ = SinkExt::close(stream).await;
                        break None;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => break None,
                }
            },
        }
    }
}

/// Server end of one connection: handshake, negotiation, framed traffic.
pub struct TestServer {
    transport: ServerTransport,
    state: Arc<ServerState>,
    encryptor: Option<Encryptor>,
    decryptor: Option<Decryptor>,
    plaintext_frames: bool,
    compression: CompressionConfig,
}

impl TestServer {
    pub fn new(transport: ServerTransport, state: Arc<ServerState>) -> Self {
        Self {
            transport,
            state,
            encryptor: None,
            decryptor: None,
            plaintext_frames: false,
            compression: CompressionConfig::default(),
        }
    }

    pub fn over_pipe(pipe: PipeConnection, state: Arc<ServerState>) -> Self {
        Self::new(ServerTransport::Pipe(pipe), state)
    }

    /// Serve one authentication handshake and the key negotiation that
    /// follows it. Returns the protocol the client picked.
    pub async fn handshake(&mut self) -> u8 {
        let first = self.transport.recv().await.expect("first handshake frame");
        let first = HandshakeMessage::parse(&first).expect("parse first handshake frame");
        let protocol = first
            .get_element(ElementType::ProtocolType)
            .and_then(|value| value.first().copied())
            .expect("protocol selector");

        let mut peer: Box<dyn HandshakePeer> = if protocol == PROTOCOL_PSK {
            let state = Arc::clone(&self.state);
            Box::new(ecdhe_psk::Server::new(move |index: &[u8]| {
                state.resumption_keys.lock().unwrap().get(index).cloned()
            }))
        } else {
            let state = Arc::clone(&self.state);
            Box::new(spake2p::Server::new(move |username: &str| {
                state.registrations.lock().unwrap().get(username).cloned()
            }))
        };

        let mut peer_message = Some(first);
        loop {
            let reply = peer
                .next_message(peer_message.as_ref())
                .expect("handshake step");
            if let Some(reply) = reply {
                self.transport.send(reply.serialize()).await;
            }
            if peer.is_complete() {
                break;
            }
            let data = self.transport.recv().await.expect("handshake frame");
            peer_message = Some(HandshakeMessage::parse(&data).expect("parse handshake frame"));
        }

        // Server writes under the server key and reads under the client
        // key, mirroring the client.
        let mut encryptor =
            Encryptor::new(peer.server_key().expect("server key").as_bytes()).unwrap();
        let mut decryptor =
            Decryptor::new(peer.client_key().expect("client key").as_bytes()).unwrap();

        // Negotiation rides the fresh keys uncompressed.
        let request = self.transport.recv().await.expect("negotiation request");
        let request = decryptor.decrypt(&request).expect("decrypt negotiation");
        let request: Value = serde_json::from_slice(&request).expect("negotiation json");
        let turn_off = request["turnOffEncryption"]
            .as_bool()
            .expect("turnOffEncryption flag");

        let key: [u8; 32] = rand::random();
        let index = format!(
            "key-{}",
            self.state.key_counter.fetch_add(1, Ordering::SeqCst)
        );
        self.state
            .resumption_keys
            .lock()
            .unwrap()
            .insert(index.clone().into_bytes(), Psk::from_slice(&key).unwrap());
        let response = json!({
            "sessionResumptionKey": URL_SAFE_NO_PAD.encode(key),
            "sessionResumptionKeyIndex": index,
            "wasUnderAttack": self.state.report_under_attack.swap(false, Ordering::SeqCst),
        });
        let response = serde_json::to_vec(&response).unwrap();
        self.transport
            .send(encryptor.encrypt(&response).expect("encrypt negotiation"))
            .await;

        self.plaintext_frames = turn_off;
        self.encryptor = Some(encryptor);
        self.decryptor = Some(decryptor);
        protocol
    }

    /// Receive one application frame; `None` when the client closed.
    pub async fn recv_app(&mut self) -> Option<Vec<u8>> {
        let frame = self.transport.recv().await?;
        let frame = if self.plaintext_frames {
            frame
        } else {
            self.decryptor
                .as_mut()
                .expect("handshake not served")
                .decrypt(&frame)
                .expect("decrypt application frame")
        };
        Some(decompress(&frame).expect("decompress application frame"))
    }

    /// Send one application frame.
    pub async fn send_app(&mut self, data: &[u8]) {
        let frame = compress(data, &self.compression).expect("compress application frame");
        let frame = if self.plaintext_frames {
            frame
        } else {
            self.encryptor
                .as_mut()
                .expect("handshake not served")
                .encrypt(&frame)
                .expect("encrypt application frame")
        };
        self.transport.send(frame).await;
    }

    /// Answer JSON requests through `respond` until the client closes.
    /// The handler returns the frames to send back for one request.
    pub async fn serve_json<F>(&mut self, mut respond: F)
    where
        F: FnMut(Value) -> Vec<Value>,
    {
        while let Some(frame) = self.recv_app().await {
            let request: Value = serde_json::from_slice(&frame).expect("request json");
            for reply in respond(request) {
                let data = serde_json::to_vec(&reply).unwrap();
                self.send_app(&data).await;
            }
        }
    }
}
