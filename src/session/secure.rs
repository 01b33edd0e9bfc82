// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Authenticated, encrypted, compressed session over any [`Connection`].
//!
//! `SecureConnection` wraps a raw transport and runs the handshake when
//! connected: SPAKE2+ on the first login, ECDHE-PSK afterwards using the
//! resumption key the server issues during negotiation. Application frames
//! are compressed, then sealed with ChaCha20-Poly1305 under strictly
//! increasing counters.
//!
//! ## Negotiation
//!
//! Right after the handshake the client sends one JSON frame under the
//! fresh keys: `{"turnOffEncryption": bool}`. The server answers with the
//! next resumption key, its index, and whether it saw failed
//! authentication attempts against this account. When the transport is
//! already encrypted (TLS), the inner AEAD can be switched off for
//! application frames; the negotiation exchange itself is always
//! encrypted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cipher::{Decryptor, Encryptor};
use crate::handshake::ecdhe_psk::{self, Psk};
use crate::handshake::message::{ElementType, HandshakeMessage};
use crate::handshake::peer::HandshakePeer;
use crate::handshake::spake2p;

use super::compression::{compress, decompress, CompressionConfig};
use super::connection::Connection;
use super::error::SessionError;

/// Protocol selector value for a SPAKE2+ password login.
pub const PROTOCOL_PASSWORD: u8 = 0;
/// Protocol selector value for ECDHE-PSK resumption.
pub const PROTOCOL_PSK: u8 = 1;

/// Login credentials. Consumed by the first handshake.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Session behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Skip application-frame encryption because the transport is already
    /// encrypted, e.g. a `wss://` connection.
    pub assume_transport_encrypted: bool,
    pub compression: CompressionConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            assume_transport_encrypted: false,
            compression: CompressionConfig::default(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NegotiationRequest {
    turn_off_encryption: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiationResponse {
    session_resumption_key: String,
    session_resumption_key_index: String,
    #[serde(default)]
    was_under_attack: bool,
}

struct ResumptionState {
    key: Psk,
    index: Vec<u8>,
}

struct AuthState {
    credentials: Option<Credentials>,
    resumption: Option<ResumptionState>,
}

type AttackCallback = Box<dyn Fn() + Send + Sync>;

/// Encrypted session over an inner transport.
///
/// Implements [`Connection`] itself, so the RPC client sits on top of it
/// without knowing whether the channel below is secured.
pub struct SecureConnection {
    inner: Box<dyn Connection>,
    config: SessionConfig,
    auth: Mutex<AuthState>,
    encryptor: Mutex<Option<Encryptor>>,
    decryptor: Mutex<Option<Decryptor>>,
    encryption_disabled: AtomicBool,
    was_under_attack: Option<AttackCallback>,
}

impl SecureConnection {
    /// Wrap `inner` for a first-time login.
    ///
    /// The credentials are used exactly once: the first `connect` consumes
    /// them, and later connects resume with the key issued by the server.
    pub fn with_credentials(
        inner: Box<dyn Connection>,
        username: impl Into<String>,
        password: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner,
            config,
            auth: Mutex::new(AuthState {
                credentials: Some(Credentials {
                    username: username.into(),
                    password: password.into(),
                }),
                resumption: None,
            }),
            encryptor: Mutex::new(None),
            decryptor: Mutex::new(None),
            encryption_disabled: AtomicBool::new(false),
            was_under_attack: None,
        }
    }

    /// Register a callback fired when the server reports failed
    /// authentication attempts against this account since the last
    /// session, e.g. an online password guess or a replayed resumption.
    pub fn on_under_attack(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.was_under_attack = Some(Box::new(callback));
        self
    }

    /// Whether a resumption key is on hand for the next `connect`.
    pub async fn can_resume(&self) -> bool {
        self.auth.lock().await.resumption.is_some()
    }
}

#[async_trait]
impl Connection for SecureConnection {
    async fn connect(&self) -> Result<(), SessionError> {
        self.inner.connect().await?;
        let mut auth = self.auth.lock().await;

        // Whatever we authenticate with is burned now; a failed handshake
        // must not leave a replayable credential behind.
        let mut peer: Box<dyn HandshakePeer> = if let Some(credentials) = auth.credentials.take() {
            debug!(username = %credentials.username, "authenticating with password");
            let mut extras = BTreeMap::new();
            extras.insert(ElementType::ProtocolType, vec![PROTOCOL_PASSWORD]);
            Box::new(spake2p::Client::new(
                credentials.username,
                credentials.password,
                extras,
            )?)
        } else if let Some(resumption) = auth.resumption.take() {
            debug!("authenticating with resumption key");
            let mut extras = BTreeMap::new();
            extras.insert(ElementType::ProtocolType, vec![PROTOCOL_PSK]);
            Box::new(ecdhe_psk::Client::new(
                resumption.key,
                resumption.index,
                extras,
            )?)
        } else {
            return Err(SessionError::NoCredential);
        };

        let mut peer_message: Option<HandshakeMessage> = None;
        loop {
            let message = peer.next_message(peer_message.as_ref())?;
            if let Some(message) = message {
                self.inner.send(message.serialize()).await?;
            }
            if peer.is_complete() {
                break;
            }
            let data = self
                .inner
                .receive()
                .await?
                .ok_or(SessionError::ConnectionClosed)?;
            peer_message = Some(HandshakeMessage::parse(&data)?);
        }

        let mut encryptor = Encryptor::new(peer.client_key()?.as_bytes())?;
        let mut decryptor = Decryptor::new(peer.server_key()?.as_bytes())?;

        // Negotiation always rides on the fresh keys, even when application
        // frames will skip encryption afterwards.
        let request = NegotiationRequest {
            turn_off_encryption: self.config.assume_transport_encrypted,
        };
        let payload = serde_json::to_vec(&request)?;
        self.inner.send(encryptor.encrypt(&payload)?).await?;

        let response = self
            .inner
            .receive()
            .await?
            .ok_or(SessionError::ConnectionClosed)?;
        let plain = decryptor.decrypt(&response)?;
        let response: NegotiationResponse =
            serde_json::from_slice(&plain).map_err(|_| SessionError::InvalidServerResponse)?;

        let key_bytes = URL_SAFE_NO_PAD
            .decode(&response.session_resumption_key)
            .map_err(|_| SessionError::InvalidServerResponse)?;
        let key =
            Psk::from_slice(&key_bytes).map_err(|_| SessionError::InvalidServerResponse)?;
        auth.resumption = Some(ResumptionState {
            key,
            index: response.session_resumption_key_index.into_bytes(),
        });

        if response.was_under_attack {
            warn!("server reported authentication attempts against this account");
            if let Some(callback) = &self.was_under_attack {
                callback();
            }
        }

        *self.encryptor.lock().await = Some(encryptor);
        *self.decryptor.lock().await = Some(decryptor);
        self.encryption_disabled.store(
            self.config.assume_transport_encrypted,
            Ordering::SeqCst,
        );
        info!("secure session established");
        Ok(())
    }

    async fn send(&self, data: Vec<u8>) -> Result<(), SessionError> {
        let frame = compress(&data, &self.config.compression)?;
        // The lock spans encrypt and transmit so frames reach the wire in
        // counter order.
        let mut encryptor = self.encryptor.lock().await;
        let frame = if self.encryption_disabled.load(Ordering::SeqCst) {
            frame
        } else {
            let encryptor = encryptor
                .as_mut()
                .ok_or(SessionError::EncryptionNotEstablished)?;
            encryptor.encrypt(&frame)?
        };
        self.inner.send(frame).await
    }

    async fn receive(&self) -> Result<Option<Vec<u8>>, SessionError> {
        let mut decryptor = self.decryptor.lock().await;
        let data = match self.inner.receive().await? {
            Some(data) => data,
            None => return Ok(None),
        };
        let data = if self.encryption_disabled.load(Ordering::SeqCst) {
            data
        } else {
            let decryptor = decryptor
                .as_mut()
                .ok_or(SessionError::DecryptionNotEstablished)?;
            decryptor.decrypt(&data)?
        };
        Ok(Some(decompress(&data)?))
    }

    async fn close(&self) {
        // The cipher locks are left alone: a reader may be parked inside
        // `receive` holding one, and it unblocks only once the transport
        // below reports the close. `connect` installs fresh cipher states.
        self.inner.close().await;
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
