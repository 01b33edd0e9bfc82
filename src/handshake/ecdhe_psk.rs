// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Ephemeral Diffie-Hellman bound to a pre-shared key.
//!
//! This is the cheap path for session resumption: an X25519 exchange whose
//! output is mixed with the PSK handed out at the end of a previous session.
//! Four messages: client share, server share, then one encrypted transcript
//! hash in each direction as mutual key confirmation. Forward secrecy comes
//! from the ephemeral keys; authentication comes from the PSK.

use std::collections::BTreeMap;
use std::fmt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cipher::aead::{Decryptor, Encryptor, KEY_SIZE};
use crate::cipher::kdf;
use crate::handshake::error::HandshakeError;
use crate::handshake::message::{ElementType, HandshakeMessage};
use crate::handshake::peer::{HandshakePeer, SessionKey};
use crate::handshake::step::StepChecker;

/// Width of a resumption pre-shared key.
pub const PSK_SIZE: usize = 32;

/// Width of an X25519 public key on the wire.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Width of the random nonce appended to each share. The nonce never feeds
/// the curve; it only makes the transcript unique per handshake.
pub const NONCE_SIZE: usize = 32;

type Blake2b256 = Blake2b<U32>;

/// Pre-shared key for session resumption.
///
/// Fixed-size by construction, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Psk([u8; PSK_SIZE]);

impl Psk {
    /// Wrap raw key bytes, rejecting anything that is not exactly
    /// [`PSK_SIZE`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HandshakeError> {
        if bytes.len() != PSK_SIZE {
            return Err(HandshakeError::InvalidPskLength {
                expected: PSK_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; PSK_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; PSK_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Psk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Psk(..)")
    }
}

/// Resolves resumption key indices to their stored PSKs.
pub trait PskDirectory: Send + Sync {
    /// Look up the PSK behind an opaque key index. `None` aborts the
    /// handshake with [`HandshakeError::UnknownKeyIndex`].
    fn lookup(&self, key_index: &[u8]) -> Option<Psk>;
}

impl<F> PskDirectory for F
where
    F: Fn(&[u8]) -> Option<Psk> + Send + Sync,
{
    fn lookup(&self, key_index: &[u8]) -> Option<Psk> {
        self(key_index)
    }
}

/// Hash both opening messages into the salt for key extraction. Covering
/// the serialized messages whole also binds the key index and any extra
/// elements the client attached.
fn transcript_hash(client_message: &[u8], server_message: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(client_message);
    hasher.update(server_message);
    hasher.finalize().into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientStep {
    Init,
    ClientMessage,
    ServerMessage,
    ServerConfirmation,
}

/// Client side of the resumption exchange.
pub struct Client {
    psk: Psk,
    first_message_elements: BTreeMap<ElementType, Vec<u8>>,
    steps: StepChecker<ClientStep>,
    num_calls: u8,
    secret: Option<EphemeralSecret>,
    client_message: Option<Vec<u8>>,
    transcript: Option<[u8; 32]>,
    server_confirm_key: Option<Zeroizing<Vec<u8>>>,
    client_key: Option<SessionKey>,
    server_key: Option<SessionKey>,
}

impl Client {
    /// Create a client resuming under `key_index` with the matching PSK.
    ///
    /// `extra_elements` ride along on the first message; the tags the
    /// exchange itself uses are rejected.
    pub fn new(
        psk: Psk,
        key_index: Vec<u8>,
        extra_elements: BTreeMap<ElementType, Vec<u8>>,
    ) -> Result<Self, HandshakeError> {
        let mut first_message_elements = BTreeMap::new();
        for (element, value) in extra_elements {
            if matches!(element, ElementType::KeyIndex | ElementType::CipherMessage) {
                return Err(HandshakeError::InvalidAdditionalElement(element));
            }
            first_message_elements.insert(element, value);
        }
        first_message_elements.insert(ElementType::KeyIndex, key_index);

        Ok(Self {
            psk,
            first_message_elements,
            steps: StepChecker::new(ClientStep::Init),
            num_calls: 0,
            secret: None,
            client_message: None,
            transcript: None,
            server_confirm_key: None,
            client_key: None,
            server_key: None,
        })
    }

    /// First message: ephemeral public key plus a fresh nonce, alongside
    /// the key index telling the server which PSK to load.
    fn client_share(&mut self) -> Result<HandshakeMessage, HandshakeError> {
        let marker = self
            .steps
            .check_step(ClientStep::Init, ClientStep::ClientMessage)?;

        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut share = Vec::with_capacity(PUBLIC_KEY_SIZE + NONCE_SIZE);
        share.extend_from_slice(public.as_bytes());
        share.extend_from_slice(&nonce);

        let mut message = HandshakeMessage::new();
        for (element, value) in &self.first_message_elements {
            message.set_element(*element, value.clone());
        }
        message.set_element(ElementType::CipherMessage, share);

        self.secret = Some(secret);
        // Kept serialized: these exact bytes go into the transcript hash.
        self.client_message = Some(message.serialize());

        self.steps.confirm(marker);
        Ok(message)
    }

    /// Second call: run the curve, derive the four keys and answer with our
    /// confirmation.
    fn take_server_share(
        &mut self,
        peer: &HandshakeMessage,
    ) -> Result<HandshakeMessage, HandshakeError> {
        let marker = self
            .steps
            .check_step(ClientStep::ClientMessage, ClientStep::ServerMessage)?;

        let server_share = peer
            .get_element(ElementType::CipherMessage)
            .ok_or(HandshakeError::MissingElement(ElementType::CipherMessage))?;
        if server_share.len() != PUBLIC_KEY_SIZE + NONCE_SIZE {
            return Err(HandshakeError::InvalidMessageLength {
                expected: PUBLIC_KEY_SIZE + NONCE_SIZE,
                actual: server_share.len(),
            });
        }
        let mut public_bytes = [0u8; PUBLIC_KEY_SIZE];
        public_bytes.copy_from_slice(&server_share[..PUBLIC_KEY_SIZE]);
        let server_public = PublicKey::from(public_bytes);

        let secret = self
            .secret
            .take()
            .ok_or(HandshakeError::MissingInternalState)?;
        let shared = secret.diffie_hellman(&server_public);
        if !shared.was_contributory() {
            return Err(HandshakeError::WeakPublicKey);
        }

        let client_message = self
            .client_message
            .as_deref()
            .ok_or(HandshakeError::MissingInternalState)?;
        let transcript = transcript_hash(client_message, &peer.serialize());

        let mut ikm = Zeroizing::new(Vec::with_capacity(32 + PSK_SIZE));
        ikm.extend_from_slice(shared.as_bytes());
        ikm.extend_from_slice(self.psk.as_bytes());
        let prk = kdf::extract(&transcript, &ikm);

        let client_confirm_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"client confirm key", &prk)?);
        let server_confirm_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"server confirm key", &prk)?);
        let client_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"client key", &prk)?);
        let server_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"server key", &prk)?);

        let mut encryptor = Encryptor::new(&client_confirm_key)?;
        let confirm = encryptor.encrypt(&transcript)?;

        let mut message = HandshakeMessage::new();
        message.set_element(ElementType::CipherMessage, confirm);

        self.transcript = Some(transcript);
        self.server_confirm_key = Some(server_confirm_key);
        self.client_key = Some(SessionKey::from_slice(&client_key)?);
        self.server_key = Some(SessionKey::from_slice(&server_key)?);

        self.steps.confirm(marker);
        Ok(message)
    }

    /// Final call: the server's confirmation must decrypt to the same
    /// transcript hash we computed.
    fn take_server_confirmation(&mut self, peer: &HandshakeMessage) -> Result<(), HandshakeError> {
        let marker = self
            .steps
            .check_step(ClientStep::ServerMessage, ClientStep::ServerConfirmation)?;

        let confirm = peer
            .get_element(ElementType::CipherMessage)
            .ok_or(HandshakeError::MissingElement(ElementType::CipherMessage))?;
        let key = self
            .server_confirm_key
            .as_ref()
            .ok_or(HandshakeError::MissingInternalState)?;
        let transcript = self
            .transcript
            .ok_or(HandshakeError::MissingInternalState)?;

        let mut decryptor = Decryptor::new(key)?;
        let decrypted = decryptor.decrypt(confirm)?;
        if decrypted.as_slice() != transcript.as_slice() {
            return Err(HandshakeError::ConfirmationMismatch);
        }

        self.steps.confirm(marker);
        Ok(())
    }

    fn take_key(&mut self, key: Option<SessionKey>) -> Result<SessionKey, HandshakeError> {
        let marker = self
            .steps
            .check_step(ClientStep::ServerConfirmation, ClientStep::ServerConfirmation)?;
        self.steps.confirm(marker);
        key.ok_or(HandshakeError::HandshakeNotComplete)
    }
}

impl HandshakePeer for Client {
    fn next_message(
        &mut self,
        peer_message: Option<&HandshakeMessage>,
    ) -> Result<Option<HandshakeMessage>, HandshakeError> {
        let call = self.num_calls;
        self.num_calls = self.num_calls.saturating_add(1);
        match call {
            0 => {
                if peer_message.is_some() {
                    return Err(HandshakeError::UnexpectedPeerMessage);
                }
                Ok(Some(self.client_share()?))
            }
            1 => {
                let peer = peer_message.ok_or(HandshakeError::MissingPeerMessage)?;
                Ok(Some(self.take_server_share(peer)?))
            }
            2 => {
                let peer = peer_message.ok_or(HandshakeError::MissingPeerMessage)?;
                self.take_server_confirmation(peer)?;
                Ok(None)
            }
            _ => Err(HandshakeError::ExceedingMaxCallCount),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.steps.current_step(), Ok(ClientStep::ServerConfirmation))
    }

    fn client_key(&mut self) -> Result<SessionKey, HandshakeError> {
        let key = self.client_key.clone();
        self.take_key(key)
    }

    fn server_key(&mut self) -> Result<SessionKey, HandshakeError> {
        let key = self.server_key.clone();
        self.take_key(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerStep {
    Init,
    ClientMessage,
    ClientConfirmation,
}

/// Server side of the resumption exchange.
///
/// Derives all four keys while answering the client's opening share; the
/// exchange still only completes once the client's confirmation checks out.
pub struct Server<D> {
    directory: D,
    steps: StepChecker<ServerStep>,
    num_calls: u8,
    transcript: Option<[u8; 32]>,
    client_confirm_key: Option<Zeroizing<Vec<u8>>>,
    server_confirm_key: Option<Zeroizing<Vec<u8>>>,
    client_key: Option<SessionKey>,
    server_key: Option<SessionKey>,
}

impl<D: PskDirectory> Server<D> {
    /// Create a server that resolves key indices through `directory`.
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            steps: StepChecker::new(ServerStep::Init),
            num_calls: 0,
            transcript: None,
            client_confirm_key: None,
            server_confirm_key: None,
            client_key: None,
            server_key: None,
        }
    }

    fn take_client_share(
        &mut self,
        peer: &HandshakeMessage,
    ) -> Result<HandshakeMessage, HandshakeError> {
        let marker = self
            .steps
            .check_step(ServerStep::Init, ServerStep::ClientMessage)?;

        let key_index = peer
            .get_element(ElementType::KeyIndex)
            .ok_or(HandshakeError::MissingElement(ElementType::KeyIndex))?;
        let psk = self
            .directory
            .lookup(key_index)
            .ok_or_else(|| HandshakeError::UnknownKeyIndex(hex::encode(key_index)))?;

        let client_share = peer
            .get_element(ElementType::CipherMessage)
            .ok_or(HandshakeError::MissingElement(ElementType::CipherMessage))?;
        if client_share.len() != PUBLIC_KEY_SIZE + NONCE_SIZE {
            return Err(HandshakeError::InvalidMessageLength {
                expected: PUBLIC_KEY_SIZE + NONCE_SIZE,
                actual: client_share.len(),
            });
        }

        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut share = Vec::with_capacity(PUBLIC_KEY_SIZE + NONCE_SIZE);
        share.extend_from_slice(public.as_bytes());
        share.extend_from_slice(&nonce);
        let mut message = HandshakeMessage::new();
        message.set_element(ElementType::CipherMessage, share);

        let mut client_public = [0u8; PUBLIC_KEY_SIZE];
        client_public.copy_from_slice(&client_share[..PUBLIC_KEY_SIZE]);
        let shared = secret.diffie_hellman(&PublicKey::from(client_public));
        if !shared.was_contributory() {
            return Err(HandshakeError::WeakPublicKey);
        }

        let transcript = transcript_hash(&peer.serialize(), &message.serialize());
        let mut ikm = Zeroizing::new(Vec::with_capacity(32 + PSK_SIZE));
        ikm.extend_from_slice(shared.as_bytes());
        ikm.extend_from_slice(psk.as_bytes());
        let prk = kdf::extract(&transcript, &ikm);

        let client_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"client key", &prk)?);
        let server_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"server key", &prk)?);
        self.client_confirm_key = Some(Zeroizing::new(kdf::expand(
            KEY_SIZE,
            b"client confirm key",
            &prk,
        )?));
        self.server_confirm_key = Some(Zeroizing::new(kdf::expand(
            KEY_SIZE,
            b"server confirm key",
            &prk,
        )?));
        self.client_key = Some(SessionKey::from_slice(&client_key)?);
        self.server_key = Some(SessionKey::from_slice(&server_key)?);
        self.transcript = Some(transcript);

        self.steps.confirm(marker);
        Ok(message)
    }

    fn take_client_confirmation(
        &mut self,
        peer: &HandshakeMessage,
    ) -> Result<HandshakeMessage, HandshakeError> {
        let marker = self
            .steps
            .check_step(ServerStep::ClientMessage, ServerStep::ClientConfirmation)?;

        let confirm = peer
            .get_element(ElementType::CipherMessage)
            .ok_or(HandshakeError::MissingElement(ElementType::CipherMessage))?;
        let client_confirm_key = self
            .client_confirm_key
            .as_ref()
            .ok_or(HandshakeError::MissingInternalState)?;
        let server_confirm_key = self
            .server_confirm_key
            .as_ref()
            .ok_or(HandshakeError::MissingInternalState)?;
        let transcript = self
            .transcript
            .ok_or(HandshakeError::MissingInternalState)?;

        let mut decryptor = Decryptor::new(client_confirm_key)?;
        let decrypted = decryptor.decrypt(confirm)?;
        if decrypted.as_slice() != transcript.as_slice() {
            return Err(HandshakeError::ConfirmationMismatch);
        }

        let mut encryptor = Encryptor::new(server_confirm_key)?;
        let server_confirm = encryptor.encrypt(&transcript)?;
        let mut message = HandshakeMessage::new();
        message.set_element(ElementType::CipherMessage, server_confirm);

        self.steps.confirm(marker);
        Ok(message)
    }

    fn take_key(&mut self, key: Option<SessionKey>) -> Result<SessionKey, HandshakeError> {
        let marker = self
            .steps
            .check_step(ServerStep::ClientConfirmation, ServerStep::ClientConfirmation)?;
        self.steps.confirm(marker);
        key.ok_or(HandshakeError::HandshakeNotComplete)
    }
}

impl<D: PskDirectory> HandshakePeer for Server<D> {
    fn next_message(
        &mut self,
        peer_message: Option<&HandshakeMessage>,
    ) -> Result<Option<HandshakeMessage>, HandshakeError> {
        let call = self.num_calls;
        self.num_calls = self.num_calls.saturating_add(1);
        match call {
            0 => {
                let peer = peer_message.ok_or(HandshakeError::MissingPeerMessage)?;
                Ok(Some(self.take_client_share(peer)?))
            }
            1 => {
                let peer = peer_message.ok_or(HandshakeError::MissingPeerMessage)?;
                Ok(Some(self.take_client_confirmation(peer)?))
            }
            _ => Err(HandshakeError::ExceedingMaxCallCount),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.steps.current_step(), Ok(ServerStep::ClientConfirmation))
    }

    fn client_key(&mut self) -> Result<SessionKey, HandshakeError> {
        let key = self.client_key.clone();
        self.take_key(key)
    }

    fn server_key(&mut self) -> Result<SessionKey, HandshakeError> {
        let key = self.server_key.clone();
        self.take_key(key)
    }
}
