// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! SPAKE2+ password-authenticated key exchange over edwards25519.
//!
//! The client proves knowledge of a password, the server proves knowledge of
//! a registration record derived from that password, and both end up with a
//! pair of one-directional session keys. The server never sees the password:
//! at registration time the client derives two scalars from it with Argon2id
//! and hands over only `w0` and `L = w1 * B`.
//!
//! ## Message flow
//!
//! ```text
//! client                                server
//!   |-- key index (username) ------------->|
//!   |<------------------------- salt ------|
//!   |-- shareP (X) ----------------------->|
//!   |<------- shareV (Y) || confirmV ------|
//!   |-- confirmP ------------------------->|
//! ```
//!
//! The two confirmation payloads double as key-confirmation: each side
//! proves it derived the same transcript secret by encrypting the peer's
//! public share with a key only the real peer can compute.

use std::collections::BTreeMap;

use argon2::{Algorithm, Argon2, Params, Version};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use curve25519_dalek::traits::IsIdentity;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::cipher::aead::{Decryptor, Encryptor, KEY_SIZE};
use crate::cipher::group::{
    decode_point, encode_point, random_scalar, EdwardsPoint, Scalar, POINT_SIZE, SCALAR_SIZE,
};
use crate::cipher::kdf;
use crate::handshake::error::HandshakeError;
use crate::handshake::message::{ElementType, HandshakeMessage};
use crate::handshake::peer::{HandshakePeer, SessionKey};
use crate::handshake::step::StepChecker;

/// Width of the Argon2id salt stored in a registration record.
pub const SALT_SIZE: usize = 16;

/// Domain separation string mixed into every transcript hash.
pub const HASH_CONTEXT: &str = "FabstirChat";

/// Fixed verifier identity; clients identify themselves by username.
pub const ID_VERIFIER: &str = "fabstir-chat-server";

const ARGON2ID_MEM_COST_KIB: u32 = 64 * 1024;
const ARGON2ID_ITERATIONS: u32 = 3;
const ARGON2ID_LANES: u32 = 1;

/// SPAKE2+ blinding point `M`, a generator with unknown discrete log.
const M_BYTES: [u8; POINT_SIZE] = [
    0xd0, 0x48, 0x03, 0x2c, 0x6e, 0xa0, 0xb6, 0xd6, 0x97, 0xdd, 0xc2, 0xe8, 0x6b, 0xda, 0x85,
    0xa3, 0x3a, 0xda, 0xc9, 0x20, 0xf1, 0xbf, 0x18, 0xe1, 0xb0, 0xc6, 0xd1, 0x66, 0xa5, 0xce,
    0xcd, 0xaf,
];

/// SPAKE2+ blinding point `N`, a generator with unknown discrete log.
const N_BYTES: [u8; POINT_SIZE] = [
    0xd3, 0xbf, 0xb5, 0x18, 0xf4, 0x4f, 0x34, 0x30, 0xf2, 0x9d, 0x0c, 0x92, 0xaf, 0x50, 0x38,
    0x65, 0xa1, 0xed, 0x32, 0x81, 0xdc, 0x69, 0xb3, 0x5d, 0xd8, 0x68, 0xba, 0x85, 0xf8, 0x86,
    0xc4, 0xab,
];

type Blake2b256 = Blake2b<U32>;

/// Server-side credential for one user, produced by [`register`].
///
/// Holds everything the server needs to run its side of the exchange.
/// `w0` is shared with the client's derivation; `l` commits to `w1`
/// without revealing it.
#[derive(Clone)]
pub struct RegistrationRecord {
    /// First password-derived scalar.
    pub w0: Scalar,
    /// Client verifier point, `w1 * B`.
    pub l: EdwardsPoint,
    /// Salt the server hands back during the handshake.
    pub salt: [u8; SALT_SIZE],
}

/// Resolves usernames to stored registration records.
pub trait RegistrationDirectory: Send + Sync {
    /// Look up a user's record. `None` aborts the handshake with
    /// [`HandshakeError::UnknownUser`].
    fn lookup(&self, username: &str) -> Option<RegistrationRecord>;
}

impl<F> RegistrationDirectory for F
where
    F: Fn(&str) -> Option<RegistrationRecord> + Send + Sync,
{
    fn lookup(&self, username: &str) -> Option<RegistrationRecord> {
        self(username)
    }
}

/// Create a registration record for a new user.
///
/// Runs the password hash with a fresh random salt. The record is meant to
/// be delivered to the server out of band (see the registration export
/// format); the password itself never leaves the client.
pub fn register(username: &str, password: &str) -> Result<RegistrationRecord, HandshakeError> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let (w0, w1) = derive_w0_w1(username, password, &salt)?;
    let l = EdwardsPoint::mul_base(&w1);
    Ok(RegistrationRecord { w0, l, salt })
}

/// Stretch a password into the two exchange scalars.
///
/// The Argon2id input is the length-prefixed concatenation of password,
/// username and the verifier identity, so no pair of inputs can collide
/// across field boundaries. The 64-byte output is split in half and each
/// half reduced to a scalar.
fn derive_w0_w1(
    username: &str,
    password: &str,
    salt: &[u8; SALT_SIZE],
) -> Result<(Scalar, Scalar), HandshakeError> {
    let mut key_material = Zeroizing::new(Vec::with_capacity(
        6 + password.len() + username.len() + ID_VERIFIER.len(),
    ));
    for part in [
        password.as_bytes(),
        username.as_bytes(),
        ID_VERIFIER.as_bytes(),
    ] {
        key_material.extend_from_slice(&(part.len() as u16).to_le_bytes());
        key_material.extend_from_slice(part);
    }

    let params = Params::new(
        ARGON2ID_MEM_COST_KIB,
        ARGON2ID_ITERATIONS,
        ARGON2ID_LANES,
        Some(SCALAR_SIZE * 2),
    )
    .map_err(|e| HandshakeError::PasswordHash(e.to_string()))?;
    let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut raw = Zeroizing::new([0u8; SCALAR_SIZE * 2]);
    hasher
        .hash_password_into(&key_material, salt, raw.as_mut_slice())
        .map_err(|e| HandshakeError::PasswordHash(e.to_string()))?;

    let mut half = [0u8; SCALAR_SIZE];
    half.copy_from_slice(&raw[..SCALAR_SIZE]);
    let w0 = Scalar::from_bytes_mod_order(half);
    half.copy_from_slice(&raw[SCALAR_SIZE..]);
    let w1 = Scalar::from_bytes_mod_order(half);
    half.zeroize();
    Ok((w0, w1))
}

/// Hash the whole exchange into the pseudorandom key both sides expand
/// their session keys from.
fn transcript_hash(
    id_prover: &str,
    share_p: &EdwardsPoint,
    share_v: &EdwardsPoint,
    z: &EdwardsPoint,
    v: &EdwardsPoint,
    w0: &Scalar,
) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(HASH_CONTEXT.as_bytes());
    hasher.update(id_prover.as_bytes());
    hasher.update(ID_VERIFIER.as_bytes());
    hasher.update(M_BYTES);
    hasher.update(N_BYTES);
    hasher.update(encode_point(share_p));
    hasher.update(encode_point(share_v));
    hasher.update(encode_point(z));
    hasher.update(encode_point(v));
    hasher.update(w0.as_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientStep {
    Init,
    RetrieveSalt,
    ShareP,
    ConfirmP,
}

/// Client (prover) side of the exchange.
///
/// Drive it through [`HandshakePeer::next_message`]; it produces three
/// messages and consumes two.
pub struct Client {
    username: String,
    password: Zeroizing<String>,
    extra_elements: BTreeMap<ElementType, Vec<u8>>,
    steps: StepChecker<ClientStep>,
    w0: Option<Scalar>,
    w1: Option<Scalar>,
    x: Option<Scalar>,
    share_p: Option<EdwardsPoint>,
    client_key: Option<SessionKey>,
    server_key: Option<SessionKey>,
}

impl Client {
    /// Create a client for `username`, taking ownership of the password.
    ///
    /// `extra_elements` are attached to the first handshake message, which
    /// lets the session layer announce the protocol choice in the same
    /// frame. The tags the exchange itself uses are rejected.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        extra_elements: BTreeMap<ElementType, Vec<u8>>,
    ) -> Result<Self, HandshakeError> {
        for element in extra_elements.keys() {
            if matches!(element, ElementType::KeyIndex | ElementType::CipherMessage) {
                return Err(HandshakeError::InvalidAdditionalElement(*element));
            }
        }
        Ok(Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
            extra_elements,
            steps: StepChecker::new(ClientStep::Init),
            w0: None,
            w1: None,
            x: None,
            share_p: None,
            client_key: None,
            server_key: None,
        })
    }

    /// First message: announce the username so the server can send the salt.
    fn request_salt(&mut self) -> Result<HandshakeMessage, HandshakeError> {
        let marker = self
            .steps
            .check_step(ClientStep::Init, ClientStep::RetrieveSalt)?;

        let mut message = HandshakeMessage::new();
        for (element, value) in &self.extra_elements {
            message.set_element(*element, value.clone());
        }
        message.set_element(ElementType::KeyIndex, self.username.clone().into_bytes());

        self.steps.confirm(marker);
        Ok(message)
    }

    /// Second message: derive the scalars from the server's salt and send
    /// the public share `X = x * B + w0 * M`.
    fn share_p(&mut self, peer: &HandshakeMessage) -> Result<HandshakeMessage, HandshakeError> {
        let marker = self
            .steps
            .check_step(ClientStep::RetrieveSalt, ClientStep::ShareP)?;

        let salt = peer
            .get_element(ElementType::CipherMessage)
            .ok_or(HandshakeError::MissingElement(ElementType::CipherMessage))?;
        if salt.len() != SALT_SIZE {
            return Err(HandshakeError::InvalidMessageLength {
                expected: SALT_SIZE,
                actual: salt.len(),
            });
        }
        let mut salt_array = [0u8; SALT_SIZE];
        salt_array.copy_from_slice(salt);

        let (w0, w1) = derive_w0_w1(&self.username, &self.password, &salt_array)?;
        // The password has served its purpose; only the scalars live on.
        self.password.zeroize();

        let x = random_scalar();
        let m = decode_point(&M_BYTES)?;
        let big_x = EdwardsPoint::mul_base(&x) + m * w0;

        self.w0 = Some(w0);
        self.w1 = Some(w1);
        self.x = Some(x);
        self.share_p = Some(big_x);

        let mut message = HandshakeMessage::new();
        message.set_element(ElementType::CipherMessage, encode_point(&big_x).to_vec());

        self.steps.confirm(marker);
        Ok(message)
    }

    /// Third message: check the server's share and confirmation, derive the
    /// session keys and answer with our own confirmation.
    fn confirm_p(&mut self, peer: &HandshakeMessage) -> Result<HandshakeMessage, HandshakeError> {
        let marker = self
            .steps
            .check_step(ClientStep::ShareP, ClientStep::ConfirmP)?;

        let server_message = peer
            .get_element(ElementType::CipherMessage)
            .ok_or(HandshakeError::MissingElement(ElementType::CipherMessage))?;
        if server_message.len() < POINT_SIZE {
            return Err(HandshakeError::MessageTooShort {
                minimum: POINT_SIZE,
                actual: server_message.len(),
            });
        }
        let big_y = decode_point(&server_message[..POINT_SIZE])?;

        let (w0, w1, x, big_x) = match (self.w0, self.w1, self.x, self.share_p) {
            (Some(w0), Some(w1), Some(x), Some(big_x)) => (w0, w1, x, big_x),
            _ => return Err(HandshakeError::MissingInternalState),
        };

        let n = decode_point(&N_BYTES)?;
        // Both shared points get the cofactor cleared so a low-order
        // component contributed by a malicious peer cannot survive.
        let t = big_y - n * w0;
        let z = (t * x).mul_by_cofactor();
        let v = (t * w1).mul_by_cofactor();
        if z.is_identity() || v.is_identity() {
            return Err(HandshakeError::DegenerateShare);
        }

        let prk = transcript_hash(&self.username, &big_x, &big_y, &z, &v, &w0);
        let client_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"client key", &prk)?);
        let server_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"server key", &prk)?);
        let confirm_p_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"confirmP key", &prk)?);
        let confirm_v_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"confirmV key", &prk)?);

        let mut decryptor = Decryptor::new(&confirm_v_key)?;
        let decrypted_share = decryptor.decrypt(&server_message[POINT_SIZE..])?;
        if decrypted_share.len() != POINT_SIZE {
            return Err(HandshakeError::InvalidMessageLength {
                expected: POINT_SIZE,
                actual: decrypted_share.len(),
            });
        }
        if decrypted_share.as_slice() != encode_point(&big_x).as_slice() {
            return Err(HandshakeError::ConfirmVMismatch);
        }

        let mut encryptor = Encryptor::new(&confirm_p_key)?;
        let confirm_p = encryptor.encrypt(&encode_point(&big_y))?;

        self.client_key = Some(SessionKey::from_slice(&client_key)?);
        self.server_key = Some(SessionKey::from_slice(&server_key)?);

        let mut message = HandshakeMessage::new();
        message.set_element(ElementType::CipherMessage, confirm_p);

        self.steps.confirm(marker);
        Ok(message)
    }

    fn take_key(&mut self, key: Option<SessionKey>) -> Result<SessionKey, HandshakeError> {
        let marker = self
            .steps
            .check_step(ClientStep::ConfirmP, ClientStep::ConfirmP)?;
        self.steps.confirm(marker);
        key.ok_or(HandshakeError::HandshakeNotComplete)
    }
}

impl HandshakePeer for Client {
    fn next_message(
        &mut self,
        peer_message: Option<&HandshakeMessage>,
    ) -> Result<Option<HandshakeMessage>, HandshakeError> {
        match self.steps.current_step()? {
            ClientStep::Init => {
                if peer_message.is_some() {
                    return Err(HandshakeError::UnexpectedPeerMessage);
                }
                Ok(Some(self.request_salt()?))
            }
            ClientStep::RetrieveSalt => {
                let peer = peer_message.ok_or(HandshakeError::MissingPeerMessage)?;
                Ok(Some(self.share_p(peer)?))
            }
            ClientStep::ShareP => {
                let peer = peer_message.ok_or(HandshakeError::MissingPeerMessage)?;
                Ok(Some(self.confirm_p(peer)?))
            }
            ClientStep::ConfirmP => Err(HandshakeError::InvalidDispatchStep("Client")),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.steps.current_step(), Ok(ClientStep::ConfirmP))
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
    RetrieveSalt,
    ShareVConfirmV,
    ConfirmP,
}

/// Server (verifier) side of the exchange.
///
/// Consumes three client messages and produces two; the final client
/// confirmation yields no reply.
pub struct Server<D> {
    directory: D,
    steps: StepChecker<ServerStep>,
    username: Option<String>,
    registration: Option<RegistrationRecord>,
    share_v: Option<EdwardsPoint>,
    confirm_p_key: Option<Zeroizing<Vec<u8>>>,
    client_key: Option<SessionKey>,
    server_key: Option<SessionKey>,
}

impl<D: RegistrationDirectory> Server<D> {
    /// Create a server that authenticates users against `directory`.
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            steps: StepChecker::new(ServerStep::Init),
            username: None,
            registration: None,
            share_v: None,
            confirm_p_key: None,
            client_key: None,
            server_key: None,
        }
    }

    /// First reply: look the user up and send back the stored salt.
    fn send_salt(&mut self, peer: &HandshakeMessage) -> Result<HandshakeMessage, HandshakeError> {
        let marker = self
            .steps
            .check_step(ServerStep::Init, ServerStep::RetrieveSalt)?;

        let key_index = peer
            .get_element(ElementType::KeyIndex)
            .ok_or(HandshakeError::MissingElement(ElementType::KeyIndex))?;
        let username = std::str::from_utf8(key_index)
            .map_err(|_| HandshakeError::InvalidKeyIndexEncoding)?
            .to_owned();
        let registration = self
            .directory
            .lookup(&username)
            .ok_or_else(|| HandshakeError::UnknownUser(username.clone()))?;

        let mut message = HandshakeMessage::new();
        message.set_element(ElementType::CipherMessage, registration.salt.to_vec());

        self.username = Some(username);
        self.registration = Some(registration);

        self.steps.confirm(marker);
        Ok(message)
    }

    /// Second reply: accept the client share, send `Y = y * B + w0 * N`
    /// with our confirmation appended, and derive the session keys.
    fn share_v(&mut self, peer: &HandshakeMessage) -> Result<HandshakeMessage, HandshakeError> {
        let marker = self
            .steps
            .check_step(ServerStep::RetrieveSalt, ServerStep::ShareVConfirmV)?;

        let client_share = peer
            .get_element(ElementType::CipherMessage)
            .ok_or(HandshakeError::MissingElement(ElementType::CipherMessage))?;
        if client_share.len() != POINT_SIZE {
            return Err(HandshakeError::InvalidMessageLength {
                expected: POINT_SIZE,
                actual: client_share.len(),
            });
        }
        let big_x = decode_point(client_share)?;

        let registration = self
            .registration
            .as_ref()
            .ok_or(HandshakeError::MissingInternalState)?;
        let username = self
            .username
            .as_deref()
            .ok_or(HandshakeError::MissingInternalState)?;
        let w0 = registration.w0;

        let y = random_scalar();
        let m = decode_point(&M_BYTES)?;
        let n = decode_point(&N_BYTES)?;
        let big_y = EdwardsPoint::mul_base(&y) + n * w0;
        let z = ((big_x - m * w0) * y).mul_by_cofactor();
        let v = (registration.l * y).mul_by_cofactor();
        if z.is_identity() || v.is_identity() {
            return Err(HandshakeError::DegenerateShare);
        }

        let prk = transcript_hash(username, &big_x, &big_y, &z, &v, &w0);
        let client_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"client key", &prk)?);
        let server_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"server key", &prk)?);
        let confirm_p_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"confirmP key", &prk)?);
        let confirm_v_key = Zeroizing::new(kdf::expand(KEY_SIZE, b"confirmV key", &prk)?);

        let mut encryptor = Encryptor::new(&confirm_v_key)?;
        let confirm_v = encryptor.encrypt(&encode_point(&big_x))?;

        let mut payload = encode_point(&big_y).to_vec();
        payload.extend_from_slice(&confirm_v);
        let mut message = HandshakeMessage::new();
        message.set_element(ElementType::CipherMessage, payload);

        self.share_v = Some(big_y);
        self.confirm_p_key = Some(confirm_p_key);
        self.client_key = Some(SessionKey::from_slice(&client_key)?);
        self.server_key = Some(SessionKey::from_slice(&server_key)?);

        self.steps.confirm(marker);
        Ok(message)
    }

    /// Final step: verify that the client's confirmation decrypts to our
    /// own share. Only now is the client actually authenticated.
    fn take_confirm_p(&mut self, peer: &HandshakeMessage) -> Result<(), HandshakeError> {
        let marker = self
            .steps
            .check_step(ServerStep::ShareVConfirmV, ServerStep::ConfirmP)?;

        let confirm_p = peer
            .get_element(ElementType::CipherMessage)
            .ok_or(HandshakeError::MissingElement(ElementType::CipherMessage))?;
        let confirm_p_key = self
            .confirm_p_key
            .as_ref()
            .ok_or(HandshakeError::MissingInternalState)?;
        let share_v = self
            .share_v
            .as_ref()
            .ok_or(HandshakeError::MissingInternalState)?;

        let mut decryptor = Decryptor::new(confirm_p_key)?;
        let decrypted = decryptor.decrypt(confirm_p)?;
        if decrypted.len() != POINT_SIZE {
            return Err(HandshakeError::InvalidMessageLength {
                expected: POINT_SIZE,
                actual: decrypted.len(),
            });
        }
        if decrypted.as_slice() != encode_point(share_v).as_slice() {
            return Err(HandshakeError::ConfirmPMismatch);
        }

        self.steps.confirm(marker);
        Ok(())
    }

    fn take_key(&mut self, key: Option<SessionKey>) -> Result<SessionKey, HandshakeError> {
        let marker = self
            .steps
            .check_step(ServerStep::ConfirmP, ServerStep::ConfirmP)?;
        self.steps.confirm(marker);
        key.ok_or(HandshakeError::HandshakeNotComplete)
    }
}

impl<D: RegistrationDirectory> HandshakePeer for Server<D> {
    fn next_message(
        &mut self,
        peer_message: Option<&HandshakeMessage>,
    ) -> Result<Option<HandshakeMessage>, HandshakeError> {
        let peer = peer_message.ok_or(HandshakeError::MissingPeerMessage)?;
        match self.steps.current_step()? {
            ServerStep::Init => Ok(Some(self.send_salt(peer)?)),
            ServerStep::RetrieveSalt => Ok(Some(self.share_v(peer)?)),
            ServerStep::ShareVConfirmV => {
                self.take_confirm_p(peer)?;
                Ok(None)
            }
            ServerStep::ConfirmP => Err(HandshakeError::InvalidDispatchStep("Server")),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.steps.current_step(), Ok(ServerStep::ConfirmP))
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
