// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Authenticated key exchange for the secure channel.
//!
//! Two handshakes share one message shape and one driver interface:
//!
//! - **SPAKE2+**: password login. The server holds an Argon2id-derived
//!   verifier record, never the password itself.
//! - **ECDHE-PSK**: session resumption. X25519 bound to the pre-shared key
//!   issued at the end of an earlier session.
//!
//! Messages are TLV containers ([`tlv`], [`message`]) so either side can
//! attach extra elements, e.g. the protocol selector on the first frame.
//! Both state machines are guarded by a [`step`] checker that permanently
//! poisons a peer whose step was entered but never confirmed, so a failed
//! handshake cannot be resumed halfway.
//!
//! The [`registration`] module covers enrollment: it packs a fresh verifier
//! record into a base64 string a user can hand to the server out of band.

pub mod ecdhe_psk;
pub mod error;
pub mod message;
pub mod peer;
pub mod registration;
pub mod spake2p;
pub mod step;
pub mod tlv;

pub use ecdhe_psk::{Psk, PskDirectory};
pub use error::HandshakeError;
pub use message::{ElementType, HandshakeMessage};
pub use peer::{HandshakePeer, SessionKey};
pub use registration::{export_registration, parse_registration, RegistrationError};
pub use spake2p::{register, RegistrationDirectory, RegistrationRecord};
pub use step::{StepChecker, StepError, StepMarker};
pub use tlv::{Tlv, TlvError};
