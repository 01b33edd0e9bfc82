// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Resumption exchanges with the protocol selector riding along.

use std::collections::BTreeMap;

use fabstir_chat_sdk::handshake::{
    ecdhe_psk, ElementType, HandshakeError, HandshakeMessage, HandshakePeer, Psk,
};

use super::support::pump;

fn psk() -> Psk {
    Psk::from_slice(&[0x5Au8; 32]).unwrap()
}

#[test]
fn resumption_with_extra_elements_agrees_on_keys() {
    let mut extras = BTreeMap::new();
    extras.insert(ElementType::ProtocolType, vec![1]);
    let mut client = ecdhe_psk::Client::new(psk(), b"key-0".to_vec(), extras).unwrap();
    let mut server =
        ecdhe_psk::Server::new(|index: &[u8]| (index == &b"key-0"[..]).then(psk));

    pump(&mut client, &mut server).unwrap();

    assert!(client.is_complete());
    assert!(server.is_complete());
    assert_eq!(
        client.client_key().unwrap().as_bytes(),
        server.client_key().unwrap().as_bytes()
    );
    assert_eq!(
        client.server_key().unwrap().as_bytes(),
        server.server_key().unwrap().as_bytes()
    );
}

#[test]
fn transcript_binds_the_extra_elements() {
    let mut extras = BTreeMap::new();
    extras.insert(ElementType::ProtocolType, vec![1]);
    let mut client = ecdhe_psk::Client::new(psk(), b"key-0".to_vec(), extras).unwrap();
    let mut server =
        ecdhe_psk::Server::new(|index: &[u8]| (index == &b"key-0"[..]).then(psk));

    // Rewrite the protocol selector in flight. Key index and shares stay
    // intact, so the exchange only unravels at confirmation time.
    let m1 = client.next_message(None).unwrap().unwrap();
    let mut forged = HandshakeMessage::parse(&m1.serialize()).unwrap();
    forged.set_element(ElementType::ProtocolType, vec![9]);

    let m2 = server.next_message(Some(&forged)).unwrap().unwrap();
    let m3 = client.next_message(Some(&m2)).unwrap().unwrap();

    let err = server.next_message(Some(&m3)).unwrap_err();
    assert!(matches!(err, HandshakeError::Cipher(_)));
    assert!(!server.is_complete());
}
