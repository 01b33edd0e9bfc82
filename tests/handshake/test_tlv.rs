// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Wire-format vectors for the TLV codec.

use fabstir_chat_sdk::handshake::{Tlv, TlvError};

#[test]
fn single_element_serializes_to_known_bytes() {
    let mut tlv = Tlv::new(2, 4);
    tlv.set(0x1234, vec![0xAA, 0xBB, 0xCC]);

    // Tag and length are little-endian at their configured widths.
    assert_eq!(
        tlv.serialize(),
        vec![0x34, 0x12, 0x03, 0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC]
    );
}

#[test]
fn elements_serialize_in_ascending_tag_order() {
    let mut tlv = Tlv::new(1, 2);
    tlv.set(3, vec![0x44, 0x55, 0x66]);
    tlv.set(1, vec![0x11]);
    tlv.set(2, vec![0x22, 0x33]);

    assert_eq!(
        tlv.serialize(),
        vec![
            0x01, 0x01, 0x00, 0x11, // tag 1
            0x02, 0x02, 0x00, 0x22, 0x33, // tag 2
            0x03, 0x03, 0x00, 0x44, 0x55, 0x66, // tag 3
        ]
    );
}

#[test]
fn zero_length_value_serializes_as_header_only() {
    let mut tlv = Tlv::new(1, 1);
    tlv.set(5, Vec::new());
    assert_eq!(tlv.serialize(), vec![0x05, 0x00]);
}

#[test]
fn single_element_parses_from_known_bytes() {
    let data = [0x34, 0x12, 0x03, 0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC];
    let tlv = Tlv::parse(2, 4, &data).unwrap();
    assert_eq!(tlv.get(0x1234), Some(&[0xAAu8, 0xBB, 0xCC][..]));
}

#[test]
fn multiple_elements_parse_from_known_bytes() {
    let data = [
        0x01, 0x01, 0x00, 0x11, // tag 1
        0x02, 0x02, 0x00, 0x22, 0x33, // tag 2
        0x03, 0x03, 0x00, 0x44, 0x55, 0x66, // tag 3
    ];
    let tlv = Tlv::parse(1, 2, &data).unwrap();
    assert_eq!(tlv.get(1), Some(&[0x11u8][..]));
    assert_eq!(tlv.get(2), Some(&[0x22u8, 0x33][..]));
    assert_eq!(tlv.get(3), Some(&[0x44u8, 0x55, 0x66][..]));
}

#[test]
fn empty_input_parses_to_an_empty_map() {
    let tlv = Tlv::parse(2, 4, &[]).unwrap();
    assert_eq!(tlv.get(1), None);
    assert!(tlv.serialize().is_empty());
}

#[test]
fn zero_length_value_parses() {
    let tlv = Tlv::parse(1, 1, &[0x05, 0x00]).unwrap();
    assert_eq!(tlv.get(5), Some(&[][..]));
}

#[test]
fn data_ending_inside_a_header_is_rejected() {
    // One byte where the tag alone needs two.
    assert!(matches!(
        Tlv::parse(2, 4, &[0x01]),
        Err(TlvError::TruncatedHeader)
    ));
}

#[test]
fn declared_length_past_the_end_is_rejected() {
    // Header announces a five-byte value; only two bytes follow.
    let data = [0x01, 0x02, 0x05, 0x00, 0x00, 0x00, 0x11, 0x22];
    assert!(matches!(
        Tlv::parse(2, 4, &data),
        Err(TlvError::TruncatedValue)
    ));
}

#[test]
fn mixed_elements_survive_a_serialize_parse_cycle() {
    let mut original = Tlv::new(2, 4);
    original.set(1, vec![0x11, 0x22]);
    original.set(100, vec![0xAA, 0xBB, 0xCC, 0xDD]);
    original.set(50, Vec::new());

    let parsed = Tlv::parse(2, 4, &original.serialize()).unwrap();
    assert_eq!(parsed.get(1), Some(&[0x11u8, 0x22][..]));
    assert_eq!(parsed.get(100), Some(&[0xAAu8, 0xBB, 0xCC, 0xDD][..]));
    assert_eq!(parsed.get(50), Some(&[][..]));
}

#[test]
fn one_byte_fields_cover_the_full_tag_range() {
    let mut tlv = Tlv::new(1, 1);
    tlv.set(255, vec![0x01, 0x02, 0x03]);
    let parsed = Tlv::parse(1, 1, &tlv.serialize()).unwrap();
    assert_eq!(parsed.get(255), Some(&[0x01u8, 0x02, 0x03][..]));
}

#[test]
fn four_byte_tags_hold_the_maximum_value() {
    let mut tlv = Tlv::new(4, 4);
    tlv.set(0xFFFF_FFFF, vec![0x01, 0x02]);
    let parsed = Tlv::parse(4, 4, &tlv.serialize()).unwrap();
    assert_eq!(parsed.get(0xFFFF_FFFF), Some(&[0x01u8, 0x02][..]));
}

#[test]
fn kilobyte_values_round_trip() {
    let value = vec![0xAB; 1000];
    let mut tlv = Tlv::new(2, 4);
    tlv.set(1, value.clone());
    let parsed = Tlv::parse(2, 4, &tlv.serialize()).unwrap();
    assert_eq!(parsed.get(1), Some(value.as_slice()));
}
