// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use fabstir_chat_sdk::handshake::{HandshakeError, HandshakePeer};

/// Shuttle messages between the two peers, the way the session layer
/// does, until neither side has anything left to send.
pub fn pump(
    client: &mut dyn HandshakePeer,
    server: &mut dyn HandshakePeer,
) -> Result<(), HandshakeError> {
    let mut outbound = client.next_message(None)?;
    let mut client_turn = false;
    while let Some(message) = outbound {
        outbound = if client_turn {
            client.next_message(Some(&message))?
        } else {
            server.next_message(Some(&message))?
        };
        client_turn = !client_turn;
    }
    Ok(())
}
