// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Secure sessions against the in-process server: login, traffic,
//! resumption and the negotiation flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fabstir_chat_sdk::session::{
    pipe, Connection, SecureConnection, SessionConfig, PROTOCOL_PASSWORD, PROTOCOL_PSK,
};

use super::support::{ServerState, TestServer};

#[tokio::test]
async fn password_login_carries_compressed_encrypted_traffic() {
    let (client_end, server_end) = pipe();
    let state = ServerState::new();
    state.add_account("alice", "correct horse battery");

    let mut server = TestServer::over_pipe(server_end, Arc::clone(&state));
    let driver = tokio::spawn(async move {
        let protocol = server.handshake().await;
        let frame = server.recv_app().await.expect("application frame");
        server.send_app(&frame).await;
        (protocol, frame)
    });

    let session = SecureConnection::with_credentials(
        Box::new(client_end),
        "alice",
        "correct horse battery",
        SessionConfig::default(),
    );
    session.connect().await.expect("connect");

    // Repetitive and well past the compression threshold, so the frame
    // travels zstd-compressed inside the AEAD envelope.
    let payload = b"the quick brown fox jumps over the lazy dog ".repeat(100);
    session.send(payload.clone()).await.expect("send");
    let echoed = session
        .receive()
        .await
        .expect("receive")
        .expect("session open");
    assert_eq!(echoed, payload);

    session.close().await;
    let (protocol, seen) = driver.await.expect("server task");
    assert_eq!(protocol, PROTOCOL_PASSWORD);
    assert_eq!(seen, payload);
}

#[tokio::test]
async fn second_connect_resumes_with_the_issued_key() {
    let (client_end, server_end) = pipe();
    let state = ServerState::new();
    state.add_account("alice", "pw");

    let mut server = TestServer::over_pipe(server_end, Arc::clone(&state));
    let driver = tokio::spawn(async move {
        let first = server.handshake().await;
        let second = server.handshake().await;
        (first, second)
    });

    let session = SecureConnection::with_credentials(
        Box::new(client_end),
        "alice",
        "pw",
        SessionConfig::default(),
    );
    session.connect().await.expect("first connect");
    assert!(session.can_resume().await);

    // The pipe is still open, so reconnecting reruns only the
    // authentication. The password is burned; the resumption key from the
    // first negotiation takes over.
    session.connect().await.expect("second connect");

    let (first, second) = driver.await.expect("server task");
    assert_eq!(first, PROTOCOL_PASSWORD);
    assert_eq!(second, PROTOCOL_PSK);
    assert_eq!(state.issued_key_count(), 2);
}

#[tokio::test]
async fn under_attack_report_fires_the_callback() {
    let (client_end, server_end) = pipe();
    let state = ServerState::new();
    state.add_account("alice", "pw");
    state.flag_under_attack();

    let mut server = TestServer::over_pipe(server_end, Arc::clone(&state));
    let driver = tokio::spawn(async move {
        server.handshake().await;
    });

    let fired = Arc::new(AtomicBool::new(false));
    let session = SecureConnection::with_credentials(
        Box::new(client_end),
        "alice",
        "pw",
        SessionConfig::default(),
    )
    .on_under_attack({
        let fired = Arc::clone(&fired);
        move || fired.store(true, Ordering::SeqCst)
    });

    session.connect().await.expect("connect");
    driver.await.expect("server task");
    assert!(fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn transport_encryption_turns_off_the_inner_cipher() {
    let (client_end, server_end) = pipe();
    let state = ServerState::new();
    state.add_account("alice", "pw");

    let mut server = TestServer::over_pipe(server_end, Arc::clone(&state));
    let driver = tokio::spawn(async move {
        server.handshake().await;
        // In plaintext mode the server decompresses the frame without
        // decrypting; an encrypted frame would fail right here.
        let frame = server.recv_app().await.expect("application frame");
        server.send_app(&frame).await;
        frame
    });

    let config = SessionConfig {
        assume_transport_encrypted: true,
        ..SessionConfig::default()
    };
    let session =
        SecureConnection::with_credentials(Box::new(client_end), "alice", "pw", config);
    session.connect().await.expect("connect");

    session.send(b"over tls".to_vec()).await.expect("send");
    let echoed = session
        .receive()
        .await
        .expect("receive")
        .expect("session open");
    assert_eq!(echoed, b"over tls");

    session.close().await;
    assert_eq!(driver.await.expect("server task"), b"over tls");
}

#[tokio::test]
async fn close_ends_a_parked_receive() {
    let (client_end, server_end) = pipe();
    let state = ServerState::new();
    state.add_account("alice", "pw");

    let mut server = TestServer::over_pipe(server_end, Arc::clone(&state));
    let driver = tokio::spawn(async move {
        server.handshake().await;
        // Drain until the client goes away.
        while server.recv_app().await.is_some() {}
    });

    let session = Arc::new(SecureConnection::with_credentials(
        Box::new(client_end),
        "alice",
        "pw",
        SessionConfig::default(),
    ));
    session.connect().await.expect("connect");

    let reader = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.receive().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.close().await;

    let received = tokio::time::timeout(Duration::from_secs(1), reader)
        .await
        .expect("close must unblock the reader")
        .expect("reader task");
    assert!(matches!(received, Ok(None)));
    assert!(session.is_closed());
    driver.await.expect("server task");
}
