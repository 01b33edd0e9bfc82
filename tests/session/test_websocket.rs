// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Transport checks against a real WebSocket server on a loopback port.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use fabstir_chat_sdk::session::{Connection, SessionError, WebSocketConnection};

/// Echo server on an ephemeral port. Accepts any number of connections;
/// answers binary frames verbatim and completes the closing handshake.
async fn echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                while let Some(message) = ws.next().await {
                    match message {
                        Ok(Message::Binary(data)) => {
                            if ws.send(Message::Binary(data)).await.is_err() {
                                break;
                            }
                        }
                        Ok(Message::Close(_)) | Err(_) => {
                            // Sink-level close: flushes the close reply
                            // already queued by reading the peer's close.
                            let _ = SinkExt::close(&mut ws).await;
                            break;
                        }
                        Ok(_) => continue,
                    }
                }
            });
        }
    });
    format!("127.0.0.1:{}", addr.port())
}

#[tokio::test]
async fn frames_round_trip_through_a_real_server() {
    let addr = echo_server().await;
    let connection = WebSocketConnection::new(&addr, false).expect("url");

    connection.connect().await.expect("connect");
    connection.send(b"hello".to_vec()).await.expect("send");
    let reply = connection
        .receive()
        .await
        .expect("receive")
        .expect("connection open");
    assert_eq!(reply, b"hello");
    connection.close().await;
    assert!(connection.is_closed());
}

#[tokio::test]
async fn connecting_twice_is_rejected() {
    let addr = echo_server().await;
    let connection = WebSocketConnection::new(&addr, false).expect("url");

    connection.connect().await.expect("connect");
    assert!(matches!(
        connection.connect().await,
        Err(SessionError::AlreadyOpen)
    ));
    connection.close().await;
}

#[tokio::test]
async fn reconnect_after_close_gets_a_fresh_stream() {
    let addr = echo_server().await;
    let connection = WebSocketConnection::new(&addr, false).expect("url");

    connection.connect().await.expect("first connect");
    connection.close().await;
    assert!(connection.is_closed());

    connection.connect().await.expect("second connect");
    connection.send(b"again".to_vec()).await.expect("send");
    let reply = connection
        .receive()
        .await
        .expect("receive")
        .expect("connection open");
    assert_eq!(reply, b"again");
    connection.close().await;
}

#[tokio::test]
async fn close_unblocks_a_parked_reader() {
    let addr = echo_server().await;
    let connection = Arc::new(WebSocketConnection::new(&addr, false).expect("url"));
    connection.connect().await.expect("connect");

    let reader = {
        let connection = Arc::clone(&connection);
        tokio::spawn(async move { connection.receive().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // `close` sends the close frame; the server answers and the parked
    // reader sees the orderly shutdown.
    connection.close().await;
    let received = tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("close must unblock the reader")
        .expect("reader task");
    assert!(matches!(received, Ok(None)));
    assert!(connection.is_closed());
}
