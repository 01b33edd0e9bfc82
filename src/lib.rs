// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cipher;
pub mod client;
pub mod handshake;
pub mod rpc;
pub mod session;

// Re-export the application-facing surface
pub use client::{
    ChatClient, ChatCompletionItem, ChatCompletionStream, ClientConfig, ClientError, ClientHooks,
};
pub use rpc::{RequestError, RpcClient, RpcConfig, RpcHooks};
pub use session::{Connection, SecureConnection, SessionConfig, SessionError, WebSocketConnection};

// Re-export the protocol layer for servers and tooling
pub use cipher::{Decryptor, Encryptor};
pub use handshake::{
    export_registration, parse_registration, register, HandshakeError, HandshakePeer,
};
