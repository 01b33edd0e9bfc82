// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! The whole stack against a real WebSocket server: enrollment, login,
//! typed calls, streaming, disconnect and resumption.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use fabstir_chat_sdk::client::{
    ChatClient, ChatCompletionItem, ChatCompletionParams, ChatMessage, ClientConfig, ClientHooks,
    GetChatListParams, GetModelListParams, ModelSettings,
};
use fabstir_chat_sdk::handshake::{export_registration, parse_registration};
use fabstir_chat_sdk::session::{PROTOCOL_PASSWORD, PROTOCOL_PSK};

use super::support::{ServerState, ServerTransport, TestServer};

struct ChatServer {
    address: String,
    state: Arc<ServerState>,
    /// Every application request, in arrival order across connections.
    requests: Arc<Mutex<Vec<Value>>>,
    /// The protocol selector of each served handshake.
    protocols: Arc<Mutex<Vec<u8>>>,
}

/// Accept chat connections on an ephemeral port and answer the canned
/// API below.
async fn spawn_chat_server() -> ChatServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = format!("127.0.0.1:{}", listener.local_addr().expect("addr").port());
    let state = ServerState::new();
    let requests: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let protocols: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

    {
        let state = Arc::clone(&state);
        let requests = Arc::clone(&requests);
        let protocols = Arc::clone(&protocols);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&state);
                let requests = Arc::clone(&requests);
                let protocols = Arc::clone(&protocols);
                tokio::spawn(async move {
                    let ws = match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };
                    let mut server = TestServer::new(ServerTransport::WebSocket(ws), state);
                    let protocol = server.handshake().await;
                    protocols.lock().unwrap().push(protocol);
                    server
                        .serve_json(|request| {
                            requests.lock().unwrap().push(request.clone());
                            respond(request)
                        })
                        .await;
                });
            }
        });
    }

    ChatServer {
        address,
        state,
        requests,
        protocols,
    }
}

fn respond(request: Value) -> Vec<Value> {
    let id = request["id"].clone();
    match request["method"].as_str().unwrap_or_default() {
        "newChat" => vec![json!({ "id": id, "result": "chat-99" })],
        "getChatList" => vec![json!({ "id": id, "result": { "list": [
            { "id": "chat-99", "metadata": { "title": "Greetings" } },
            { "id": "chat-12" },
        ] } })],
        "getModelList" => vec![json!({ "id": id, "result": [
            { "id": "model-7", "metadata": { "name": "tiny" } },
        ] })],
        "newModel" => vec![json!({ "id": id, "result": "model-7" })],
        "chatCompletion" => vec![
            json!({ "id": id, "result": "Hello" }),
            json!({ "id": id, "result": ", world" }),
            json!({ "id": id, "result": {
                "userMessageId": "msg-1",
                "assistantMessageId": "msg-2",
            }, "end": true }),
        ],
        other => vec![json!({ "id": id, "error": {
            "code": 404,
            "message": format!("unknown method: {other}"),
        } })],
    }
}

fn plain_config() -> ClientConfig {
    ClientConfig {
        use_tls: false,
        ..ClientConfig::default()
    }
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let start = tokio::time::Instant::now();
    while !check() {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn full_chat_session_over_a_real_socket() {
    let server = spawn_chat_server().await;

    // Enrollment as deployed: the user exports a registration string, the
    // server parses it and files the record under the exported username.
    let exported = export_registration("alice", "correct horse", None).unwrap();
    let parsed = parse_registration(&exported).unwrap();
    server.state.add_record(&parsed.username, parsed.record);

    let client = ChatClient::new(
        server.address.clone(),
        plain_config(),
        ClientHooks::default(),
    );
    client.connect("alice", "correct horse").await.expect("connect");

    let chat_id = client.new_chat().await.expect("newChat");
    assert_eq!(chat_id, "chat-99");

    let chats = client
        .get_chat_list(GetChatListParams {
            start: 0,
            quantity: 25,
            meta_data_keys: Some(vec!["title".into()]),
        })
        .await
        .expect("getChatList");
    assert_eq!(chats.list.len(), 2);
    assert_eq!(chats.list[0].id, "chat-99");
    assert_eq!(chats.list[0].metadata.as_ref().unwrap()["title"], "Greetings");
    assert!(chats.list[1].metadata.is_none());

    let models = client
        .get_model_list(GetModelListParams {
            metadata_keys: Some(vec!["name".into()]),
        })
        .await
        .expect("getModelList");
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].id, "model-7");

    let model_id = client
        .new_model(ModelSettings {
            provider_name: "llama".into(),
            provider_params: json!({ "temperature": 0.2 }),
        })
        .await
        .expect("newModel");
    assert_eq!(model_id, "model-7");

    let mut stream = client
        .chat_completion(ChatCompletionParams {
            id: chat_id.clone(),
            model_id: model_id.clone(),
            parent: None,
            user_message: ChatMessage::user("Say hello"),
        })
        .await
        .expect("chatCompletion");

    let mut reply = String::new();
    let info = loop {
        match stream.next().await.expect("stream item") {
            ChatCompletionItem::Segment(text) => reply.push_str(&text),
            ChatCompletionItem::Done(info) => break info,
        }
    };
    assert_eq!(reply, "Hello, world");
    assert_eq!(info.user_message_id, "msg-1");
    assert_eq!(info.assistant_message_id, "msg-2");

    // The wire shapes the server actually saw.
    let requests = server.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[0]["method"], "newChat");
    assert_eq!(requests[0]["params"], Value::Null);
    assert_eq!(
        requests[1]["params"],
        json!({ "start": 0, "quantity": 25, "metaDataKeys": ["title"] })
    );
    assert_eq!(requests[2]["params"], json!({ "metadataKeys": ["name"] }));
    assert_eq!(
        requests[3]["params"],
        json!({ "providerName": "llama", "providerParams": { "temperature": 0.2 } })
    );
    assert_eq!(
        requests[4]["params"],
        json!({
            "id": "chat-99",
            "modelId": "model-7",
            "userMessage": {
                "role": "user",
                "content": [{ "type": "text", "data": "Say hello" }],
            },
        })
    );

    assert_eq!(server.protocols.lock().unwrap().as_slice(), &[PROTOCOL_PASSWORD]);
    client.close().await;
}

#[tokio::test]
async fn reconnect_resumes_the_session_and_reports_attacks() {
    let server = spawn_chat_server().await;
    server.state.add_account("alice", "pw");

    let attacked = Arc::new(AtomicBool::new(false));
    let disconnects: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let hooks = ClientHooks {
        on_disconnected: Box::new({
            let disconnects = Arc::clone(&disconnects);
            move |error| {
                disconnects
                    .lock()
                    .unwrap()
                    .push(error.map(|e| e.to_string()));
            }
        }),
        was_under_attack: Box::new({
            let attacked = Arc::clone(&attacked);
            move || attacked.store(true, Ordering::SeqCst)
        }),
    };

    let client = ChatClient::new(server.address.clone(), plain_config(), hooks);
    client.connect("alice", "pw").await.expect("connect");
    assert_eq!(client.new_chat().await.unwrap(), "chat-99");
    assert!(!attacked.load(Ordering::SeqCst));

    client.close().await;
    wait_until("the disconnect hook", || disconnects.lock().unwrap().len() == 1).await;
    // An orderly close reaches the hook without an error.
    assert_eq!(disconnects.lock().unwrap().as_slice(), &[None]);

    // Someone guessed at the password while we were away.
    server.state.flag_under_attack();
    client.reconnect().await.expect("reconnect");
    assert!(attacked.load(Ordering::SeqCst));

    // The revived session serves calls like the first one did.
    assert_eq!(client.new_chat().await.unwrap(), "chat-99");

    assert_eq!(
        server.protocols.lock().unwrap().as_slice(),
        &[PROTOCOL_PASSWORD, PROTOCOL_PSK]
    );
    assert_eq!(server.state.issued_key_count(), 2);
    client.close().await;
}
