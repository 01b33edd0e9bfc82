// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! High-level chat client.
//!
//! [`ChatClient`] owns the whole connection stack: a WebSocket to the
//! server, the encrypted session on top of it, and the RPC multiplexer
//! above that. Applications call typed methods and get typed results;
//! every response is validated before it is handed out, so a misbehaving
//! server surfaces as a [`RequestError`] instead of a panic deeper in the
//! application.
//!
//! ## Connection lifecycle
//!
//! `connect` builds a fresh stack and logs in with the given credentials.
//! The previous connection, if any, is closed and its cached responses are
//! dropped. After a disconnect, `reconnect` revives the existing stack
//! with the session resumption key negotiated earlier; if that fails the
//! application has to prompt for credentials and `connect` again.
//!
//! ```no_run
//! # use fabstir_chat_sdk::client::{ChatClient, ClientConfig, ClientHooks};
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ChatClient::new("chat.example.com/ws", ClientConfig::default(), ClientHooks::default());
//! client.connect("alice", "correct horse battery staple").await?;
//! let chat_id = client.new_chat().await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod types;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::rpc::{lock, RequestError, RpcClient, RpcConfig, RpcHooks, StreamItem, StreamRequest};
use crate::session::{SecureConnection, SessionConfig, SessionError, WebSocketConnection};

pub use cache::{PagedResourceCache, ResourceCache};
pub use types::{
    ChatCompletionInfo, ChatCompletionParams, ChatList, ChatListItem, ChatMessage, ContentPart,
    GetChatListParams, GetModelListParams, MessageRole, ModelEntry, ModelSettings,
};

/// Connection lifecycle errors. Typed calls return [`RequestError`]
/// instead, because their failures carry server error codes.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `connect` has never been called, so there is no session to revive.
    #[error("Cannot reconnect as there is no old connection")]
    NoPreviousConnection,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Client behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connect with `wss://` instead of `ws://`.
    pub use_tls: bool,
    pub rpc: RpcConfig,
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            use_tls: true,
            rpc: RpcConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Event callbacks. All of them may fire from a background task.
pub struct ClientHooks {
    /// The connection closed: `None` for an orderly close by the peer,
    /// `Some` when the read path failed and the session is unusable.
    pub on_disconnected: Box<dyn Fn(Option<SessionError>) + Send + Sync>,
    /// The server saw failed authentication attempts against this account
    /// since the last session.
    pub was_under_attack: Box<dyn Fn() + Send + Sync>,
}

impl Default for ClientHooks {
    fn default() -> Self {
        Self {
            on_disconnected: Box::new(|_| {}),
            was_under_attack: Box::new(|| {}),
        }
    }
}

/// Typed client for the chat API.
pub struct ChatClient {
    host: String,
    config: ClientConfig,
    hooks: Arc<ClientHooks>,
    rpc: Mutex<Option<Arc<RpcClient>>>,
    cache: ResourceCache,
}

impl ChatClient {
    /// `host` is the server address without a scheme, e.g.
    /// `"chat.example.com:4443/ws"`; the scheme comes from
    /// [`ClientConfig::use_tls`].
    pub fn new(host: impl Into<String>, config: ClientConfig, hooks: ClientHooks) -> Self {
        Self {
            host: host.into(),
            config,
            hooks: Arc::new(hooks),
            rpc: Mutex::new(None),
            cache: ResourceCache::new(),
        }
    }

    /// Log in with fresh credentials over a fresh connection.
    ///
    /// Any previous connection is closed and the response cache is
    /// dropped: its entries belong to the old session.
    pub async fn connect(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let previous = lock(&self.rpc).take();
        if let Some(previous) = previous {
            previous.close().await;
        }
        self.cache.clear();

        let socket = WebSocketConnection::new(&self.host, self.config.use_tls)?;
        let attack_hooks = Arc::clone(&self.hooks);
        let secure = SecureConnection::with_credentials(
            Box::new(socket),
            username,
            password,
            self.config.session.clone(),
        )
        .on_under_attack(move || (attack_hooks.was_under_attack)());

        let disconnect_hooks = Arc::clone(&self.hooks);
        let error_hooks = Arc::clone(&self.hooks);
        let client = Arc::new(RpcClient::new(
            Arc::new(secure),
            self.config.rpc.clone(),
            RpcHooks {
                on_disconnect: Box::new(move || (disconnect_hooks.on_disconnected)(None)),
                on_critical_error: Box::new(move |error| {
                    (error_hooks.on_disconnected)(Some(error))
                }),
            },
        ));
        // Stored before connecting: `reconnect` retries whatever sits
        // here, even when the first attempt fails.
        *lock(&self.rpc) = Some(Arc::clone(&client));
        client.connect().await?;
        Ok(())
    }

    /// Revive the existing connection with its resumption key.
    ///
    /// The response cache is dropped, the server may have moved on while
    /// the client was away.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        let client = lock(&self.rpc)
            .clone()
            .ok_or(ClientError::NoPreviousConnection)?;
        self.cache.clear();
        client.connect().await?;
        Ok(())
    }

    /// Close the connection. The client can `reconnect` later.
    pub async fn close(&self) {
        let client = lock(&self.rpc).clone();
        if let Some(client) = client {
            client.close().await;
        }
    }

    /// Cache for callers to wrap conditional reads in. Cleared on every
    /// `connect` and `reconnect`.
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// A window of the chat list, newest chat first.
    pub async fn get_chat_list(&self, params: GetChatListParams) -> Result<ChatList, RequestError> {
        let result = self.call("getChatList", &params).await?;
        parse_chat_list(result)
    }

    /// Create an empty chat and return its id.
    pub async fn new_chat(&self) -> Result<String, RequestError> {
        let result = self.client()?.request("newChat", Value::Null).await?;
        parse_string(result)
    }

    /// Append a user message to a chat and stream back the reply.
    ///
    /// The returned stream yields the assistant reply in segments and
    /// finishes with the ids the server assigned to both stored messages.
    pub async fn chat_completion(
        &self,
        params: ChatCompletionParams,
    ) -> Result<ChatCompletionStream, RequestError> {
        let client = self.client()?;
        let inner = client
            .stream_request("chatCompletion", to_params(&params)?)
            .await?;
        Ok(ChatCompletionStream { inner })
    }

    /// The models this account can run completions with.
    pub async fn get_model_list(
        &self,
        params: GetModelListParams,
    ) -> Result<Vec<ModelEntry>, RequestError> {
        let result = self.call("getModelList", &params).await?;
        parse_model_list(result)
    }

    /// Register a model configuration and return its id.
    pub async fn new_model(&self, settings: ModelSettings) -> Result<String, RequestError> {
        let result = self.call("newModel", &settings).await?;
        parse_string(result)
    }

    fn client(&self) -> Result<Arc<RpcClient>, RequestError> {
        lock(&self.rpc)
            .clone()
            .ok_or_else(|| RequestError::new(-1, "client not connected"))
    }

    async fn call(&self, method: &str, params: &impl Serialize) -> Result<Value, RequestError> {
        let client = self.client()?;
        client.request(method, to_params(params)?).await
    }
}

/// In-flight `chatCompletion` call.
pub struct ChatCompletionStream {
    inner: StreamRequest,
}

/// One step of a completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCompletionItem {
    /// The next chunk of the assistant reply.
    Segment(String),
    /// The reply is complete.
    Done(ChatCompletionInfo),
}

impl ChatCompletionStream {
    /// The next segment, or [`ChatCompletionItem::Done`] once the reply
    /// is complete. Calling again after `Done` is an error.
    pub async fn next(&mut self) -> Result<ChatCompletionItem, RequestError> {
        match self.inner.next().await? {
            StreamItem::Segment(value) => match value.as_str() {
                Some(text) => Ok(ChatCompletionItem::Segment(text.to_owned())),
                None => Err(RequestError::new(
                    -1,
                    "Invalid segment, value should be a string",
                )),
            },
            StreamItem::Done(value) => Ok(ChatCompletionItem::Done(parse_completion_info(value)?)),
        }
    }
}

fn to_params(params: &impl Serialize) -> Result<Value, RequestError> {
    serde_json::to_value(params).map_err(|error| RequestError::new(-1, error.to_string()))
}

fn invalid_response(detail: &str) -> RequestError {
    RequestError::new(-1, format!("Invalid response, {detail}"))
}

fn parse_string(result: Value) -> Result<String, RequestError> {
    match result {
        Value::String(text) => Ok(text),
        _ => Err(invalid_response("result should be a string")),
    }
}

fn parse_chat_list(result: Value) -> Result<ChatList, RequestError> {
    let Some(object) = result.as_object() else {
        return Err(invalid_response("result should be an object"));
    };
    let Some(list) = object.get("list").and_then(Value::as_array) else {
        return Err(invalid_response("invalid list"));
    };
    let list = list
        .iter()
        .map(|item| {
            let (id, metadata) = parse_listed_entry(item)?;
            Ok(ChatListItem { id, metadata })
        })
        .collect::<Result<_, RequestError>>()?;
    Ok(ChatList { list })
}

fn parse_model_list(result: Value) -> Result<Vec<ModelEntry>, RequestError> {
    let Some(list) = result.as_array() else {
        return Err(invalid_response("result should be an array"));
    };
    list.iter()
        .map(|item| {
            let (id, metadata) = parse_listed_entry(item)?;
            Ok(ModelEntry { id, metadata })
        })
        .collect()
}

/// Common shape of chat-list and model-list entries: a string `id` plus an
/// optional metadata object.
fn parse_listed_entry(item: &Value) -> Result<(String, Option<Value>), RequestError> {
    let id = item
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_response("id missing"))?;
    let metadata = match item.get("metadata") {
        None => None,
        Some(value) if value.is_object() => Some(value.clone()),
        Some(_) => return Err(invalid_response("invalid metadata")),
    };
    Ok((id.to_owned(), metadata))
}

fn parse_completion_info(value: Value) -> Result<ChatCompletionInfo, RequestError> {
    let Some(object) = value.as_object() else {
        return Err(RequestError::new(
            -1,
            "Invalid final response, value should be an object",
        ));
    };
    let user_message_id = object
        .get("userMessageId")
        .and_then(Value::as_str)
        .ok_or_else(|| RequestError::new(-1, "Invalid final response, invalid userMessageId"))?;
    let assistant_message_id = object
        .get("assistantMessageId")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            RequestError::new(-1, "Invalid final response, invalid assistantMessageId")
        })?;
    Ok(ChatCompletionInfo {
        user_message_id: user_message_id.to_owned(),
        assistant_message_id: assistant_message_id.to_owned(),
    })
}
