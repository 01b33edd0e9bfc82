// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Wire types for the chat API.
//!
//! Everything here serializes with camelCase field names, matching what the
//! server expects. Optional fields are omitted from the wire entirely when
//! unset rather than sent as `null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters for `getChatList`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetChatListParams {
    /// Index of the first chat to return, newest first.
    pub start: u64,
    /// Maximum number of chats to return.
    pub quantity: u64,
    /// Metadata keys to include with each entry (e.g. `"title"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_data_keys: Option<Vec<String>>,
}

/// One entry of the chat list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatListItem {
    pub id: String,
    /// Requested metadata entries, if any were asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Result of `getChatList`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatList {
    pub list: Vec<ChatListItem>,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ContentPart {
    Text(String),
}

/// A message as sent to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// A plain-text user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentPart::Text(text.into())],
        }
    }
}

/// Parameters for `chatCompletion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionParams {
    /// The chat to append to.
    pub id: String,
    /// The model that generates the reply.
    pub model_id: String,
    /// Message id to branch from; omit to continue from the latest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub user_message: ChatMessage,
}

/// Final value of a `chatCompletion` stream: the ids the server assigned to
/// the stored user message and the generated reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionInfo {
    pub user_message_id: String,
    pub assistant_message_id: String,
}

/// Parameters for `getModelList`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetModelListParams {
    /// Metadata keys to include with each entry (e.g. `"name"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_keys: Option<Vec<String>>,
}

/// One entry of the model list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Parameters for `newModel`: which provider backs the model and the
/// provider-specific configuration blob passed through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    pub provider_name: String,
    pub provider_params: Value,
}
