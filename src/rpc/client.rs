// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! JSON request/response multiplexing over a [`Connection`].
//!
//! One background task reads frames and routes them by request id to
//! whichever caller is waiting, so any number of single-shot and streaming
//! calls can be in flight at once. Frames that do not parse, carry no
//! usable id, or refer to a request nobody is waiting for anymore are
//! dropped silently; a slow response arriving after its timeout must not
//! take the session down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::session::{Connection, SessionError};

use super::error::RequestError;
use super::lock;
use super::streaming::{StreamEvent, StreamMap, StreamRequest};

/// Request ids wrap just before this value so they always fit in an IEEE
/// double, which is what a JSON peer most likely parses numbers into.
pub const MAX_REQUEST_ID: u64 = (1 << 53) - 1;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

type RequestOutcome = Result<Value, RequestError>;
type PendingMap = Mutex<HashMap<u64, oneshot::Sender<RequestOutcome>>>;

/// RPC behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// How long a call waits for its response, and a stream for its next
    /// segment.
    pub request_timeout: Duration,
    /// Re-open a closed connection before sending instead of failing fast.
    /// Reconnecting runs a fresh resumption handshake on the session below.
    pub reconnect_before_send: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_before_send: true,
        }
    }
}

/// Callbacks fired from the dispatch task.
pub struct RpcHooks {
    /// The peer closed the connection in an orderly way. Pending calls are
    /// not failed proactively; they run into their own timeouts.
    pub on_disconnect: Box<dyn Fn() + Send + Sync>,
    /// The read path died, e.g. a frame failed authentication or arrived
    /// out of order. The session cannot be trusted afterwards.
    pub on_critical_error: Box<dyn Fn(SessionError) + Send + Sync>,
}

impl Default for RpcHooks {
    fn default() -> Self {
        Self {
            on_disconnect: Box::new(|| {}),
            on_critical_error: Box::new(|_| {}),
        }
    }
}

/// Asynchronous RPC client over any [`Connection`].
pub struct RpcClient {
    connection: Arc<dyn Connection>,
    config: RpcConfig,
    hooks: Arc<RpcHooks>,
    id_seed: Mutex<u64>,
    pending: Arc<PendingMap>,
    streams: Arc<StreamMap>,
}

impl RpcClient {
    pub fn new(connection: Arc<dyn Connection>, config: RpcConfig, hooks: RpcHooks) -> Self {
        Self {
            connection,
            config,
            hooks: Arc::new(hooks),
            id_seed: Mutex::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
            streams: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open the connection and start the dispatch task.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.connection.connect().await?;
        self.spawn_dispatch();
        Ok(())
    }

    /// Close the connection. In-flight calls are left to their timeouts.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Single-shot call with the configured timeout.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RequestError> {
        self.request_with_timeout(method, params, self.config.request_timeout)
            .await
    }

    /// Single-shot call with an explicit timeout.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, RequestError> {
        self.ensure_connected().await?;
        let id = self.next_id();

        // Register before sending; the response may beat us back.
        let (tx, mut rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        if let Err(send_error) = self.send_request(id, method, params).await {
            lock(&self.pending).remove(&id);
            return Err(send_error);
        }

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_closed)) => Err(RequestError::closed()),
            Err(_elapsed) => {
                if lock(&self.pending).remove(&id).is_some() {
                    Err(RequestError::timeout())
                } else {
                    // The dispatcher removed the entry first, so the
                    // outcome is already in the channel.
                    match rx.try_recv() {
                        Ok(outcome) => outcome,
                        Err(_) => Err(RequestError::timeout()),
                    }
                }
            }
        }
    }

    /// Start a streaming call; segments are pulled from the returned handle.
    pub async fn stream_request(
        &self,
        method: &str,
        params: Value,
    ) -> Result<StreamRequest, RequestError> {
        self.ensure_connected().await?;
        let id = self.next_id();

        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.streams).insert(id, tx);
        if let Err(send_error) = self.send_request(id, method, params).await {
            lock(&self.streams).remove(&id);
            return Err(send_error);
        }

        Ok(StreamRequest::new(
            id,
            rx,
            self.config.request_timeout,
            Arc::clone(&self.streams),
        ))
    }

    fn next_id(&self) -> u64 {
        let mut seed = lock(&self.id_seed);
        let id = *seed;
        *seed += 1;
        if *seed == MAX_REQUEST_ID {
            *seed = 0;
        }
        id
    }

    async fn ensure_connected(&self) -> Result<(), RequestError> {
        if !self.connection.is_closed() {
            return Ok(());
        }
        if !self.config.reconnect_before_send {
            return Err(RequestError::closed());
        }
        debug!("reconnecting before send");
        self.connect().await.map_err(RequestError::from)
    }

    async fn send_request(
        &self,
        id: u64,
        method: &str,
        params: Value,
    ) -> Result<(), RequestError> {
        let request = json!({ "id": id, "method": method, "params": params });
        let data =
            serde_json::to_vec(&request).map_err(|e| RequestError::new(-1, e.to_string()))?;
        self.connection.send(data).await.map_err(RequestError::from)
    }

    fn spawn_dispatch(&self) {
        let connection = Arc::clone(&self.connection);
        let pending = Arc::clone(&self.pending);
        let streams = Arc::clone(&self.streams);
        let hooks = Arc::clone(&self.hooks);
        tokio::spawn(async move {
            loop {
                match connection.receive().await {
                    Ok(Some(data)) => dispatch_frame(&pending, &streams, &data),
                    Ok(None) => {
                        debug!("rpc connection disconnected");
                        (hooks.on_disconnect)();
                        break;
                    }
                    Err(receive_error) => {
                        error!(error = %receive_error, "rpc receive failed");
                        (hooks.on_critical_error)(receive_error);
                        break;
                    }
                }
            }
        });
    }
}

fn dispatch_frame(pending: &PendingMap, streams: &StreamMap, data: &[u8]) {
    let response: Value = match serde_json::from_slice(data) {
        Ok(value) => value,
        Err(_) => {
            debug!("dropping unparseable rpc frame");
            return;
        }
    };
    let id = match response.get("id").and_then(Value::as_u64) {
        Some(id) if id < MAX_REQUEST_ID => id,
        _ => {
            debug!("dropping rpc frame without a usable id");
            return;
        }
    };

    // Single-shot requests are matched first; a known id never falls
    // through to the stream map. The outcome is sent under the map lock so
    // a timed-out caller that finds its entry gone can rely on the value
    // being in its channel already.
    {
        let mut pending_guard = lock(pending);
        if let Some(sender) = pending_guard.remove(&id) {
            let _ = sender.send(response_outcome(&response));
            return;
        }
    }

    let mut streams_guard = lock(streams);
    let Some(stream) = streams_guard.get(&id) else {
        debug!(id, "dropping rpc frame for unknown id");
        return;
    };
    if let Some(error_value) = response.get("error") {
        let _ = stream.send(StreamEvent::Failed(error_from_value(error_value)));
        streams_guard.remove(&id);
    } else if let Some(result) = response.get("result") {
        let end = response.get("end").and_then(Value::as_bool).unwrap_or(false);
        if end {
            let _ = stream.send(StreamEvent::Done(result.clone()));
            streams_guard.remove(&id);
        } else {
            let _ = stream.send(StreamEvent::Segment(result.clone()));
        }
    } else {
        let _ = stream.send(StreamEvent::Failed(RequestError::invalid_response()));
        streams_guard.remove(&id);
    }
}

fn response_outcome(response: &Value) -> RequestOutcome {
    if let Some(error_value) = response.get("error") {
        return Err(error_from_value(error_value));
    }
    if let Some(result) = response.get("result") {
        return Ok(result.clone());
    }
    Err(RequestError::invalid_response())
}

fn error_from_value(error_value: &Value) -> RequestError {
    let code = error_value.get("code").and_then(Value::as_i64).unwrap_or(-1);
    let message = error_value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_owned();
    RequestError::new(code, message)
}
