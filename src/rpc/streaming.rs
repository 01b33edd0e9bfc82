// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use super::error::RequestError;
use super::lock;

/// One element of a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// An intermediate segment.
    Segment(Value),
    /// The final value; the stream is over after this.
    Done(Value),
}

/// Event pushed by the dispatch task into a stream handle.
pub(crate) enum StreamEvent {
    Segment(Value),
    Done(Value),
    Failed(RequestError),
}

pub(crate) type StreamMap = Mutex<HashMap<u64, mpsc::UnboundedSender<StreamEvent>>>;

/// Handle for one in-flight streaming request.
///
/// Each [`next`](Self::next) call re-arms the timeout, so it bounds the
/// gap between segments rather than the total stream duration. Dropping
/// the handle deregisters the stream; whatever the server still sends for
/// it is discarded.
pub struct StreamRequest {
    id: u64,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    timeout: Duration,
    finished: bool,
    streams: Arc<StreamMap>,
}

impl StreamRequest {
    pub(crate) fn new(
        id: u64,
        rx: mpsc::UnboundedReceiver<StreamEvent>,
        timeout: Duration,
        streams: Arc<StreamMap>,
    ) -> Self {
        Self {
            id,
            rx,
            timeout,
            finished: false,
            streams,
        }
    }

    /// Wait for the next element.
    ///
    /// Segments queued by the dispatcher drain in order before a trailing
    /// error is surfaced. After [`StreamItem::Done`] or any error, further
    /// calls fail with `"Stream finished"`.
    pub async fn next(&mut self) -> Result<StreamItem, RequestError> {
        if self.finished {
            return Err(RequestError::finished());
        }
        match tokio::time::timeout(self.timeout, self.rx.recv()).await {
            Ok(Some(StreamEvent::Segment(value))) => Ok(StreamItem::Segment(value)),
            Ok(Some(StreamEvent::Done(value))) => {
                self.finished = true;
                Ok(StreamItem::Done(value))
            }
            Ok(Some(StreamEvent::Failed(error))) => {
                self.finished = true;
                Err(error)
            }
            // The client went away without a terminal event.
            Ok(None) => {
                self.finished = true;
                Err(RequestError::closed())
            }
            Err(_elapsed) => {
                self.finished = true;
                lock(&self.streams).remove(&self.id);
                Err(RequestError::timeout())
            }
        }
    }
}

impl Drop for StreamRequest {
    fn drop(&mut self) {
        lock(&self.streams).remove(&self.id);
    }
}
