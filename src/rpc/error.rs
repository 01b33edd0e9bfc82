// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::session::SessionError;

/// Server code for "the resource has not changed since the version the
/// client already holds"; the response cache turns it into a cache hit.
pub const NOT_MODIFIED: i64 = 304;

/// Server code for a stale paging cursor; the paged cache reacts by
/// clearing itself so the caller can refetch from the head.
pub const CONFLICT: i64 = 409;

/// The one error type the RPC surface exposes.
///
/// `code` is `-1` for client-local failures (timeout, malformed response,
/// closed connection); anything else is application defined and comes from
/// the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RequestError {
    pub code: i64,
    pub message: String,
}

impl RequestError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn timeout() -> Self {
        Self::new(-1, "Request timeout")
    }

    pub(crate) fn invalid_response() -> Self {
        Self::new(-1, "Invalid response")
    }

    pub(crate) fn closed() -> Self {
        Self::new(-1, "Connection closed")
    }

    pub(crate) fn finished() -> Self {
        Self::new(-1, "Stream finished")
    }
}

impl From<SessionError> for RequestError {
    fn from(error: SessionError) -> Self {
        Self::new(-1, error.to_string())
    }
}
