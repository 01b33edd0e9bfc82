// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Asynchronous JSON RPC over the secure session.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod client;
pub mod error;
pub mod streaming;

pub use client::{RpcClient, RpcConfig, RpcHooks, DEFAULT_REQUEST_TIMEOUT, MAX_REQUEST_ID};
pub use error::{RequestError, CONFLICT, NOT_MODIFIED};
pub use streaming::{StreamItem, StreamRequest};

/// Lock a request map, ignoring poisoning: the critical sections only
/// touch plain map state, which stays consistent even if a holder panics.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
