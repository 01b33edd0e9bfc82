// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Client-side response caches.
//!
//! The server answers conditional reads with `304` when nothing changed
//! since the caller last fetched, and with `409` when a paged cursor went
//! stale because the underlying list moved. These caches turn those codes
//! back into data: [`ResourceCache`] keeps whole responses by key,
//! [`PagedResourceCache`] keeps a window over a remote list.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::rpc::{lock, RequestError, CONFLICT, NOT_MODIFIED};

/// Keyed cache over whole responses.
///
/// Values are stored as JSON so one cache can hold entries of different
/// types. Keys are segment lists, JSON-escaped so `["a", "b/c"]` and
/// `["a/b", "c"]` can never collide.
#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch through `getter` and cache the result.
    ///
    /// A `304 Not Modified` from the getter is answered from the cache; if
    /// nothing is cached under the key that is a protocol error and comes
    /// back as `RequestError(-1, "Cache error")`. Every other error
    /// propagates untouched.
    pub async fn get_with<T, F, Fut>(&self, key: &[&str], getter: F) -> Result<T, RequestError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let key = key_of(key);
        match getter().await {
            Ok(value) => {
                match serde_json::to_value(&value) {
                    Ok(stored) => {
                        lock(&self.entries).insert(key, stored);
                    }
                    Err(error) => debug!(%key, %error, "response not cacheable"),
                }
                Ok(value)
            }
            Err(error) if error.code == NOT_MODIFIED => {
                let cached = lock(&self.entries).get(&key).cloned();
                let Some(stored) = cached else {
                    return Err(RequestError::new(-1, "Cache error"));
                };
                serde_json::from_value(stored).map_err(|_| RequestError::new(-1, "Cache error"))
            }
            Err(error) => Err(error),
        }
    }

    /// Replace the entry under `key` with `updater(previous)`.
    pub fn update(&self, key: &[&str], updater: impl FnOnce(Option<Value>) -> Value) {
        let key = key_of(key);
        let mut entries = lock(&self.entries);
        let previous = entries.get(&key).cloned();
        entries.insert(key, updater(previous));
    }

    pub fn delete(&self, key: &[&str]) {
        lock(&self.entries).remove(&key_of(key));
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

fn key_of(key: &[&str]) -> String {
    let segments = key
        .iter()
        .map(|segment| Value::String((*segment).to_string()))
        .collect();
    Value::Array(segments).to_string()
}

/// One position of a paged window.
#[derive(Debug, Clone)]
enum PageSlot<T> {
    /// Never fetched from the server.
    Unfetched,
    /// Fetched, but the list ended before this position.
    Missing,
    Present(T),
}

/// Window cache over a remote list read in `(offset, quantity)` pages.
///
/// On a plain fetch the returned page is written into the window; a fetch
/// from offset 0 means the caller saw the list head, so the whole window is
/// rebuilt from it. On `304` the list is known unchanged and only the
/// positions never fetched are requested. A short page marks the end of the
/// list. On `409` the cached window is stale (the list changed under a
/// consecutive read); the cache clears itself and the error propagates so
/// the caller can restart from offset 0.
pub struct PagedResourceCache<T> {
    slots: Mutex<Vec<PageSlot<T>>>,
}

impl<T> Default for PagedResourceCache<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> PagedResourceCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the window `[offset, offset + quantity)` through `getter`.
    ///
    /// The getter takes `(offset, quantity)` and may be called more than
    /// once to fill gaps. Returns the items present in the window, which is
    /// fewer than `quantity` at the end of the list.
    pub async fn get_with<F, Fut>(
        &self,
        offset: usize,
        quantity: usize,
        getter: F,
    ) -> Result<Vec<T>, RequestError>
    where
        F: Fn(usize, usize) -> Fut,
        Fut: Future<Output = Result<Vec<T>, RequestError>>,
    {
        let result = self.fetch_window(offset, quantity, &getter).await;
        if let Err(error) = &result {
            if error.code == CONFLICT {
                lock(&self.slots).clear();
            }
        }
        result
    }

    async fn fetch_window<F, Fut>(
        &self,
        offset: usize,
        quantity: usize,
        getter: &F,
    ) -> Result<Vec<T>, RequestError>
    where
        F: Fn(usize, usize) -> Fut,
        Fut: Future<Output = Result<Vec<T>, RequestError>>,
    {
        match getter(offset, quantity).await {
            Ok(page) => {
                let mut slots = lock(&self.slots);
                if offset == 0 {
                    // The caller saw the current head; anything cached
                    // beyond this page may be stale.
                    slots.clear();
                }
                write_page(&mut slots, offset, quantity, &page);
                Ok(page)
            }
            Err(error) if error.code == NOT_MODIFIED => {
                self.fill_gaps(offset, quantity, getter).await?;
                Ok(self.window(offset, quantity))
            }
            Err(error) => Err(error),
        }
    }

    /// Fetch every still-unfetched run inside the window. Stops early when
    /// a short page shows the list ended.
    async fn fill_gaps<F, Fut>(
        &self,
        offset: usize,
        quantity: usize,
        getter: &F,
    ) -> Result<(), RequestError>
    where
        F: Fn(usize, usize) -> Fut,
        Fut: Future<Output = Result<Vec<T>, RequestError>>,
    {
        let mut from = 0;
        while from < quantity {
            let Some((start, len)) = self.next_gap(offset, from, quantity) else {
                break;
            };
            let page = getter(offset + start, len).await?;
            let ended = page.len() < len;
            write_page(&mut lock(&self.slots), offset + start, len, &page);
            if ended {
                break;
            }
            from = start + len;
        }
        Ok(())
    }

    /// First run of unfetched slots in `[from, quantity)`, window-relative.
    fn next_gap(&self, offset: usize, from: usize, quantity: usize) -> Option<(usize, usize)> {
        let slots = lock(&self.slots);
        let unfetched =
            |i: usize| matches!(slots.get(offset + i), None | Some(PageSlot::Unfetched));
        let start = (from..quantity).find(|i| unfetched(*i))?;
        let end = (start..quantity)
            .find(|i| !unfetched(*i))
            .unwrap_or(quantity);
        Some((start, end - start))
    }

    fn window(&self, offset: usize, quantity: usize) -> Vec<T> {
        let slots = lock(&self.slots);
        (offset..offset + quantity)
            .filter_map(|i| match slots.get(i) {
                Some(PageSlot::Present(item)) => Some(item.clone()),
                _ => None,
            })
            .collect()
    }

    /// Replace the first cached item matching `filter` with
    /// `updater(item)`. Does nothing when no cached item matches.
    pub fn update(&self, filter: impl Fn(&T) -> bool, updater: impl FnOnce(T) -> T) {
        let mut slots = lock(&self.slots);
        let found = slots
            .iter_mut()
            .find(|slot| matches!(slot, PageSlot::Present(item) if filter(item)));
        if let Some(slot) = found {
            if let PageSlot::Present(item) = std::mem::replace(slot, PageSlot::Unfetched) {
                *slot = PageSlot::Present(updater(item));
            }
        }
    }

    /// Insert an item at the front of the window, e.g. after creating a
    /// resource the server will list first.
    pub fn unshift(&self, item: T) {
        lock(&self.slots).insert(0, PageSlot::Present(item));
    }

    /// Drop every cached item matching `filter`.
    pub fn delete(&self, filter: impl Fn(&T) -> bool) {
        lock(&self.slots).retain(|slot| !matches!(slot, PageSlot::Present(item) if filter(item)));
    }

    pub fn clear(&self) {
        lock(&self.slots).clear();
    }
}

fn write_page<T: Clone>(slots: &mut Vec<PageSlot<T>>, at: usize, want: usize, page: &[T]) {
    if slots.len() < at + want {
        slots.resize_with(at + want, || PageSlot::Unfetched);
    }
    for (i, item) in page.iter().enumerate() {
        slots[at + i] = PageSlot::Present(item.clone());
    }
    for i in page.len()..want {
        slots[at + i] = PageSlot::Missing;
    }
}
