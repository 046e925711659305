// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pending Calls
//!
//! Keyed table of in-flight requests awaiting a reply from the other end of a
//! stream. Used by the broker (keyed by request id, room for progress
//! updates) and by the event bridge (keyed by correlation key, capacity 1).
//!
//! A waiter registers a key and gets back a [`PendingCall`]; the receive side
//! delivers replies with [`PendingCalls::resolve`] (never blocks, rejects when
//! the waiter's buffer is full) or [`PendingCalls::deliver`] (waits for buffer
//! space). The entry is removed when the `PendingCall` is dropped, whether it
//! completed, was cancelled, or the waiting future was itself dropped.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PendingCallError {
    #[error("a call is already pending for key '{0}'")]
    AlreadyPending(String),

    #[error("wait cancelled")]
    Cancelled,

    #[error("pending call table closed")]
    Closed,
}

/// Outcome of handing a reply to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Nobody is waiting on that key (late, duplicate or cancelled).
    NoWaiter,
    /// A waiter exists but its buffer is full.
    Rejected,
}

struct Slot<T> {
    id: u64,
    tx: mpsc::Sender<T>,
}

struct Inner<K, T> {
    slots: Mutex<HashMap<K, Slot<T>>>,
    closed: Mutex<bool>,
    next_id: AtomicU64,
    capacity: usize,
}

pub struct PendingCalls<K, T> {
    inner: Arc<Inner<K, T>>,
}

impl<K, T> Clone for PendingCalls<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, T> PendingCalls<K, T>
where
    K: Eq + Hash + Clone + Display + Send + 'static,
    T: Send + 'static,
{
    /// `capacity` is the number of replies a waiter can buffer before
    /// `resolve` rejects and `deliver` waits.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                closed: Mutex::new(false),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn register(&self, key: K) -> Result<PendingCall<K, T>, PendingCallError> {
        let closed = self.inner.closed.lock();
        if *closed {
            return Err(PendingCallError::Closed);
        }

        let mut slots = self.inner.slots.lock();
        if slots.contains_key(&key) {
            return Err(PendingCallError::AlreadyPending(key.to_string()));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        slots.insert(key.clone(), Slot { id, tx });

        Ok(PendingCall {
            key,
            id,
            rx,
            inner: self.inner.clone(),
        })
    }

    /// Non-blocking delivery; removal is left to the waiting side.
    pub fn resolve(&self, key: &K, value: T) -> Delivery {
        let slots = self.inner.slots.lock();
        match slots.get(key) {
            None => Delivery::NoWaiter,
            Some(slot) => match slot.tx.try_send(value) {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Rejected,
            },
        }
    }

    /// Delivery that waits for room in the waiter's buffer instead of
    /// rejecting. Returns [`Delivery::NoWaiter`] if the waiter goes away
    /// first.
    pub async fn deliver(&self, key: &K, value: T) -> Delivery {
        let tx = match self.inner.slots.lock().get(key) {
            Some(slot) => slot.tx.clone(),
            None => return Delivery::NoWaiter,
        };
        match tx.send(value).await {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::NoWaiter,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.slots.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every waiter with [`PendingCallError::Closed`] and refuse new
    /// registrations.
    pub fn close(&self) {
        let mut closed = self.inner.closed.lock();
        *closed = true;
        self.inner.slots.lock().clear();
    }
}

/// Waiting half of a registered key.
pub struct PendingCall<K: Eq + Hash, T> {
    key: K,
    id: u64,
    rx: mpsc::Receiver<T>,
    inner: Arc<Inner<K, T>>,
}

impl<K: Eq + Hash, T> PendingCall<K, T> {
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Receive the next reply, keeping the registration alive for more.
    pub async fn recv(&mut self, cancel: &CancellationToken) -> Result<T, PendingCallError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(PendingCallError::Cancelled),
            value = self.rx.recv() => value.ok_or(PendingCallError::Closed),
        }
    }

    /// Receive a single reply and release the registration.
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<T, PendingCallError> {
        self.recv(cancel).await
    }
}

impl<K: Eq + Hash, T> Drop for PendingCall<K, T> {
    fn drop(&mut self) {
        let mut slots = self.inner.slots.lock();
        if slots.get(&self.key).is_some_and(|slot| slot.id == self.id) {
            slots.remove(&self.key);
        }
    }
}
