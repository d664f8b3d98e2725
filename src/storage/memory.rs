//! In-memory storage backend.
//!
//! Used in tests and by hosts that persist through their own layer. Each
//! slot counts its writes so callers can check that no-op mutations don't
//! touch storage, and can be given a byte quota like extension storage has.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{KeyValueStore, StorageProvider};
use crate::error::{Error, Result};

/// One in-memory slot
#[derive(Default)]
pub struct MemoryStore {
    value: RwLock<Option<String>>,
    quota: RwLock<Option<usize>>,
    set_calls: AtomicUsize,
    clear_calls: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit stored values to `bytes`; `None` removes the limit
    pub fn set_quota(&self, bytes: Option<usize>) {
        *self.quota.write() = bytes;
    }

    /// Number of `set` calls so far
    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    /// Number of `clear` calls so far
    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    /// Current raw value, bypassing the async interface
    pub fn peek(&self) -> Option<String> {
        self.value.read().clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self) -> Result<Option<String>> {
        Ok(self.value.read().clone())
    }

    async fn set(&self, value: String) -> Result<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        if matches!(*self.quota.read(), Some(limit) if value.len() > limit) {
            return Err(Error::StorageWriteError("quota exceeded".into()));
        }
        *self.value.write() = Some(value);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        *self.value.write() = None;
        Ok(())
    }
}

/// A set of in-memory slots keyed by name
#[derive(Default)]
pub struct MemoryStorage {
    slots: RwLock<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to a slot, for inspection
    pub fn slot(&self, key: &str) -> Arc<MemoryStore> {
        if let Some(slot) = self.slots.read().get(key) {
            return slot.clone();
        }

        self.slots
            .write()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new()))
            .clone()
    }
}

impl StorageProvider for MemoryStorage {
    fn open(&self, key: &str) -> Arc<dyn KeyValueStore> {
        self.slot(key)
    }
}
