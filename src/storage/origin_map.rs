//! Encrypted, origin-keyed map shared by the approval and connection
//! registries.
//!
//! ```text
//! in memory:  Option<BTreeMap<origin, V>>     None = locked / not loaded
//! persisted:  session.encrypt(json([[origin, V], ...]), mode)
//! backup:     hmac || encrypt(json([[origin, V], ...]), backup_password)
//! ```
//!
//! The whole map is rewritten after every state-changing mutation. A
//! mutation that leaves the map unchanged performs no write. Mutations are
//! serialized, and the in-memory map only changes once the write has
//! succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use super::KeyValueStore;
use crate::crypto::{self, EncryptionMode};
use crate::error::{Error, Result};
use crate::session::SessionLock;

/// An origin-keyed map persisted encrypted under the session secret
pub struct EncryptedOriginMap<V> {
    component: &'static str,
    mode: EncryptionMode,
    session: Arc<SessionLock>,
    store: Arc<dyn KeyValueStore>,
    entries: RwLock<Option<BTreeMap<String, V>>>,
    writes: Mutex<()>,
}

impl<V> EncryptedOriginMap<V>
where
    V: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync,
{
    /// Create an unloaded map
    ///
    /// `component` names the map in backup errors and logs.
    pub fn new(
        component: &'static str,
        mode: EncryptionMode,
        session: Arc<SessionLock>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            component,
            mode,
            session,
            store,
            entries: RwLock::new(None),
            writes: Mutex::new(()),
        }
    }

    /// Component name
    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Whether the map has been decrypted into memory
    pub fn is_loaded(&self) -> bool {
        self.entries.read().is_some()
    }

    /// Decrypt the persisted map into memory; no-op if already loaded
    pub async fn load(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        self.session.ensure_unlocked()?;

        let entries = match self.store.get().await? {
            Some(ciphertext) => {
                let json = self.session.decrypt(&ciphertext, self.mode)?;
                Self::parse(&json)
                    .map_err(|e| Error::StorageReadError(format!("{}: {}", self.component, e)))?
            }
            None => BTreeMap::new(),
        };

        tracing::debug!("{}: loaded {} entries", self.component, entries.len());
        *self.entries.write() = Some(entries);
        Ok(())
    }

    /// Forget the decrypted map
    pub fn unload(&self) {
        self.entries.write().take();
    }

    /// Value stored for `origin`
    pub fn get(&self, origin: &str) -> Option<V> {
        self.entries.read().as_ref()?.get(origin).cloned()
    }

    /// First entry matching `predicate`
    pub fn find(&self, predicate: impl Fn(&V) -> bool) -> Option<(String, V)> {
        self.entries
            .read()
            .as_ref()?
            .iter()
            .find(|(_, v)| predicate(v))
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// All entries, ordered by origin
    pub fn entries(&self) -> Vec<(String, V)> {
        self.entries
            .read()
            .as_ref()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Insert or replace the value for `origin`
    ///
    /// Returns `false` (and writes nothing) if the stored value is already
    /// equal to `value`.
    pub async fn upsert(&self, origin: &str, value: V) -> Result<bool> {
        let _write = self.writes.lock().await;
        self.load().await?;

        let mut next = self.snapshot()?;
        if next.get(origin) == Some(&value) {
            return Ok(false);
        }
        next.insert(origin.to_string(), value);

        self.commit(next).await?;
        Ok(true)
    }

    /// Remove `origin`, returning its previous value
    ///
    /// Nothing is written if the origin was absent.
    pub async fn remove(&self, origin: &str) -> Result<Option<V>> {
        let _write = self.writes.lock().await;
        self.load().await?;

        let mut next = self.snapshot()?;
        let removed = next.remove(origin);
        if removed.is_some() {
            self.commit(next).await?;
        }
        Ok(removed)
    }

    /// Empty the map and its storage slot
    pub async fn clear(&self) -> Result<()> {
        let _write = self.writes.lock().await;
        self.session.ensure_unlocked()?;

        self.store.clear().await?;
        if let Some(map) = self.entries.write().as_mut() {
            map.clear();
        }
        Ok(())
    }

    /// Encrypted backup of the persisted map, or `None` if nothing is stored
    pub async fn download_backup(&self, backup_password: &str) -> Result<Option<String>> {
        let Some(ciphertext) = self.store.get().await? else {
            return Ok(None);
        };

        let json = self.session.decrypt(&ciphertext, self.mode)?;
        let backup = crypto::encrypt(&json, backup_password, self.mode)?;
        crypto::generate_authenticated_backup(&backup, backup_password).map(Some)
    }

    /// Merge an uploaded backup into the map and persist it
    ///
    /// Uploaded entries replace existing ones for the same origin.
    pub async fn upload_backup(&self, blob: &str, backup_password: &str) -> Result<()> {
        let incorrect = || Error::IncorrectBackupFormat(self.component.to_string());

        let ciphertext = crypto::verify_and_strip(blob, backup_password).map_err(|_| incorrect())?;
        let json = crypto::decrypt(&ciphertext, backup_password, self.mode).map_err(|_| incorrect())?;
        let uploaded = Self::parse(&json).map_err(|_| incorrect())?;

        let _write = self.writes.lock().await;
        self.load().await?;

        let mut next = self.snapshot()?;
        next.extend(uploaded);
        self.commit(next).await?;

        tracing::info!("{}: restored from backup", self.component);
        Ok(())
    }

    fn snapshot(&self) -> Result<BTreeMap<String, V>> {
        self.entries.read().clone().ok_or(Error::NotProvided)
    }

    /// Persist `next`, and only then make it the in-memory state
    async fn commit(&self, next: BTreeMap<String, V>) -> Result<()> {
        let pairs: Vec<(&String, &V)> = next.iter().collect();
        let json = serde_json::to_string(&pairs)?;
        let ciphertext = self.session.encrypt(&json, self.mode)?;
        self.store.set(ciphertext).await?;

        *self.entries.write() = Some(next);
        Ok(())
    }

    fn parse(json: &str) -> Result<BTreeMap<String, V>> {
        let pairs: Vec<(String, V)> = serde_json::from_str(json)?;
        Ok(pairs.into_iter().collect())
    }
}
