//! # Backup Module
//!
//! Combines the per-component encrypted backups into one downloadable file.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           BACKUP FILE                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  data:application/json;charset=utf-8,<urlencoded JSON>                 │
//! │                                                                         │
//! │  {                                                                      │
//! │    "approvals":   "<hmac hex><ciphertext>" | null,                     │
//! │    "connections": "<hmac hex><ciphertext>" | null                      │
//! │  }                                                                      │
//! │                                                                         │
//! │  Each value is produced by the component itself with the backup        │
//! │  password. A restore must contain every registered component key.     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::SessionLock;

/// Prefix of a downloadable backup
pub const DATA_URI_PREFIX: &str = "data:application/json;charset=utf-8,";

/// A component whose persisted state can be backed up
#[async_trait]
pub trait Backupable: Send + Sync {
    /// Key of this component in the backup file
    fn component_key(&self) -> &str;

    /// Authenticated backup of the component, `None` if it holds nothing
    async fn download_encrypted_storage(&self, backup_password: &str) -> Result<Option<String>>;

    /// Restore the component from its authenticated backup
    async fn upload_encrypted_storage(&self, backup: &str, backup_password: &str) -> Result<()>;
}

/// Restore request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBackup {
    /// Backup file contents, as raw JSON or as the downloaded data URI
    pub content: String,
    /// Password of this installation
    pub password: String,
    /// Password the backup was made with
    pub backup_password: String,
}

/// Orchestrates download and upload across all registered components
pub struct BackupService {
    session: Arc<SessionLock>,
    components: RwLock<Vec<Arc<dyn Backupable>>>,
}

impl BackupService {
    /// Create a service with no components
    pub fn new(session: Arc<SessionLock>) -> Self {
        Self {
            session,
            components: RwLock::new(Vec::new()),
        }
    }

    /// Register a component, replacing any with the same key
    pub fn add(&self, component: Arc<dyn Backupable>) {
        let mut components = self.components.write();
        components.retain(|c| c.component_key() != component.component_key());
        components.push(component);
    }

    /// Unregister a component
    pub fn remove(&self, key: &str) -> bool {
        let mut components = self.components.write();
        let before = components.len();
        components.retain(|c| c.component_key() != key);
        components.len() != before
    }

    /// Registered component keys
    pub fn component_keys(&self) -> Vec<String> {
        self.components
            .read()
            .iter()
            .map(|c| c.component_key().to_string())
            .collect()
    }

    /// Build the backup file, encrypted with `password`
    pub async fn download(&self, password: &str) -> Result<String> {
        self.session.is_authentic(password).await?;

        let mut backup = BTreeMap::new();
        for component in self.components() {
            let data = component.download_encrypted_storage(password).await?;
            backup.insert(component.component_key().to_string(), data);
        }

        let json = serde_json::to_string(&backup)?;
        tracing::info!("Backup created with {} components", backup.len());
        Ok(format!("{}{}", DATA_URI_PREFIX, urlencoding::encode(&json)))
    }

    /// Restore every registered component from a backup file
    pub async fn upload(&self, upload: UploadBackup) -> Result<()> {
        self.session.is_authentic(&upload.password).await?;

        let json = Self::decode_content(&upload.content)?;
        let backup: BTreeMap<String, Option<String>> =
            serde_json::from_str(&json).map_err(|_| Error::CorruptedBackup)?;

        let components = self.components();
        if components.iter().any(|c| !backup.contains_key(c.component_key())) {
            return Err(Error::CorruptedBackup);
        }

        for component in components {
            if let Some(Some(data)) = backup.get(component.component_key()) {
                component
                    .upload_encrypted_storage(data, &upload.backup_password)
                    .await?;
            }
        }

        tracing::info!("Backup restored");
        Ok(())
    }

    fn components(&self) -> Vec<Arc<dyn Backupable>> {
        self.components.read().clone()
    }

    fn decode_content(content: &str) -> Result<String> {
        let Some(encoded) = content.strip_prefix("data:") else {
            return Ok(content.to_string());
        };

        let (_, data) = encoded.split_once(',').ok_or(Error::CorruptedBackup)?;
        urlencoding::decode(data)
            .map(|decoded| decoded.into_owned())
            .map_err(|_| Error::CorruptedBackup)
    }
}

// ============================================================================
// TESTS
// ============================================================================
