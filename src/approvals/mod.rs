//! # Approvals Module
//!
//! Per-origin trust flags.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        APPROVAL LIFECYCLE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  first approval ──► { origin, canSkipApprove }                         │
//! │  settings change ─► canSkipApprove flipped                             │
//! │  revoke / clear ──► entry removed                                       │
//! │                                                                         │
//! │  Persisted encrypted (Settings mode) as [[origin, {canSkipApprove}]].  │
//! │  Dropped from memory on logout.                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backup::Backupable;
use crate::crypto::EncryptionMode;
use crate::error::{Error, Result};
use crate::session::{SessionLock, SessionObserver};
use crate::storage::{EncryptedOriginMap, KeyValueStore};

/// Backup component key
pub const COMPONENT: &str = "approvals";

/// Stored flags for an approved origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostPermission {
    /// Proof requests from this origin skip the confirmation prompt
    pub can_skip_approve: bool,
}

/// An approved origin with its flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEntry {
    /// Requesting origin
    pub origin: String,
    /// Proof requests from this origin skip the confirmation prompt
    pub can_skip_approve: bool,
}

/// Read-only view of approval decisions
pub trait Approver: Send + Sync {
    /// Whether `origin` has been approved
    fn is_approved(&self, origin: &str) -> bool;

    /// Whether `origin` may skip confirmation prompts
    fn can_skip_approve(&self, origin: &str) -> bool;
}

/// Registry of approved origins
pub struct ApprovalRegistry {
    hosts: EncryptedOriginMap<HostPermission>,
}

impl ApprovalRegistry {
    /// Create a registry backed by its own storage slot
    pub fn new(session: Arc<SessionLock>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            hosts: EncryptedOriginMap::new(COMPONENT, EncryptionMode::Settings, session, store),
        }
    }

    /// Decrypt the persisted approvals; no-op if already loaded
    pub async fn unlock(&self) -> Result<bool> {
        self.hosts.load().await?;
        Ok(true)
    }

    /// Whether the approvals are decrypted in memory
    pub fn is_loaded(&self) -> bool {
        self.hosts.is_loaded()
    }

    /// All approved origins
    pub fn get_allowed_hosts(&self) -> Vec<String> {
        self.hosts.entries().into_iter().map(|(origin, _)| origin).collect()
    }

    /// Flags for `origin`, if approved
    pub fn get_permission(&self, origin: &str) -> Option<HostPermission> {
        self.hosts.get(origin)
    }

    /// All approvals with their flags
    pub fn entries(&self) -> Vec<ApprovalEntry> {
        self.hosts
            .entries()
            .into_iter()
            .map(|(origin, p)| ApprovalEntry {
                origin,
                can_skip_approve: p.can_skip_approve,
            })
            .collect()
    }

    /// Approve an origin (or update its flags)
    ///
    /// Re-adding an origin with unchanged flags writes nothing.
    pub async fn add(&self, entry: ApprovalEntry) -> Result<()> {
        if entry.origin.is_empty() {
            return Err(Error::OriginMissing);
        }

        let permission = HostPermission {
            can_skip_approve: entry.can_skip_approve,
        };
        if self.hosts.upsert(&entry.origin, permission).await? {
            tracing::info!(
                "Approved {} (can skip approve: {})",
                entry.origin,
                entry.can_skip_approve
            );
        }
        Ok(())
    }

    /// Change the skip-approve flag of an approved origin
    ///
    /// Fails with [`Error::NotApproved`] for an origin that was never
    /// approved; approval only happens through [`ApprovalRegistry::add`].
    pub async fn set_permission(&self, origin: &str, can_skip_approve: bool) -> Result<HostPermission> {
        if origin.is_empty() {
            return Err(Error::OriginMissing);
        }
        self.hosts.load().await?;
        if self.hosts.get(origin).is_none() {
            return Err(Error::NotApproved);
        }

        let permission = HostPermission { can_skip_approve };
        self.hosts.upsert(origin, permission).await?;
        tracing::debug!("Permission of {} set to {}", origin, can_skip_approve);
        Ok(permission)
    }

    /// Revoke an origin's approval
    pub async fn remove(&self, origin: &str) -> Result<bool> {
        let removed = self.hosts.remove(origin).await?.is_some();
        if removed {
            tracing::info!("Revoked approval of {}", origin);
        }
        Ok(removed)
    }

    /// Revoke every approval
    pub async fn clear(&self) -> Result<()> {
        self.hosts.clear().await?;
        tracing::info!("Cleared all approvals");
        Ok(())
    }
}

impl Approver for ApprovalRegistry {
    fn is_approved(&self, origin: &str) -> bool {
        self.hosts.get(origin).is_some()
    }

    fn can_skip_approve(&self, origin: &str) -> bool {
        self.hosts
            .get(origin)
            .map(|p| p.can_skip_approve)
            .unwrap_or(false)
    }
}

impl SessionObserver for ApprovalRegistry {
    fn on_lock(&self) {
        self.hosts.unload();
    }
}

#[async_trait]
impl Backupable for ApprovalRegistry {
    fn component_key(&self) -> &str {
        COMPONENT
    }

    async fn download_encrypted_storage(&self, backup_password: &str) -> Result<Option<String>> {
        self.hosts.download_backup(backup_password).await
    }

    async fn upload_encrypted_storage(&self, backup: &str, backup_password: &str) -> Result<()> {
        self.hosts.upload_backup(backup, backup_password).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
