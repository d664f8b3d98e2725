//! # Keeper Core
//!
//! The background trust and session core of a zero-knowledge identity
//! wallet. Every request a web page makes to use an identity passes through
//! here.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         KEEPER CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   page ──► injected provider ──► TrustGate ──► ProofRequestPipeline    │
//! │                                     │                   │               │
//! │                                     ▼                   ▼               │
//! │  ┌──────────────┐  ┌──────────────────────────┐  ┌──────────────┐      │
//! │  │ RequestBroker│◄─┤ Approval / Connection    │  │ Proof        │      │
//! │  │              │  │ registries               │  │ dispatch     │      │
//! │  │ - queue      │  │ - per-origin trust       │  │ - sandboxed  │      │
//! │  │ - popup      │  │ - encrypted at rest      │  │ - in process │      │
//! │  └──────────────┘  └────────────┬─────────────┘  └──────────────┘      │
//! │                                 │                                       │
//! │  ┌──────────────┐  ┌────────────▼─────────────┐  ┌──────────────┐      │
//! │  │   Backup     │  │      SessionLock         │  │    Crypto    │      │
//! │  │ - data URI   │──► - password verifier      │──► - AES-GCM    │      │
//! │  │ - HMAC       │  │ - unlock / logout        │  │ - HKDF       │      │
//! │  └──────────────┘  └──────────────────────────┘  └──────────────┘      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Encryption and authenticated backups
//! - [`session`] - Password-gated session lock
//! - [`storage`] - Persisted key-value slots
//! - [`approvals`] - Approved origins
//! - [`connections`] - Origin → identity connections
//! - [`broker`] - Requests awaiting user confirmation
//! - [`gate`] - Unlock → approve → connect flows
//! - [`proof`] - Proof request validation and dispatch
//! - [`backup`] - Backup file assembly
//! - [`surface`] - Host popup and messaging primitives
//! - [`identity`] - Identity lookup
//!
//! ## Host Collaborators
//!
//! | Interface | Provided by the host |
//! |-----------|---------------------|
//! | [`storage::StorageProvider`] | extension storage |
//! | [`surface::SurfaceController`] | popup windows, tab and runtime messaging |
//! | [`identity::IdentityStore`] | the wallet's identity store |
//! | [`proof::Prover`] | the proving library |
//! | [`proof::SandboxFactory`] | offscreen documents, where available |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod approvals;
pub mod backup;
pub mod broker;
pub mod connections;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod identity;
pub mod proof;
pub mod session;
pub mod storage;
pub mod surface;

#[cfg(test)]
mod testing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use approvals::{ApprovalEntry, ApprovalRegistry, Approver};
pub use backup::{BackupService, Backupable, UploadBackup};
pub use broker::{FinalizeRequest, PendingRequest, RequestBroker, RequestKind, RequestStatus};
pub use connections::{Connection, ConnectionRegistry};
pub use error::{Error, ErrorKind, Result};
pub use gate::{BrokerIdentityConnector, IdentityConnector, TrustGate};
pub use proof::{ArtifactConfig, ArtifactPaths, Platform, ProofRequestPipeline};
pub use session::{SessionLock, SessionStatus};
pub use storage::StorageKeys;

// ============================================================================
// CORE INSTANCE
// ============================================================================

use std::sync::{Arc, Weak};

use identity::IdentityStore;
use proof::{ProofDispatcher, Prover};
use session::SessionObserver;
use storage::StorageProvider;
use surface::SurfaceController;

/// Configuration for a [`KeeperCore`]
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    /// Circuit and proving-key locations on this platform
    pub artifacts: ArtifactConfig,
    /// Storage slot names
    pub storage_keys: StorageKeys,
}

/// Host-provided implementations of the external interfaces
#[derive(Clone)]
pub struct Collaborators {
    /// Persisted key-value storage
    pub storage: Arc<dyn StorageProvider>,
    /// Popup and messaging primitives
    pub surfaces: Arc<dyn SurfaceController>,
    /// The wallet's identities
    pub identities: Arc<dyn IdentityStore>,
    /// In-process prover
    pub prover: Arc<dyn Prover>,
    /// Platform capabilities
    pub platform: Platform,
}

/// The application context: one of each component, wired together
///
/// ## Lifecycle
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                        KEEPER CORE LIFECYCLE                            │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │  1. KeeperCore::new(config, collaborators)                             │
/// │       ──► open one storage slot per component                          │
/// │       ──► pick the proof dispatch strategy                             │
/// │       ──► register registries for logout and backup                    │
/// │                                                                         │
/// │  2. setup_password (first run) or unlock                               │
/// │       ──► session unlocked, registries decrypted                       │
/// │                                                                         │
/// │  3. Serve pages through gate() and pipeline()                          │
/// │                                                                         │
/// │  4. logout                                                             │
/// │       ──► secret dropped, registries forget decrypted state            │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub struct KeeperCore {
    config: CoreConfig,
    session: Arc<SessionLock>,
    approvals: Arc<ApprovalRegistry>,
    connections: Arc<ConnectionRegistry>,
    broker: Arc<RequestBroker>,
    gate: Arc<TrustGate>,
    pipeline: Arc<ProofRequestPipeline>,
    backup: Arc<BackupService>,
}

impl KeeperCore {
    /// Build the context
    ///
    /// Construct once per process and share by reference.
    pub fn new(config: CoreConfig, collaborators: Collaborators) -> Self {
        tracing::info!("Initializing Keeper Core v{}", env!("CARGO_PKG_VERSION"));

        let Collaborators {
            storage,
            surfaces,
            identities,
            prover,
            platform,
        } = collaborators;
        let keys = &config.storage_keys;

        let session = Arc::new(SessionLock::new(storage.open(&keys.password), surfaces.clone()));

        let approvals = Arc::new(ApprovalRegistry::new(session.clone(), storage.open(&keys.approvals)));
        let connections = Arc::new(ConnectionRegistry::new(
            session.clone(),
            storage.open(&keys.connections),
            identities.clone(),
            surfaces.clone(),
        ));

        let approvals_observer: Weak<dyn SessionObserver> = Arc::downgrade(&approvals) as Weak<dyn SessionObserver>;
        let connections_observer: Weak<dyn SessionObserver> =
            Arc::downgrade(&connections) as Weak<dyn SessionObserver>;
        session.add_observer(approvals_observer);
        session.add_observer(connections_observer);

        let broker = RequestBroker::new(surfaces.clone());

        let connector = Arc::new(BrokerIdentityConnector::new(
            broker.clone(),
            connections.clone(),
            identities,
        ));
        let gate = Arc::new(TrustGate::new(
            session.clone(),
            approvals.clone(),
            connections.clone(),
            broker.clone(),
            surfaces,
            connector,
        ));

        let pipeline = Arc::new(ProofRequestPipeline::new(
            connections.clone(),
            approvals.clone(),
            broker.clone(),
            config.artifacts.clone(),
            ProofDispatcher::select(&platform, prover),
        ));

        let backup = Arc::new(BackupService::new(session.clone()));
        backup.add(approvals.clone());
        backup.add(connections.clone());

        tracing::info!("Keeper Core initialized");

        Self {
            config,
            session,
            approvals,
            connections,
            broker,
            gate,
            pipeline,
            backup,
        }
    }

    /// Configuration the context was built with
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Session lock
    pub fn session(&self) -> &Arc<SessionLock> {
        &self.session
    }

    /// Approved origins
    pub fn approvals(&self) -> &Arc<ApprovalRegistry> {
        &self.approvals
    }

    /// Origin connections
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Confirmation request queue
    pub fn broker(&self) -> &Arc<RequestBroker> {
        &self.broker
    }

    /// Trust flows
    pub fn gate(&self) -> &Arc<TrustGate> {
        &self.gate
    }

    /// Proof pipeline
    pub fn pipeline(&self) -> &Arc<ProofRequestPipeline> {
        &self.pipeline
    }

    /// Backup orchestrator
    pub fn backup(&self) -> &Arc<BackupService> {
        &self.backup
    }

    /// Set up the password on first run and load the registries
    pub async fn setup_password(&self, password: &str) -> Result<bool> {
        self.session.setup_password(password).await?;
        self.unlock_registries().await?;
        Ok(true)
    }

    /// Unlock the session and load the registries
    pub async fn unlock(&self, password: &str) -> Result<bool> {
        self.session.unlock(password).await?;
        self.unlock_registries().await?;
        Ok(true)
    }

    /// Lock the session
    pub async fn logout(&self) -> Result<bool> {
        self.session.logout().await
    }

    /// Current lock status
    pub async fn get_status(&self) -> Result<SessionStatus> {
        self.session.get_status().await
    }

    async fn unlock_registries(&self) -> Result<()> {
        self.approvals.unlock().await?;
        self.connections.unlock().await?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
