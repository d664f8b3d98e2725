//! # Session Module
//!
//! The password-gated session lock. Holds the one in-memory secret every
//! other component borrows for encryption.
//!
//! ## State Machine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SESSION LIFECYCLE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Uninitialized ──setup_password──► Unlocked                           │
//! │                                        │  ▲                             │
//! │                                 logout │  │ unlock(password)            │
//! │                                        ▼  │                             │
//! │                                      Locked                             │
//! │                                                                         │
//! │  Persisted:  verifier = encrypt(KNOWN_PLAINTEXT, password)             │
//! │  In memory:  the password itself, dropped (zeroized) on logout         │
//! │                                                                         │
//! │  Every transition broadcasts {isInitialized, isUnlocked} to all open   │
//! │  surfaces. Logout also tells observers to drop decrypted state.        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use zeroize::Zeroizing;

use crate::crypto::{self, EncryptionMode};
use crate::error::{Error, Result};
use crate::storage::KeyValueStore;
use crate::surface::{ExtensionMessage, SurfaceController};

/// Plaintext encrypted into the password verifier
pub const KNOWN_PLAINTEXT: &str = "Keeper password verifier";

/// Lock state as shown to surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// A password has been set up
    pub is_initialized: bool,
    /// The secret is held in memory
    pub is_unlocked: bool,
}

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No password set up yet
    Uninitialized,
    /// Password set up, secret not in memory
    Locked,
    /// Secret in memory
    Unlocked,
}

/// Components holding decrypted state that must be dropped on logout
pub trait SessionObserver: Send + Sync {
    /// Called after the session secret has been dropped
    fn on_lock(&self);
}

/// The process-wide session lock
pub struct SessionLock {
    verifier: Arc<dyn KeyValueStore>,
    surfaces: Arc<dyn SurfaceController>,
    secret: RwLock<Option<Zeroizing<String>>>,
    unlocked: watch::Sender<bool>,
    observers: RwLock<Vec<Weak<dyn SessionObserver>>>,
}

impl SessionLock {
    /// Create a locked session backed by the verifier slot
    pub fn new(verifier: Arc<dyn KeyValueStore>, surfaces: Arc<dyn SurfaceController>) -> Self {
        let (unlocked, _) = watch::channel(false);

        Self {
            verifier,
            surfaces,
            secret: RwLock::new(None),
            unlocked,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register a component to be told about logout
    pub fn add_observer(&self, observer: Weak<dyn SessionObserver>) {
        self.observers.write().push(observer);
    }

    /// Whether the secret is currently held
    pub fn is_unlocked(&self) -> bool {
        self.secret.read().is_some()
    }

    /// Current lifecycle state
    pub async fn state(&self) -> Result<SessionState> {
        if self.is_unlocked() {
            return Ok(SessionState::Unlocked);
        }

        Ok(match self.verifier.get().await? {
            Some(_) => SessionState::Locked,
            None => SessionState::Uninitialized,
        })
    }

    /// Current status for surfaces
    pub async fn get_status(&self) -> Result<SessionStatus> {
        let is_initialized = self.verifier.get().await?.is_some();

        Ok(SessionStatus {
            is_initialized,
            is_unlocked: self.is_unlocked(),
        })
    }

    /// Set up the password on first run, then unlock with it
    pub async fn setup_password(&self, password: &str) -> Result<bool> {
        if password.is_empty() {
            return Err(Error::NotProvided);
        }

        if self.verifier.get().await?.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let verifier = crypto::encrypt(KNOWN_PLAINTEXT, password, EncryptionMode::Settings)?;
        self.verifier.set(verifier).await?;
        tracing::info!("Password verifier created");

        self.unlock(password).await
    }

    /// Unlock with `password`
    ///
    /// Calling this while already unlocked succeeds without checking the
    /// password again.
    pub async fn unlock(&self, password: &str) -> Result<bool> {
        if self.is_unlocked() {
            return Ok(true);
        }

        self.is_authentic(password).await?;

        *self.secret.write() = Some(Zeroizing::new(password.to_string()));
        self.unlocked.send_replace(true);
        tracing::info!("Session unlocked");

        self.notify_status().await;
        Ok(true)
    }

    /// Check `password` against the verifier without changing state
    pub async fn is_authentic(&self, password: &str) -> Result<bool> {
        if password.is_empty() {
            return Err(Error::NotProvided);
        }

        let verifier = self.verifier.get().await?.ok_or(Error::ReinstallRequired)?;

        match crypto::decrypt(&verifier, password, EncryptionMode::Settings) {
            Ok(plaintext) if plaintext == KNOWN_PLAINTEXT => Ok(true),
            _ => {
                tracing::warn!("Password check failed");
                Err(Error::IncorrectPassword)
            }
        }
    }

    /// Drop the secret and return to `Locked`
    pub async fn logout(&self) -> Result<bool> {
        let had_secret = self.secret.write().take().is_some();
        self.unlocked.send_replace(false);

        let observers: Vec<_> = {
            let mut observers = self.observers.write();
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(|o| o.upgrade()).collect()
        };
        for observer in observers {
            observer.on_lock();
        }

        if had_secret {
            tracing::info!("Session locked");
        }

        self.notify_status().await;
        Ok(true)
    }

    /// Wait until the session is unlocked
    ///
    /// Resolves immediately if it already is.
    pub async fn await_unlock(&self) -> Result<()> {
        let mut rx = self.unlocked.subscribe();
        rx.wait_for(|unlocked| *unlocked)
            .await
            .map(|_| ())
            .map_err(|_| Error::Internal("session state channel closed".into()))
    }

    /// Fail with `NotProvided` unless unlocked
    pub fn ensure_unlocked(&self) -> Result<()> {
        if self.is_unlocked() {
            Ok(())
        } else {
            Err(Error::NotProvided)
        }
    }

    /// Encrypt `payload` with the session secret
    pub fn encrypt(&self, payload: &str, mode: EncryptionMode) -> Result<String> {
        let secret = self.secret.read();
        let secret = secret.as_ref().ok_or(Error::NotProvided)?;
        crypto::encrypt(payload, secret, mode)
    }

    /// Decrypt `ciphertext` with the session secret
    pub fn decrypt(&self, ciphertext: &str, mode: EncryptionMode) -> Result<String> {
        let secret = self.secret.read();
        let secret = secret.as_ref().ok_or(Error::NotProvided)?;
        crypto::decrypt(ciphertext, secret, mode)
    }

    async fn notify_status(&self) {
        let status = match self.get_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Could not read session status: {}", e);
                return;
            }
        };

        if let Err(e) = self
            .surfaces
            .broadcast(ExtensionMessage::SessionStatus(status))
            .await
        {
            tracing::debug!("Status broadcast not delivered: {}", e);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
