//! # Error Handling
//!
//! Error types for Keeper Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Validation (100)     - malformed Merkle inputs / artifacts         │
//! │  ├── Authentication (200) - wrong password, inauthentic backup          │
//! │  ├── State (300)          - not approved / not connected / locked       │
//! │  ├── UserRejection (400)  - explicit reject or surface closed           │
//! │  ├── Platform (500)       - missing circuit or proving key              │
//! │  ├── Transport (600)      - isolated context lost a message             │
//! │  ├── Storage (700)        - key-value store failures                    │
//! │  ├── Crypto (800)         - encryption / decryption failures            │
//! │  └── Internal (900)       - serialization, wrapped subsystem errors     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Errors are caught at the gate/pipeline boundary and re-thrown with a
//! stable prefix ([`Error::ConnectRequestFailed`], [`Error::ProofFailed`]).
//! The prefixed messages are what the calling page sees.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Keeper Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Keeper Core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Validation Errors (100-199)
    // ========================================================================
    /// Merkle proof source matches none of the accepted shapes
    #[error("invalid merkle proof inputs")]
    InvalidMerkleInputs,

    /// Artifacts depth is zero
    #[error("invalid merkle tree depth")]
    InvalidDepth,

    /// Artifacts leaf list is empty
    #[error("invalid merkle tree leaves")]
    InvalidLeaves,

    /// Artifacts fan-out is zero
    #[error("invalid merkle tree leaves per node")]
    InvalidLeavesPerNode,

    /// Proof root is zero
    #[error("invalid merkle proof root")]
    InvalidRoot,

    /// Proof siblings are empty
    #[error("invalid merkle proof siblings")]
    InvalidSiblings,

    /// Proof path indices are empty
    #[error("invalid merkle proof path indices")]
    InvalidPathIndices,

    /// Proof leaf is zero
    #[error("invalid merkle proof leaf")]
    InvalidLeaf,

    // ========================================================================
    // Authentication Errors (200-299)
    // ========================================================================
    /// Password does not match the stored verifier
    #[error("Incorrect password")]
    IncorrectPassword,

    /// Backup blob failed its HMAC check
    #[error("This backup file is not authentic")]
    NotAuthentic,

    /// A component rejected its slice of an uploaded backup
    #[error("Incorrect backup format for {0}")]
    IncorrectBackupFormat(String),

    // ========================================================================
    // State Errors (300-399)
    // ========================================================================
    /// Password (or the session secret derived from it) is missing
    #[error("Password is not provided")]
    NotProvided,

    /// A password has already been set up
    #[error("Password is already set")]
    AlreadyInitialized,

    /// Session is locked but no verifier exists
    #[error("Something badly gone wrong (reinstallation probably required)")]
    ReinstallRequired,

    /// No origin was supplied
    #[error("Origin is not provided")]
    OriginMissing,

    /// No identity for the commitment, or none connected to the origin
    #[error("Identity is not found")]
    IdentityMissing,

    /// Origin has no active connection
    #[error("Origin is not connected")]
    NotConnected,

    /// Origin has not been approved
    #[error("Origin is not approved")]
    NotApproved,

    // ========================================================================
    // User Rejection Errors (400-499)
    // ========================================================================
    /// The user rejected the request or closed the confirmation surface
    #[error("user rejected.")]
    UserRejected,

    /// The confirmation surface replied with a status the broker can't handle
    #[error("action: {0} not supported")]
    UnsupportedAction(String),

    // ========================================================================
    // Platform Errors (500-599)
    // ========================================================================
    /// Circuit or proving-key locations can't be resolved on this platform
    #[error("Proof artifacts are not available for {0}")]
    ArtifactsMissing(String),

    /// The confirmation surface could not be opened
    #[error("Failed to open confirmation surface: {0}")]
    SurfaceUnavailable(String),

    // ========================================================================
    // Transport Errors (600-699)
    // ========================================================================
    /// Message to or from an isolated execution context was lost
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The external prover failed
    #[error("Prover error: {0}")]
    ProverError(String),

    // ========================================================================
    // Storage Errors (700-799)
    // ========================================================================
    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Uploaded backup is not the expected JSON document
    #[error("File content is corrupted")]
    CorruptedBackup,

    // ========================================================================
    // Crypto Errors (800-899)
    // ========================================================================
    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Wrapped / Internal Errors (900-999)
    // ========================================================================
    /// Any failure inside the connect flow, re-thrown for the page
    #[error("error in the connect request, {0}")]
    ConnectRequestFailed(String),

    /// Any failure inside prepare + dispatch, re-thrown for the page
    #[error("Error in generating {kind} proof {message}")]
    ProofFailed {
        /// `Semaphore` or `RLN`
        kind: String,
        /// Message of the underlying error
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error taxonomy used by surfaces to decide how to present a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller must fix the input; never retried automatically
    Validation,
    /// User is re-prompted; never retried automatically
    Authentication,
    /// Origin/session is not in the state the operation requires
    State,
    /// Terminal rejection by the user
    UserRejection,
    /// Fatal to the current request only
    Platform,
    /// Lost message to an isolated context
    Transport,
    /// Persistence failure
    Storage,
    /// Encryption primitive failure
    Crypto,
    /// Everything else
    Internal,
}

impl Error {
    /// Get the numeric error code
    ///
    /// Codes are banded by [`ErrorKind`], see the module docs.
    pub fn code(&self) -> i32 {
        match self {
            // Validation (100-199)
            Error::InvalidMerkleInputs => 100,
            Error::InvalidDepth => 101,
            Error::InvalidLeaves => 102,
            Error::InvalidLeavesPerNode => 103,
            Error::InvalidRoot => 104,
            Error::InvalidSiblings => 105,
            Error::InvalidPathIndices => 106,
            Error::InvalidLeaf => 107,

            // Authentication (200-299)
            Error::IncorrectPassword => 200,
            Error::NotAuthentic => 201,
            Error::IncorrectBackupFormat(_) => 202,

            // State (300-399)
            Error::NotProvided => 300,
            Error::AlreadyInitialized => 301,
            Error::ReinstallRequired => 302,
            Error::OriginMissing => 303,
            Error::IdentityMissing => 304,
            Error::NotConnected => 305,
            Error::NotApproved => 306,

            // User rejection (400-499)
            Error::UserRejected => 400,
            Error::UnsupportedAction(_) => 401,

            // Platform (500-599)
            Error::ArtifactsMissing(_) => 500,
            Error::SurfaceUnavailable(_) => 501,

            // Transport (600-699)
            Error::TransportError(_) => 600,
            Error::ProverError(_) => 601,

            // Storage (700-799)
            Error::StorageReadError(_) => 700,
            Error::StorageWriteError(_) => 701,
            Error::CorruptedBackup => 702,

            // Crypto (800-899)
            Error::EncryptionFailed(_) => 800,
            Error::DecryptionFailed(_) => 801,
            Error::KeyDerivationFailed(_) => 802,

            // Wrapped / internal (900-999)
            Error::ConnectRequestFailed(_) => 900,
            Error::ProofFailed { .. } => 901,
            Error::SerializationError(_) => 902,
            Error::Internal(_) => 903,
        }
    }

    /// Taxonomy bucket of this error
    pub fn kind(&self) -> ErrorKind {
        match self.code() {
            100..=199 => ErrorKind::Validation,
            200..=299 => ErrorKind::Authentication,
            300..=399 => ErrorKind::State,
            400..=499 => ErrorKind::UserRejection,
            500..=599 => ErrorKind::Platform,
            600..=699 => ErrorKind::Transport,
            700..=799 => ErrorKind::Storage,
            800..=899 => ErrorKind::Crypto,
            _ => ErrorKind::Internal,
        }
    }

    /// Authentication failures re-prompt the user instead of failing the page
    pub fn requires_user_action(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// SURFACE ERROR REPRESENTATION
// ============================================================================

/// Serializable error representation handed to pages and surfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Numeric error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Taxonomy bucket
    pub kind: ErrorKind,
}

impl From<&Error> for ErrorPayload {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            kind: err.kind(),
        }
    }
}

impl From<Error> for ErrorPayload {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidMerkleInputs.code(), 100);
        assert_eq!(Error::IncorrectPassword.code(), 200);
        assert_eq!(Error::NotProvided.code(), 300);
        assert_eq!(Error::UserRejected.code(), 400);
        assert_eq!(Error::ArtifactsMissing("rln".into()).code(), 500);
        assert_eq!(Error::TransportError("lost".into()).code(), 600);
        assert_eq!(Error::CorruptedBackup.code(), 702);
        assert_eq!(Error::Internal("test".into()).code(), 903);
    }

    #[test]
    fn test_page_visible_messages() {
        assert_eq!(Error::UserRejected.to_string(), "user rejected.");
        assert_eq!(
            Error::UnsupportedAction("MAYBE".into()).to_string(),
            "action: MAYBE not supported"
        );
        assert_eq!(
            Error::ConnectRequestFailed("user rejected.".into()).to_string(),
            "error in the connect request, user rejected."
        );
        assert_eq!(
            Error::ProofFailed {
                kind: "Semaphore".into(),
                message: "Identity is not found".into(),
            }
            .to_string(),
            "Error in generating Semaphore proof Identity is not found"
        );
        assert_eq!(Error::CorruptedBackup.to_string(), "File content is corrupted");
        assert_eq!(
            Error::IncorrectBackupFormat("approvals".into()).to_string(),
            "Incorrect backup format for approvals"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::InvalidLeaf.kind(), ErrorKind::Validation);
        assert_eq!(Error::UnsupportedAction("x".into()).kind(), ErrorKind::UserRejection);
        assert!(Error::NotAuthentic.requires_user_action());
        assert!(!Error::NotConnected.requires_user_action());
    }

    #[test]
    fn test_error_payload_conversion() {
        let payload: ErrorPayload = Error::IncorrectPassword.into();

        assert_eq!(payload.code, 200);
        assert_eq!(payload.message, "Incorrect password");
        assert_eq!(payload.kind, ErrorKind::Authentication);
    }
}
