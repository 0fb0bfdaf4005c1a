//! Error types for peercache
//!
//! Provides a single structured error type shared by the cache core, the
//! group pipeline and the peer transport.

use std::sync::Arc;
use thiserror::Error;

/// Unified error type for the cache node
///
/// The type is `Clone` so that one coalesced load outcome can be handed to
/// every waiter of that load unchanged.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Input Validation Errors
    // =========================================================================
    #[error("key is required")]
    EmptyKey,

    #[error("group name is required")]
    EmptyGroupName,

    #[error("no such group: {name}")]
    GroupNotFound { name: String },

    // =========================================================================
    // Misuse Errors
    // =========================================================================
    #[error("peers already registered for group: {group}")]
    PeersAlreadyRegistered { group: String },

    // =========================================================================
    // Loader Errors
    // =========================================================================
    #[error("load failed for key {key}: {cause:#}")]
    Load {
        key: String,
        cause: Arc<anyhow::Error>,
    },

    // =========================================================================
    // Peer Transport Errors
    // =========================================================================
    #[error("peer request failed: {peer} - {reason}")]
    PeerRequest { peer: String, reason: String },

    #[error("peer returned status {status}: {peer}")]
    PeerStatus { peer: String, status: u16 },

    #[error("codec error: {0}")]
    Codec(String),
}

/// Where an error sits in the failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input, reported immediately and never retried
    Validation,
    /// Programming defect, the caller should treat it as fatal
    Misuse,
    /// Peer fetch failure, absorbed by falling back to the local loader
    Remote,
    /// Caller-supplied loader failed, surfaced verbatim
    Load,
    /// Anything else
    Internal,
}

impl Error {
    /// Wrap a loader failure for `key`
    pub fn load(key: impl Into<String>, cause: anyhow::Error) -> Self {
        Error::Load {
            key: key.into(),
            cause: Arc::new(cause),
        }
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::EmptyKey | Error::EmptyGroupName | Error::GroupNotFound { .. } => {
                ErrorClass::Validation
            }

            Error::PeersAlreadyRegistered { .. } => ErrorClass::Misuse,

            Error::PeerRequest { .. } | Error::PeerStatus { .. } | Error::Codec(_) => {
                ErrorClass::Remote
            }

            Error::Load { .. } => ErrorClass::Load,

            Error::Internal(_) | Error::Configuration(_) => ErrorClass::Internal,
        }
    }

    /// Check if a caller may reasonably retry after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self.class(), ErrorClass::Remote | ErrorClass::Load)
    }

    /// Check if this error came from the peer transport
    pub fn is_remote(&self) -> bool {
        self.class() == ErrorClass::Remote
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

/// Result type alias for peercache
pub type Result<T> = std::result::Result<T, Error>;
