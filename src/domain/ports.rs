//! Domain Ports - Core trait definitions for the cache node
//!
//! These traits define the boundaries between the cache pipeline and the
//! outside world: the caller's data source and the peer transport.
//! Test doubles implement them to run the pipeline without a network.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

// =============================================================================
// Peer Wire Messages
// =============================================================================

/// Request for one key of one group on a remote peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Group the key belongs to
    pub group: String,
    /// Key to fetch
    pub key: String,
}

impl FetchRequest {
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
        }
    }
}

/// Value returned by a remote peer
///
/// `Bytes` serializes as a binary blob, not an integer array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub value: Bytes,
}

// =============================================================================
// Data Source Port
// =============================================================================

/// Port for the caller's data source
///
/// Invoked only after both the local shard and the owning peer missed.
#[async_trait]
pub trait Getter: Send + Sync {
    /// Load the value for `key`
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Adapts an async closure into a [`Getter`]
///
/// ```
/// use peercache::domain::GetterFn;
///
/// let getter = GetterFn::new(|key: String| async move {
///     Ok::<_, anyhow::Error>(key.into_bytes())
/// });
/// ```
pub struct GetterFn<F>(F);

impl<F> GetterFn<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Getter for GetterFn<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.0)(key.to_string()).await
    }
}

// =============================================================================
// Peer Ports
// =============================================================================

/// Port for fetching a key from one remote peer
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Perform a single blocking remote call
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse>;

    /// Address used in logs and errors
    fn peer_addr(&self) -> &str;
}

/// Port for choosing the peer that owns a key
pub trait PeerPicker: Send + Sync {
    /// Owning peer for `key`
    ///
    /// Returns `None` when this node owns the key or no peers are configured.
    fn pick_peer(&self, key: &str) -> Option<PeerGetterRef>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type GetterRef = Arc<dyn Getter>;
pub type PeerGetterRef = Arc<dyn PeerGetter>;
pub type PeerPickerRef = Arc<dyn PeerPicker>;
