//! HTTP Peer Pool
//!
//! Owns the consistent hash ring over peer URLs and one `HttpGetter` per
//! peer. Installed on a group as its `PeerPicker`; keys owned by this node
//! yield no peer so the group loads them locally.

use crate::domain::ports::{PeerGetterRef, PeerPicker};
use crate::error::{Error, Result};
use crate::ring::HashRing;
use crate::transport::client::HttpGetter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// URL prefix under which peers serve cache requests
pub const DEFAULT_BASE_PATH: &str = "/_peercache/";

/// Virtual nodes per peer on the ring
pub const DEFAULT_REPLICAS: usize = 50;

// =============================================================================
// Pool Configuration
// =============================================================================

/// Configuration for the peer pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Path prefix, must start and end with `/`
    pub base_path: String,
    /// Virtual nodes per peer
    pub replicas: usize,
    /// Per-request timeout for peer fetches
    pub request_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            request_timeout_secs: 5,
        }
    }
}

impl PoolConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.base_path.starts_with('/') || !self.base_path.ends_with('/') {
            return Err(Error::Configuration(format!(
                "base path must start and end with '/': {}",
                self.base_path
            )));
        }
        if self.replicas == 0 {
            return Err(Error::Configuration(
                "replicas must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// HTTP Pool
// =============================================================================

struct PoolState {
    ring: HashRing,
    getters: HashMap<String, Arc<HttpGetter>>,
}

/// Peer picker backed by HTTP
pub struct HttpPool {
    /// This node's own URL, e.g. `http://10.0.0.1:8001`
    self_url: String,
    config: PoolConfig,
    client: reqwest::Client,
    state: RwLock<PoolState>,
}

impl HttpPool {
    /// Create a pool for the node reachable at `self_url`
    pub fn new(self_url: impl Into<String>, config: PoolConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        let state = PoolState {
            ring: HashRing::new(config.replicas, None),
            getters: HashMap::new(),
        };

        Ok(Arc::new(Self {
            self_url: self_url.into(),
            config,
            client,
            state: RwLock::new(state),
        }))
    }

    /// This node's URL
    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// Path prefix served by every peer
    pub fn base_path(&self) -> &str {
        &self.config.base_path
    }

    /// Replace the peer set
    ///
    /// Rebuilds the ring and the per-peer clients. `peers` should include
    /// this node's own URL so that it owns its share of the key space.
    pub fn set<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let peers: Vec<String> = peers.into_iter().map(|p| p.as_ref().to_string()).collect();

        let mut ring = HashRing::new(self.config.replicas, None);
        ring.add(&peers);

        let getters = peers
            .iter()
            .map(|peer| {
                let base_url = format!("{}{}", peer, self.config.base_path);
                (peer.clone(), Arc::new(HttpGetter::new(base_url, self.client.clone())))
            })
            .collect();

        *self.state.write() = PoolState { ring, getters };
        info!(self_url = %self.self_url, peers = peers.len(), "Peer set updated");
    }

    /// Current peer URLs, sorted
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.state.read().getters.keys().cloned().collect();
        peers.sort();
        peers
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<PeerGetterRef> {
        let state = self.state.read();
        let owner = state.ring.get(key)?;
        if owner == self.self_url {
            return None;
        }

        debug!(key = %key, peer = %owner, "Picked peer");
        state
            .getters
            .get(owner)
            .map(|getter| getter.clone() as PeerGetterRef)
    }
}

impl std::fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_url", &self.self_url)
            .field("config", &self.config)
            .field("peers", &self.peers())
            .finish()
    }
}
