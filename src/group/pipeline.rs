//! Group Pipeline
//!
//! A `Group` is a named cache namespace: its own shard, its own loader and,
//! once registered, a peer picker. `get` runs the pipeline:
//!
//! ```text
//! get(key)
//!   ├─ empty key ─────────────────────────────▶ Err(EmptyKey)
//!   ├─ shard hit ─────────────────────────────▶ value
//!   └─ coalesced load (one per key in flight)
//!        ├─ shard hit (filled by previous wave) ▶ value
//!        ├─ peer owns key ─ fetch ok ──────────▶ value (not cached here)
//!        │                 └ fetch err ─┐
//!        └─ no peer / self owns key ────┴─ loader ─ ok ─▶ populate shard, value
//!                                                └ err ─▶ Err(Load)
//! ```

use crate::cache::{ByteView, CacheShard};
use crate::coalesce::CallCoalescer;
use crate::domain::ports::{FetchRequest, GetterRef, PeerGetter, PeerPickerRef};
use crate::error::{Error, Result};
use crate::group::stats::{GroupStats, GroupStatsSnapshot};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Named cache namespace with a get-or-load pipeline
pub struct Group {
    name: String,
    getter: GetterRef,
    main_cache: CacheShard,
    peers: OnceLock<PeerPickerRef>,
    loader: CallCoalescer<ByteView>,
    stats: GroupStats,
}

impl Group {
    /// Create a standalone group
    ///
    /// Most callers go through `GroupRegistry::new_group` so the group is
    /// reachable by name from the peer server.
    pub fn new(name: impl Into<String>, max_bytes: u64, getter: GetterRef) -> Result<Arc<Self>> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyGroupName);
        }

        Ok(Arc::new(Self {
            name,
            getter,
            main_cache: CacheShard::new(max_bytes),
            peers: OnceLock::new(),
            loader: CallCoalescer::new(),
            stats: GroupStats::new(),
        }))
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind the peer picker used for remote ownership
    ///
    /// May only be called once per group. A second call returns
    /// `Error::PeersAlreadyRegistered`, which signals a wiring bug.
    pub fn register_peers(&self, peers: PeerPickerRef) -> Result<()> {
        self.peers
            .set(peers)
            .map_err(|_| Error::PeersAlreadyRegistered {
                group: self.name.clone(),
            })?;
        debug!(group = %self.name, "Registered peer picker");
        Ok(())
    }

    /// Check if a peer picker has been registered
    pub fn has_peers(&self) -> bool {
        self.peers.get().is_some()
    }

    /// Get the value for `key`, loading it on a miss
    pub async fn get(self: &Arc<Self>, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        self.stats.record_get();

        if let Some(value) = self.main_cache.get(key) {
            self.stats.record_hit();
            debug!(group = %self.name, key, "Cache hit");
            return Ok(value);
        }

        self.load(key).await
    }

    /// Counters for this group
    pub fn stats(&self) -> GroupStatsSnapshot {
        self.stats.snapshot()
    }

    /// Count a request that arrived from a peer
    pub(crate) fn record_server_request(&self) {
        self.stats.record_server_request();
    }

    /// Entries held in the local shard
    pub fn cache_len(&self) -> usize {
        self.main_cache.len()
    }

    /// Bytes held in the local shard
    pub fn cache_bytes(&self) -> u64 {
        self.main_cache.used_bytes()
    }

    // =========================================================================
    // Load path
    // =========================================================================

    async fn load(self: &Arc<Self>, key: &str) -> Result<ByteView> {
        self.stats.record_load();

        let this = Arc::clone(self);
        let owned_key = key.to_string();
        let outcome = self
            .loader
            .run(key, move || async move { this.load_once(&owned_key).await })
            .await;

        if outcome.shared {
            self.stats.record_deduped();
        }
        outcome.result
    }

    /// Body of one coalesced load
    async fn load_once(&self, key: &str) -> Result<ByteView> {
        // A previous wave may have populated the shard after our miss
        if let Some(value) = self.main_cache.get(key) {
            self.stats.record_hit();
            return Ok(value);
        }

        if let Some(picker) = self.peers.get() {
            if let Some(peer) = picker.pick_peer(key) {
                match self.get_from_peer(peer.as_ref(), key).await {
                    Ok(value) => {
                        self.stats.record_peer_load();
                        return Ok(value);
                    }
                    Err(e) => {
                        self.stats.record_peer_error();
                        warn!(
                            group = %self.name,
                            key,
                            peer = peer.peer_addr(),
                            error = %e,
                            "Failed to get from peer, loading locally"
                        );
                    }
                }
            }
        }

        self.get_locally(key).await
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        let bytes = match self.getter.get(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.record_local_load_err();
                return Err(Error::load(key, e));
            }
        };
        self.stats.record_local_load();

        let value = ByteView::copy_from_slice(&bytes);
        self.populate_cache(key, value.clone());
        Ok(value)
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.main_cache.add(key, value);
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Result<ByteView> {
        let request = FetchRequest::new(self.name.as_str(), key);
        let response = peer.get(&request).await?;
        Ok(ByteView::from_bytes(response.value))
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache", &self.main_cache)
            .field("has_peers", &self.has_peers())
            .finish()
    }
}
