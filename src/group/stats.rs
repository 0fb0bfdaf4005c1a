//! Group Statistics
//!
//! Lock-free counters for one group, aligned to a cache line so that
//! groups updated from different cores do not false-share.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a single group
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct GroupStats {
    /// Any `get` request, including cache hits
    gets: AtomicU64,
    /// Served from the local shard
    cache_hits: AtomicU64,
    /// Misses that entered the load path
    loads: AtomicU64,
    /// Loads that joined another caller's in-flight load
    loads_deduped: AtomicU64,
    /// Values fetched from a remote peer
    peer_loads: AtomicU64,
    /// Remote fetches that failed and fell back
    peer_errors: AtomicU64,
    /// Successful local loader calls
    local_loads: AtomicU64,
    /// Failed local loader calls
    local_load_errs: AtomicU64,
    /// Requests received from peers over the transport
    server_requests: AtomicU64,
}

impl GroupStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_deduped(&self) {
        self.loads_deduped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_peer_load(&self) {
        self.peer_loads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_peer_error(&self) {
        self.peer_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_local_load(&self) {
        self.local_loads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_local_load_err(&self) {
        self.local_load_errs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_server_request(&self) {
        self.server_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> GroupStatsSnapshot {
        GroupStatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            loads_deduped: self.loads_deduped.load(Ordering::Relaxed),
            peer_loads: self.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.peer_errors.load(Ordering::Relaxed),
            local_loads: self.local_loads.load(Ordering::Relaxed),
            local_load_errs: self.local_load_errs.load(Ordering::Relaxed),
            server_requests: self.server_requests.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of [`GroupStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatsSnapshot {
    pub gets: u64,
    pub cache_hits: u64,
    pub loads: u64,
    pub loads_deduped: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub local_loads: u64,
    pub local_load_errs: u64,
    pub server_requests: u64,
}

impl GroupStatsSnapshot {
    /// Fraction of gets served from the local shard (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.gets as f64
        }
    }

    /// Counters as (name, value) pairs, in declaration order
    pub fn counters(&self) -> [(&'static str, u64); 9] {
        [
            ("gets", self.gets),
            ("cache_hits", self.cache_hits),
            ("loads", self.loads),
            ("loads_deduped", self.loads_deduped),
            ("peer_loads", self.peer_loads),
            ("peer_errors", self.peer_errors),
            ("local_loads", self.local_loads),
            ("local_load_errs", self.local_load_errs),
            ("server_requests", self.server_requests),
        ]
    }
}
