//! Synchronized Cache Shard
//!
//! Wraps an `LruCache` behind a single mutex. The LRU is only built on the
//! first write, so groups that never load anything cost no allocation.

use crate::cache::byteview::ByteView;
use crate::cache::lru::LruCache;
use parking_lot::Mutex;

/// Thread-safe, lazily initialised cache owned by one group
#[derive(Debug)]
pub struct CacheShard {
    max_bytes: u64,
    lru: Mutex<Option<LruCache>>,
}

impl CacheShard {
    /// Create a shard bounded to `max_bytes` (0 = unbounded)
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            lru: Mutex::new(None),
        }
    }

    /// Insert or update an entry
    pub fn add(&self, key: &str, value: ByteView) {
        let mut lru = self.lru.lock();
        lru.get_or_insert_with(|| LruCache::new(self.max_bytes))
            .add(key, value);
    }

    /// Look up an entry, promoting it on hit
    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.lru.lock().as_mut()?.get(key)
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.lru.lock().as_ref().map_or(0, LruCache::len)
    }

    /// Check if the shard holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently accounted
    pub fn used_bytes(&self) -> u64 {
        self.lru.lock().as_ref().map_or(0, LruCache::used_bytes)
    }

    /// Configured byte ceiling
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    #[cfg(test)]
    fn is_initialized(&self) -> bool {
        self.lru.lock().is_some()
    }
}
