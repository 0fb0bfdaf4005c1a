//! Size-Bounded LRU Cache
//!
//! A single-threaded least-recently-used cache bounded by the total number
//! of bytes held (key length + value length per entry). Recency is kept in
//! an index-linked list stored in a slab, so lookups, promotions and
//! evictions are O(1) and never allocate once a slot has been reused.
//! An insertion-ordered map (`IndexMap`) would make each promotion an O(n)
//! `shift_remove`.
//!
//! Not safe for concurrent use; `CacheShard` layers the locking on top.

use crate::cache::byteview::ByteView;
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Constants
// =============================================================================

/// Sentinel slot index meaning "no node"
const NIL: usize = usize::MAX;

/// Callback invoked synchronously with every evicted entry
pub type EvictionCallback = Box<dyn FnMut(&str, &ByteView) + Send>;

// =============================================================================
// LRU Node
// =============================================================================

#[derive(Debug, Default)]
struct Node {
    key: String,
    value: ByteView,
    /// Towards the most recently used end
    prev: usize,
    /// Towards the least recently used end
    next: usize,
}

#[inline]
fn entry_size(key: &str, value: &ByteView) -> u64 {
    (key.len() + value.len()) as u64
}

// =============================================================================
// LRU Cache
// =============================================================================

/// Byte-bounded LRU cache
pub struct LruCache {
    /// Byte ceiling, 0 means unbounded
    max_bytes: u64,
    /// Sum of key + value lengths over all held entries
    used_bytes: u64,
    /// Node slab; freed slots are recycled through `free`
    nodes: Vec<Node>,
    free: Vec<usize>,
    /// Key to slab slot
    index: HashMap<String, usize>,
    /// Most recently used slot
    head: usize,
    /// Least recently used slot
    tail: usize,
    on_evicted: Option<EvictionCallback>,
}

impl LruCache {
    /// Create a cache bounded to `max_bytes` (0 = unbounded)
    pub fn new(max_bytes: u64) -> Self {
        Self::with_eviction_callback(max_bytes, None)
    }

    /// Create a cache that reports every eviction to `on_evicted`
    pub fn with_eviction_callback(max_bytes: u64, on_evicted: Option<EvictionCallback>) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            on_evicted,
        }
    }

    /// Look up a key, promoting it to most recently used on hit
    pub fn get(&mut self, key: &str) -> Option<ByteView> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        Some(self.nodes[idx].value.clone())
    }

    /// Insert or update an entry, then evict until within the byte ceiling
    ///
    /// A value larger than the ceiling drains the cache, itself included.
    pub fn add(&mut self, key: &str, value: ByteView) {
        if let Some(&idx) = self.index.get(key) {
            self.move_to_front(idx);
            let new_len = value.len() as u64;
            let old = std::mem::replace(&mut self.nodes[idx].value, value);
            self.used_bytes = self.used_bytes - old.len() as u64 + new_len;
        } else {
            self.used_bytes += entry_size(key, &value);
            let idx = self.alloc(Node {
                key: key.to_string(),
                value,
                prev: NIL,
                next: NIL,
            });
            self.attach_front(idx);
            self.index.insert(key.to_string(), idx);
        }

        while self.max_bytes != 0 && self.used_bytes > self.max_bytes {
            self.remove_oldest();
        }
    }

    /// Evict the least recently used entry
    ///
    /// Returns false if the cache was empty.
    pub fn remove_oldest(&mut self) -> bool {
        if self.tail == NIL {
            return false;
        }

        let idx = self.tail;
        self.detach(idx);

        let node = &mut self.nodes[idx];
        let key = std::mem::take(&mut node.key);
        let value = std::mem::take(&mut node.value);
        self.free.push(idx);
        self.index.remove(&key);
        self.used_bytes -= entry_size(&key, &value);

        if let Some(on_evicted) = self.on_evicted.as_mut() {
            on_evicted(&key, &value);
        }
        true
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes currently accounted (key + value lengths)
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// Configured byte ceiling
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    // =========================================================================
    // List maintenance
    // =========================================================================

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.detach(idx);
        self.attach_front(idx);
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);

        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }

        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = old_head;

        if old_head == NIL {
            self.tail = idx;
        } else {
            self.nodes[old_head].prev = idx;
        }
        self.head = idx;
    }

    /// Keys from most to least recently used
    #[cfg(test)]
    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while cursor != NIL {
            keys.push(self.nodes[cursor].key.clone());
            cursor = self.nodes[cursor].next;
        }
        keys
    }
}

impl fmt::Debug for LruCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("max_bytes", &self.max_bytes)
            .field("used_bytes", &self.used_bytes)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn accounted_bytes(cache: &LruCache) -> u64 {
        cache
            .index
            .iter()
            .map(|(key, &idx)| entry_size(key, &cache.nodes[idx].value))
            .sum()
    }

    #[test]
    fn test_get() {
        let mut cache = LruCache::new(0);
        cache.add("key1", ByteView::from("1234"));

        assert_eq!(cache.get("key1").map(|v| v.to_string()), Some("1234".into()));
        assert!(cache.get("key2").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_bytes(), 8);
    }

    #[test]
    fn test_remove_oldest_on_overflow() {
        let (k1, k2, k3) = ("key1", "key2", "k3");
        let (v1, v2, v3) = ("value1", "value2", "v3");
        let cap = (k1.len() + k2.len() + v1.len() + v2.len()) as u64;

        let mut cache = LruCache::new(cap);
        cache.add(k1, ByteView::from(v1));
        cache.add(k2, ByteView::from(v2));
        cache.add(k3, ByteView::from(v3));

        assert!(cache.get(k1).is_none());
        assert_eq!(cache.len(), 2);
        assert!(cache.used_bytes() <= cap);
    }

    #[test]
    fn test_access_protects_from_eviction() {
        // Room for exactly two one-byte-key, one-byte-value entries
        let mut cache = LruCache::new(4);
        cache.add("a", ByteView::from("1"));
        cache.add("b", ByteView::from("2"));
        assert!(cache.get("a").is_some());
        cache.add("c", ByteView::from("3"));

        assert_eq!(cache.keys(), vec!["c".to_string(), "a".to_string()]);
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_update_adjusts_used_bytes() {
        let mut cache = LruCache::new(0);
        cache.add("a", ByteView::from("1"));
        cache.add("b", ByteView::from("22"));
        cache.add("a", ByteView::from("333"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.used_bytes(), 1 + 3 + 1 + 2);
        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);

        cache.add("a", ByteView::from(""));
        assert_eq!(cache.used_bytes(), 1 + 1 + 2);
    }

    #[test]
    fn test_oversized_value_drains_cache() {
        let mut cache = LruCache::new(10);
        cache.add("a", ByteView::from("1"));
        cache.add("b", ByteView::from("2"));
        cache.add("big", ByteView::from("0123456789"));

        assert!(cache.is_empty());
        assert_eq!(cache.used_bytes(), 0);
        assert!(!cache.remove_oldest());
    }

    #[test]
    fn test_eviction_callback() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = evicted.clone();
        let callback: EvictionCallback = Box::new(move |key, value| {
            sink.lock().unwrap().push((key.to_string(), value.to_string()));
        });

        let mut cache = LruCache::with_eviction_callback(10, Some(callback));
        cache.add("key1", ByteView::from("123456"));
        cache.add("k2", ByteView::from("k2"));
        cache.add("k3", ByteView::from("k3"));
        cache.add("k4", ByteView::from("k4"));

        assert_eq!(
            *evicted.lock().unwrap(),
            vec![
                ("key1".to_string(), "123456".to_string()),
                ("k2".to_string(), "k2".to_string()),
            ]
        );
    }

    #[test]
    fn test_used_bytes_tracks_entries() {
        let mut cache = LruCache::new(64);
        for i in 0..200u32 {
            let key = format!("k{}", i % 17);
            match i % 5 {
                0 | 3 => {
                    cache.get(&key);
                }
                _ => cache.add(&key, ByteView::from_vec(vec![b'x'; (i % 13) as usize])),
            }
            assert_eq!(cache.used_bytes(), accounted_bytes(&cache));
            assert!(cache.used_bytes() <= 64);
            assert_eq!(cache.keys().len(), cache.len());
        }
    }

    #[test]
    fn test_slots_are_reused() {
        let mut cache = LruCache::new(4);
        for i in 0..100 {
            cache.add(&format!("{}", i % 10), ByteView::from("v"));
        }
        assert!(cache.nodes.len() <= 3);
    }
}
