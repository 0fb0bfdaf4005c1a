//! Consistent Hash Ring
//!
//! Maps keys onto peers using `replicas` virtual nodes per peer. The ring
//! position of a virtual node is `hash("<replica-index><peer-id>")`; a key is
//! owned by the peer of the first position at or after `hash(key)`, wrapping
//! to the smallest position past the end of the ring.
//!
//! Positions are kept sorted and position collisions are resolved towards
//! the smaller peer id, so two nodes with the same peer set, replica factor
//! and hash function always agree on ownership regardless of insertion order.

use std::collections::HashMap;

/// Hash function used to place virtual nodes and keys on the ring
pub type HashFn = fn(&[u8]) -> u32;

/// Default ring hash (CRC-32C)
pub fn default_hash(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// Consistent hash ring over peer identifiers
#[derive(Debug, Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    /// Sorted, de-duplicated virtual node positions
    positions: Vec<u32>,
    /// Position to owning peer
    owners: HashMap<u32, String>,
}

impl HashRing {
    /// Create an empty ring with `replicas` virtual nodes per peer
    ///
    /// `hash` defaults to [`default_hash`].
    pub fn new(replicas: usize, hash: Option<HashFn>) -> Self {
        Self {
            hash: hash.unwrap_or(default_hash),
            replicas,
            positions: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Add peers to the ring
    pub fn add<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for peer in peers {
            let peer = peer.as_ref();
            for i in 0..self.replicas {
                let position = (self.hash)(format!("{}{}", i, peer).as_bytes());
                match self.owners.get_mut(&position) {
                    Some(owner) => {
                        if peer < owner.as_str() {
                            *owner = peer.to_string();
                        }
                    }
                    None => {
                        self.owners.insert(position, peer.to_string());
                        self.positions.push(position);
                    }
                }
            }
        }
        self.positions.sort_unstable();
    }

    /// Peer owning `key`, or `None` if the ring is empty
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = self.positions.partition_point(|&p| p < hash);
        let position = self.positions[idx % self.positions.len()];
        self.owners.get(&position).map(String::as_str)
    }

    /// Number of virtual nodes on the ring
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if no peer has been added
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Virtual nodes per peer
    pub fn replicas(&self) -> usize {
        self.replicas
    }
}
