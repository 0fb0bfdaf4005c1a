//! peercache - Distributed In-Process Key-Value Cache
//!
//! Every node runs the same code. A key is owned by exactly one node, chosen
//! by a consistent hash ring over the peer set; non-owners fetch from the
//! owner over HTTP, and the owner loads from the data source at most once per
//! key while the value stays cached.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          Group::get(key)                           │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  CacheShard hit? ──yes──▶ return                                   │
//! │        │ no                                                        │
//! │        ▼                                                           │
//! │  CallCoalescer (one load per key in flight)                        │
//! │        │                                                           │
//! │        ▼                                                           │
//! │  PeerPicker ──remote owner──▶ PeerGetter (HTTP)  ──ok──▶ return    │
//! │        │ self / none / peer failed                                 │
//! │        ▼                                                           │
//! │  Getter (data source) ──▶ populate CacheShard ──▶ return           │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: LRU eviction cache, cache shard and immutable byte views
//! - [`ring`]: Consistent hash ring
//! - [`coalesce`]: Duplicate call suppression
//! - [`group`]: Group pipeline, registry and counters
//! - [`domain`]: Ports for the data source and the peer transport
//! - [`transport`]: HTTP peer pool, client and server
//! - [`error`]: Error types and handling

pub mod cache;
pub mod coalesce;
pub mod domain;
pub mod error;
pub mod group;
pub mod ring;
pub mod transport;

// Re-export commonly used types
pub use cache::{ByteView, CacheShard, LruCache};

pub use coalesce::{CallCoalescer, Coalesced};

pub use domain::ports::{
    FetchRequest, FetchResponse, Getter, GetterFn, GetterRef, PeerGetter, PeerGetterRef,
    PeerPicker, PeerPickerRef,
};

pub use error::{Error, ErrorClass, Result};

pub use group::{Group, GroupRegistry, GroupStatsSnapshot};

pub use ring::HashRing;

pub use transport::{CacheServer, HttpGetter, HttpPool, PoolConfig, ServerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
