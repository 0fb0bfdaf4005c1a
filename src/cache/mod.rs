//! Local Cache Storage
//!
//! The byte-bounded store every group keeps for the keys it owns.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │                CacheShard                 │
//! │   (one per group, single mutex, lazy)     │
//! ├───────────────────────────────────────────┤
//! │                 LruCache                  │
//! │  ┌──────────────┐   ┌──────────────────┐  │
//! │  │ key -> slot  │──▶│ slab linked list │  │
//! │  │  (HashMap)   │   │  MRU ... LRU     │  │
//! │  └──────────────┘   └──────────────────┘  │
//! ├───────────────────────────────────────────┤
//! │       ByteView (immutable, copy-out)      │
//! └───────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use peercache::cache::{ByteView, CacheShard};
//!
//! let shard = CacheShard::new(1024);
//! shard.add("Tom", ByteView::from("630"));
//! assert_eq!(shard.get("Tom").unwrap().to_string(), "630");
//! ```

pub mod byteview;
pub mod lru;
pub mod shard;

pub use byteview::ByteView;
pub use lru::{EvictionCallback, LruCache};
pub use shard::CacheShard;
