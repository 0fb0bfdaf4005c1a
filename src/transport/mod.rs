//! Peer Transport
//!
//! HTTP plumbing between cache nodes:
//!
//! - [`pool::HttpPool`]: picks the owning peer for a key (`PeerPicker`)
//! - [`client::HttpGetter`]: fetches a key from one peer (`PeerGetter`)
//! - [`server::CacheServer`]: answers peer fetches from the local groups
//! - [`codec`]: MessagePack response bodies

pub mod client;
pub mod codec;
pub mod pool;
pub mod server;

pub use client::HttpGetter;
pub use pool::{HttpPool, PoolConfig, DEFAULT_BASE_PATH, DEFAULT_REPLICAS};
pub use server::{build_router, CacheServer, ServerConfig};
