//! Cache Groups
//!
//! A group is one independent cache namespace inside the process. Each
//! group owns its shard, loader, peer picker and in-flight load table;
//! the registry makes groups reachable by name for the peer server.

pub mod pipeline;
pub mod registry;
pub mod stats;

pub use pipeline::Group;
pub use registry::GroupRegistry;
pub use stats::{GroupStats, GroupStatsSnapshot};
