//! Group Registry
//!
//! Name-to-group lookup shared by the node and its peer server. Reads take
//! the shared lock, registration takes the exclusive lock. Registering a
//! name twice replaces the earlier group; handles to the old group stay
//! valid but are no longer reachable by name.

use crate::domain::ports::GetterRef;
use crate::error::Result;
use crate::group::pipeline::Group;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of groups by name
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a group and register it under `name`
    pub fn new_group(
        &self,
        name: impl Into<String>,
        max_bytes: u64,
        getter: GetterRef,
    ) -> Result<Arc<Group>> {
        let group = Group::new(name, max_bytes, getter)?;

        let mut groups = self.groups.write();
        if groups
            .insert(group.name().to_string(), group.clone())
            .is_some()
        {
            warn!(group = group.name(), "Replaced existing group");
        } else {
            info!(group = group.name(), max_bytes, "Registered group");
        }

        Ok(group)
    }

    /// Look up a group by name
    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Names of all registered groups, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered groups
    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    /// Check if no group is registered
    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}
