//! In-memory namespace backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::{Net, NetError};

/// A namespace whose interfaces are a fixed table.
///
/// Links can be added or removed at runtime, which lets simulators mimic
/// interfaces appearing and disappearing.
#[derive(Debug)]
pub struct StaticNet {
    name: String,
    links: RwLock<HashMap<String, u32>>,
    releases: Arc<AtomicUsize>,
}

impl StaticNet {
    /// Creates an empty namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            links: RwLock::new(HashMap::new()),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Builder-style [`insert_link`](Self::insert_link).
    pub fn with_link(self, ifname: &str, ifindex: u32) -> Self {
        self.insert_link(ifname, ifindex);
        self
    }

    /// Adds (or re-indexes) an interface.
    pub fn insert_link(&self, ifname: &str, ifindex: u32) {
        self.links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ifname.to_string(), ifindex);
    }

    /// Removes an interface. Returns its index if it existed.
    pub fn remove_link(&self, ifname: &str) -> Option<u32> {
        self.links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(ifname)
    }

    /// Shared counter incremented each time [`Net::release`] runs.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }
}

impl Net for StaticNet {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_ifindex(&self, ifname: &str) -> Result<u32, NetError> {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ifname)
            .copied()
            .ok_or_else(|| NetError::NotFound(ifname.to_string()))
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
