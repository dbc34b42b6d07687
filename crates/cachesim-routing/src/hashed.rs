//! Content-hash routing.
//!
//! Sends a key to `registry[fnv1a(key) mod len]`. Every key has exactly one
//! home while the registry is stable, which maximizes cache reuse, but a
//! resize remaps most keys at once. This is the rehash-storm baseline the
//! bounded-load router is compared against.

use crate::hash::slot_for;
use crate::registry::ServerRegistry;
use crate::traits::*;
use std::sync::Arc;

/// Modulo-hash router.
pub struct Hashed<S> {
    registry: ServerRegistry<S>,
}

impl<S> Hashed<S> {
    pub fn new() -> Self {
        Self {
            registry: ServerRegistry::new(),
        }
    }
}

impl<S> Default for Hashed<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + Sync> Router<S> for Hashed<S> {
    fn set_servers(&self, servers: Vec<Arc<S>>) {
        self.registry.publish(servers);
    }

    fn route(&self, request: &RequestInfo<'_>) -> Arc<S> {
        let servers = self.registry.load_non_empty(self.name());
        Arc::clone(&servers[slot_for(request.key, servers.len())])
    }

    fn name(&self) -> &str {
        "hashed"
    }
}
