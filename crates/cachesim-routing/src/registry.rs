//! Copy-on-write server registry shared by the stateless routers.

use arc_swap::{ArcSwap, Guard};
use std::sync::Arc;

/// The currently published list of servers.
///
/// Publishing swaps in a whole new vector; readers hold a guard on the
/// snapshot they loaded, so a concurrent publish never shows them a
/// half-written list.
pub struct ServerRegistry<S> {
    servers: ArcSwap<Vec<Arc<S>>>,
}

impl<S> ServerRegistry<S> {
    pub fn new() -> Self {
        Self {
            servers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn publish(&self, servers: Vec<Arc<S>>) {
        self.servers.store(Arc::new(servers));
    }

    /// Load the current snapshot for the duration of one routing decision.
    pub fn load(&self) -> Guard<Arc<Vec<Arc<S>>>> {
        self.servers.load()
    }

    /// Load the current snapshot, panicking if nothing has been published.
    pub fn load_non_empty(&self, router: &str) -> Guard<Arc<Vec<Arc<S>>>> {
        let servers = self.servers.load();
        assert_non_empty(servers.len(), router);
        servers
    }

    pub fn len(&self) -> usize {
        self.servers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> Default for ServerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn assert_non_empty(len: usize, router: &str) {
    assert!(
        len > 0,
        "{router}: route called with an empty server registry; call set_servers first"
    );
}
