//! Round-robin routing.
//!
//! The simplest strategy: cycles through the registry regardless of which
//! key a request carries. From the cache's point of view this is random
//! placement, so every server ends up caching the whole key space.

use crate::registry::ServerRegistry;
use crate::traits::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Round-robin router.
///
/// The cursor is a plain atomic counter reduced modulo the registry length
/// on every call, so a shrinking registry can never produce an out of range
/// index.
pub struct RoundRobin<S> {
    registry: ServerRegistry<S>,
    cursor: AtomicUsize,
}

impl<S> RoundRobin<S> {
    pub fn new() -> Self {
        Self {
            registry: ServerRegistry::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Raw cursor value (calls made so far).
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

impl<S> Default for RoundRobin<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + Sync> Router<S> for RoundRobin<S> {
    fn set_servers(&self, servers: Vec<Arc<S>>) {
        self.registry.publish(servers);
    }

    fn route(&self, _request: &RequestInfo<'_>) -> Arc<S> {
        let servers = self.registry.load_non_empty(self.name());
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % servers.len();
        Arc::clone(&servers[index])
    }

    fn name(&self) -> &str {
        "round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{ids, make_servers};

    fn req() -> RequestInfo<'static> {
        RequestInfo::new(0, "key")
    }

    #[test]
    fn test_round_robin_distributes_evenly() {
        let rr = RoundRobin::new();
        rr.set_servers(make_servers(4));

        let mut counts = [0u32; 4];
        for _ in 0..100 {
            counts[*rr.route(&req()) as usize] += 1;
        }
        assert_eq!(counts, [25, 25, 25, 25]);
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let rr = RoundRobin::new();
        rr.set_servers(make_servers(5));

        // Advance the cursor off zero first.
        rr.route(&req());
        rr.route(&req());

        let picked: Vec<u32> = (0..5).map(|_| *rr.route(&req())).collect();
        assert_eq!(picked, vec![2, 3, 4, 0, 1]);
    }

    #[test]
    fn test_round_robin_shrinking_registry_wraps() {
        let rr = RoundRobin::new();
        rr.set_servers(make_servers(8));
        for _ in 0..7 {
            rr.route(&req());
        }
        assert_eq!(rr.cursor(), 7);

        // Cursor is now past the end of the smaller registry.
        rr.set_servers(make_servers(3));
        let picked = ids(&(0..3).map(|_| rr.route(&req())).collect::<Vec<_>>());
        assert_eq!(picked, vec![1, 2, 0]);
    }

    #[test]
    #[should_panic(expected = "empty server registry")]
    fn test_round_robin_panics_without_servers() {
        let rr: RoundRobin<u32> = RoundRobin::new();
        rr.route(&req());
    }
}
