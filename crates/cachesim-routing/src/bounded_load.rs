//! Consistent hashing with bounded loads.
//!
//! Starts from the key's hash slot like [`crate::Hashed`], but skips any
//! server whose estimated cache occupancy is already at the bound and probes
//! forward around the ring until it finds one below it. The bound scales
//! with the load factor `C`, so `C` trades cache locality (low probe counts)
//! against balance.
//!
//! Occupancy is tracked per server as the set of distinct keys ever routed to
//! it. Each set has its own lock and nothing serializes the probe with the
//! record that follows it, so two producers routing the same new key at the
//! same moment can both record it, possibly on different servers. That race
//! is accepted: the estimate is a best-effort proxy for cache contents.

use crate::hash::slot_for;
use crate::registry::assert_non_empty;
use crate::traits::*;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Estimated load of one server relative to the bound.
///
/// `(occupied / resource_total) / ((load_factor * resource_total) / server_count)`.
/// Values below 1.0 accept new keys.
pub fn load_estimate(
    occupied: usize,
    resource_total: usize,
    load_factor: f64,
    server_count: usize,
) -> f64 {
    let share = occupied as f64 / resource_total as f64;
    let bound = (load_factor * resource_total as f64) / server_count as f64;
    share / bound
}

/// Distinct keys routed to one server.
#[derive(Debug, Default)]
pub struct Occupancy {
    keys: Mutex<HashSet<Box<str>>>,
}

impl Occupancy {
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }

    /// Insert `key`; returns false if it was already present.
    fn record(&self, key: &str) -> bool {
        let mut keys = self.keys.lock();
        if keys.contains(key) {
            return false;
        }
        keys.insert(key.into())
    }
}

/// Servers and their occupancy, published together.
struct Ring<S> {
    servers: Vec<Arc<S>>,
    occupancy: Vec<Arc<Occupancy>>,
}

impl<S> Ring<S> {
    fn empty() -> Self {
        Self {
            servers: Vec::new(),
            occupancy: Vec::new(),
        }
    }
}

/// Outcome of a single bounded-load routing decision.
#[derive(Debug, Clone)]
pub struct Selection<S> {
    pub server: Arc<S>,
    /// Position of `server` in the registry snapshot that was probed.
    pub index: usize,
    /// Candidates inspected, including the primary.
    pub probes: usize,
    /// Load estimate of the chosen server before the key was recorded.
    pub load: f64,
    /// True when every server was at or above the bound.
    pub saturated: bool,
}

/// Bounded-load consistent hash router.
pub struct BoundedLoad<S> {
    load_factor: f64,
    resource_total: usize,
    ring: ArcSwap<Ring<S>>,
    routes: AtomicU64,
    probes: AtomicU64,
    saturated: AtomicU64,
}

impl<S> BoundedLoad<S> {
    /// Create a router for a key space of roughly `resource_total` keys.
    ///
    /// # Panics
    ///
    /// Panics if `load_factor <= 1.0` or `resource_total == 0`.
    pub fn new(load_factor: f64, resource_total: usize) -> Self {
        assert!(
            load_factor > 1.0,
            "bounded_load: load factor must be > 1.0, got {load_factor}"
        );
        assert!(resource_total > 0, "bounded_load: resource_total must be > 0");
        Self {
            load_factor,
            resource_total,
            ring: ArcSwap::from_pointee(Ring::empty()),
            routes: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            saturated: AtomicU64::new(0),
        }
    }

    /// Build from caller-supplied parameters, `None` if they are out of range.
    pub fn from_params(params: &RouterParams) -> Option<Self> {
        params
            .is_valid()
            .then(|| Self::new(params.load_factor, params.resource_total))
    }

    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    pub fn resource_total(&self) -> usize {
        self.resource_total
    }

    /// Current load estimate of every server, in registry order.
    pub fn loads(&self) -> Vec<f64> {
        let ring = self.ring.load();
        let n = ring.servers.len();
        ring.occupancy
            .iter()
            .map(|o| load_estimate(o.len(), self.resource_total, self.load_factor, n))
            .collect()
    }

    /// Distinct keys recorded against every server, in registry order.
    pub fn occupancy_counts(&self) -> Vec<usize> {
        self.ring.load().occupancy.iter().map(|o| o.len()).collect()
    }

    /// Mean number of candidates inspected per routing decision.
    pub fn avg_probe_length(&self) -> f64 {
        let routes = self.routes.load(Ordering::Relaxed);
        if routes == 0 {
            return 0.0;
        }
        self.probes.load(Ordering::Relaxed) as f64 / routes as f64
    }

    pub fn saturated_routes(&self) -> u64 {
        self.saturated.load(Ordering::Relaxed)
    }

    /// Route `key` and report how the decision was reached.
    pub fn select(&self, key: &str) -> Selection<S> {
        let ring = self.ring.load();
        let n = ring.servers.len();
        assert_non_empty(n, "bounded_load");

        let primary = slot_for(key, n);
        let mut index = primary;
        let mut load = f64::INFINITY;
        let mut probes = 0;
        let mut saturated = true;

        // At most one revolution; on saturation `index` is the last slot visited.
        for step in 0..n {
            index = (primary + step) % n;
            probes += 1;
            load = load_estimate(
                ring.occupancy[index].len(),
                self.resource_total,
                self.load_factor,
                n,
            );
            if load < 1.0 {
                saturated = false;
                break;
            }
        }

        ring.occupancy[index].record(key);

        self.routes.fetch_add(1, Ordering::Relaxed);
        self.probes.fetch_add(probes as u64, Ordering::Relaxed);
        if saturated && self.saturated.fetch_add(1, Ordering::Relaxed) == 0 {
            debug!(
                servers = n,
                load_factor = self.load_factor,
                "bounded-load ring saturated, falling back to last candidate"
            );
        }

        Selection {
            server: Arc::clone(&ring.servers[index]),
            index,
            probes,
            load,
            saturated,
        }
    }
}

impl<S: Send + Sync> Router<S> for BoundedLoad<S> {
    fn set_servers(&self, servers: Vec<Arc<S>>) {
        let previous = self.ring.load();
        // Servers that survive the change keep what they have already cached.
        let occupancy = servers
            .iter()
            .map(|server| {
                previous
                    .servers
                    .iter()
                    .position(|old| Arc::ptr_eq(old, server))
                    .map(|i| Arc::clone(&previous.occupancy[i]))
                    .unwrap_or_default()
            })
            .collect();
        self.ring.store(Arc::new(Ring { servers, occupancy }));
    }

    fn route(&self, request: &RequestInfo<'_>) -> Arc<S> {
        self.select(request.key).server
    }

    fn name(&self) -> &str {
        "bounded_load"
    }

    fn custom_metrics(&self) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert(
            "routes".to_string(),
            self.routes.load(Ordering::Relaxed) as f64,
        );
        m.insert("avg_probe_length".to_string(), self.avg_probe_length());
        m.insert(
            "saturated_routes".to_string(),
            self.saturated_routes() as f64,
        );
        m
    }
}
