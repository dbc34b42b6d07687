//! Router trait definitions.
//!
//! All routing strategies implement the [`Router`] trait. A router holds the
//! most recently published server registry and picks one of its members for
//! each incoming request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Information about an incoming request, provided to routers.
///
/// Routers only ever look at the resource key; the id is carried for logging.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo<'a> {
    pub id: u64,
    pub key: &'a str,
}

impl<'a> RequestInfo<'a> {
    pub fn new(id: u64, key: &'a str) -> Self {
        Self { id, key }
    }
}

/// The closed set of built-in strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterKind {
    RoundRobin,
    Hashed,
    BoundedLoad,
}

impl RouterKind {
    /// Stable name used by [`crate::router_by_name`] and in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterKind::RoundRobin => "round_robin",
            RouterKind::Hashed => "hashed",
            RouterKind::BoundedLoad => "bounded_load",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "round_robin" => Some(RouterKind::RoundRobin),
            "hashed" => Some(RouterKind::Hashed),
            "bounded_load" => Some(RouterKind::BoundedLoad),
            _ => None,
        }
    }
}

impl fmt::Display for RouterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy parameters. Only [`crate::BoundedLoad`] reads them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouterParams {
    /// Load bound multiplier `C`; must be greater than 1.0.
    pub load_factor: f64,
    /// Expected cardinality of the key space.
    pub resource_total: usize,
}

impl RouterParams {
    /// True when `load_factor > 1.0` and `resource_total > 0`.
    pub fn is_valid(&self) -> bool {
        self.load_factor > 1.0 && self.resource_total > 0
    }
}

impl Default for RouterParams {
    fn default() -> Self {
        Self {
            load_factor: 1.25,
            resource_total: 1 << 10,
        }
    }
}

/// The core routing trait.
///
/// Every method takes `&self`: the producer thread routes while the event
/// thread republishes the registry, so implementations synchronize
/// internally. `set_servers` must be atomic from the point of view of
/// `route`, which sees either the previous registry or the new one in full.
pub trait Router<S>: Send + Sync {
    /// Replace the server registry wholesale.
    fn set_servers(&self, servers: Vec<Arc<S>>);

    /// Pick the server that handles `request`.
    ///
    /// # Panics
    ///
    /// Panics if no servers have been published yet. Routing against an
    /// empty registry is a caller bug, not a recoverable condition.
    fn route(&self, request: &RequestInfo<'_>) -> Arc<S>;

    /// Human-readable name for reports.
    fn name(&self) -> &str;

    /// Optional: strategy-specific metrics to include in output.
    fn custom_metrics(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
}
