//! TOML configuration parsing for cachesim.
//!
//! Defines the configuration schema for one simulation run: run length,
//! cluster shape, workload, router choice and scheduled topology changes.
//! Every section and field has a default, so an empty document is a valid
//! configuration. Configurations can also be built in code with the
//! `with_*` methods.

use crate::topology::TopologyChange;
use cachesim_routing::{RouterKind, RouterParams};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub cluster: ClusterSection,
    #[serde(default)]
    pub workload: WorkloadSection,
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

/// General simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Human-readable name for this simulation.
    #[serde(default = "default_sim_name")]
    pub name: String,
    /// Random seed for the key population and request stream.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Wall-clock run length.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Stop creating requests after this many.
    #[serde(default)]
    pub request_limit: Option<u64>,
}

fn default_sim_name() -> String {
    "simulation".to_string()
}

fn default_seed() -> u64 {
    42
}

fn default_duration_ms() -> u64 {
    10_000
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            name: default_sim_name(),
            seed: default_seed(),
            duration_ms: default_duration_ms(),
            request_limit: None,
        }
    }
}

/// Cluster shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSection {
    /// Initial number of servers.
    #[serde(default = "default_servers")]
    pub servers: usize,
    /// Worker threads per server.
    #[serde(default = "default_workers")]
    pub workers_per_server: usize,
    /// Inbound queue capacity per server; defaults to the worker count.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

fn default_servers() -> usize {
    8
}
fn default_workers() -> usize {
    8
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            workers_per_server: default_workers(),
            queue_capacity: None,
        }
    }
}

/// Request population and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSection {
    /// Number of distinct resource keys.
    #[serde(default = "default_resources")]
    pub resources: usize,
    /// Mean time to serve a cache miss.
    #[serde(default = "default_avg_miss_us")]
    pub avg_miss_duration_us: u64,
    /// Mean gap between arrivals; absent means back-to-back arrivals.
    #[serde(default)]
    pub arrival_interval_us: Option<u64>,
}

fn default_resources() -> usize {
    1 << 10
}
fn default_avg_miss_us() -> u64 {
    20_000
}

impl Default for WorkloadSection {
    fn default() -> Self {
        Self {
            resources: default_resources(),
            avg_miss_duration_us: default_avg_miss_us(),
            arrival_interval_us: None,
        }
    }
}

/// Router selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSection {
    #[serde(default = "default_router_kind")]
    pub kind: RouterKind,
    /// Bounded-load factor `C`.
    #[serde(default = "default_load_factor")]
    pub load_factor: f64,
    /// Expected key-space size; defaults to `workload.resources`.
    #[serde(default)]
    pub resource_total: Option<usize>,
}

fn default_router_kind() -> RouterKind {
    RouterKind::BoundedLoad
}
fn default_load_factor() -> f64 {
    1.25
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            kind: default_router_kind(),
            load_factor: default_load_factor(),
            resource_total: None,
        }
    }
}

/// A topology change scheduled at an offset from the start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub at_ms: u64,
    #[serde(flatten)]
    pub change: TopologyChange,
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Validation(msg.to_string()));

        if self.simulation.duration_ms == 0 {
            return invalid("duration_ms must be > 0");
        }
        if self.simulation.request_limit == Some(0) {
            return invalid("request_limit must be > 0 when set");
        }
        if self.cluster.servers == 0 {
            return invalid("servers must be > 0");
        }
        if self.cluster.workers_per_server == 0 {
            return invalid("workers_per_server must be > 0");
        }
        if self.cluster.queue_capacity == Some(0) {
            return invalid("queue_capacity must be > 0 when set");
        }
        if self.workload.resources == 0 {
            return invalid("resources must be > 0");
        }
        if self.workload.arrival_interval_us == Some(0) {
            return invalid("arrival_interval_us must be > 0 when set");
        }
        if self.router.load_factor.is_nan() || self.router.load_factor <= 1.0 {
            return Err(ConfigError::Validation(format!(
                "load_factor must be > 1.0, got {}",
                self.router.load_factor
            )));
        }
        if self.router.resource_total == Some(0) {
            return invalid("resource_total must be > 0");
        }
        for event in &self.events {
            if let TopologyChange::AddServers { count: 0 } = event.change {
                return Err(ConfigError::Validation(format!(
                    "add_servers at {}ms must add at least one server",
                    event.at_ms
                )));
            }
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.simulation.duration_ms)
    }

    pub fn avg_miss_duration(&self) -> Duration {
        Duration::from_micros(self.workload.avg_miss_duration_us)
    }

    pub fn arrival_interval(&self) -> Option<Duration> {
        self.workload.arrival_interval_us.map(Duration::from_micros)
    }

    pub fn queue_capacity(&self) -> usize {
        self.cluster
            .queue_capacity
            .unwrap_or(self.cluster.workers_per_server)
    }

    pub fn router_params(&self) -> RouterParams {
        RouterParams {
            load_factor: self.router.load_factor,
            resource_total: self
                .router
                .resource_total
                .unwrap_or(self.workload.resources),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.simulation.name = name.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.simulation.seed = seed;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.simulation.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_request_limit(mut self, limit: u64) -> Self {
        self.simulation.request_limit = Some(limit);
        self
    }

    pub fn with_servers(mut self, servers: usize) -> Self {
        self.cluster.servers = servers;
        self
    }

    pub fn with_workers_per_server(mut self, workers: usize) -> Self {
        self.cluster.workers_per_server = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.cluster.queue_capacity = Some(capacity);
        self
    }

    pub fn with_resources(mut self, resources: usize) -> Self {
        self.workload.resources = resources;
        self
    }

    pub fn with_avg_miss_duration(mut self, avg: Duration) -> Self {
        self.workload.avg_miss_duration_us = avg.as_micros() as u64;
        self
    }

    pub fn with_arrival_interval(mut self, interval: Duration) -> Self {
        self.workload.arrival_interval_us = Some(interval.as_micros() as u64);
        self
    }

    pub fn with_router(mut self, kind: RouterKind) -> Self {
        self.router.kind = kind;
        self
    }

    pub fn with_load_factor(mut self, load_factor: f64) -> Self {
        self.router.load_factor = load_factor;
        self
    }

    pub fn with_event(mut self, at: Duration, change: TopologyChange) -> Self {
        self.events.push(EventConfig {
            at_ms: at.as_millis() as u64,
            change,
        });
        self
    }
}
