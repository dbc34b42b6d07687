//! cachesim: concurrent simulator for request routing in a caching tier.
//!
//! This crate provides the simulation runtime: backend servers with a local
//! resource cache, a bounded inbound queue and a worker pool, a producer
//! that generates requests and routes them, and an event thread that
//! changes the topology while the run is in progress. Routers from
//! `cachesim-routing` are plugged in to pick a server for each request.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────┐     ┌──────────────┐
//! │ Workload │────▶│  Producer │     │   Metrics    │
//! │  (keys)  │     │  thread   │     │   Report     │
//! └──────────┘     └─────┬─────┘     └──────▲───────┘
//!                        │                  │ request log
//!                ┌───────┴───────┐   ┌──────┴───────┐
//!                │    Router     │◀──│ Event thread │
//!                │ (set_servers) │   │  (Topology)  │
//!                └───────┬───────┘   └──────────────┘
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │ Server 0 │  │ Server 1 │  │ Server N │
//!    │  Cache   │  │  Cache   │  │  Cache   │
//!    │ Workers  │  │ Workers  │  │ Workers  │
//!    └──────────┘  └──────────┘  └──────────┘
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod events;
pub mod metrics;
pub mod request;
pub mod server;
pub mod signal;
pub mod simulation;
pub mod topology;
pub mod workload;

// Re-export key types for convenience.
pub use cache::{CacheStats, ResourceCache};
pub use clock::RunClock;
pub use config::{ConfigError, EventConfig, SimConfig};
pub use events::{EventQueue, ScheduledEvent};
pub use metrics::{miss_rate_timeline, Percentiles, SimulationReport};
pub use request::Request;
pub use server::{HandleOutcome, Server, ServerId, ServerSummary};
pub use signal::{ActorGroup, Shutdown, ShutdownListener};
pub use simulation::{Phase, Simulation, SimulationError};
pub use topology::{Cluster, Topology, TopologyChange};
pub use workload::{ArrivalProcess, Workload};

use cachesim_routing::RouterKind;
use std::time::Duration;
use tracing::warn;

const ACTOR_EXIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a complete simulation with the given config and return its report.
pub fn run_simulation(config: SimConfig) -> Result<SimulationReport, SimulationError> {
    let mut sim = Simulation::new(config)?;
    sim.run()?;
    // Runs in a comparison must not overlap.
    if !sim.wait_for_actors(ACTOR_EXIT_TIMEOUT) {
        warn!(router = sim.router_name(), "actors still running after stop");
    }
    Ok(sim.report())
}

/// Run the same configuration once per router, one after another.
pub fn compare_routers(
    config: &SimConfig,
    routers: &[RouterKind],
) -> Result<Vec<SimulationReport>, SimulationError> {
    routers
        .iter()
        .map(|&kind| run_simulation(config.clone().with_router(kind)))
        .collect()
}
