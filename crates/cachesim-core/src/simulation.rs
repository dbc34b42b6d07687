//! Simulation coordinator.
//!
//! A [`Simulation`] owns the configuration, the cluster (registry plus
//! router), the pending event queue and the request log, and starts and
//! stops every actor thread:
//!
//! ```text
//!   producer ──route──▶ Router ──▶ Server queue ──▶ workers (hit / miss)
//!       │                  ▲
//!       └─▶ request log    │ set_servers
//!                          │
//!   event thread ──▶ Topology context ──▶ Cluster registry
//! ```
//!
//! Stopping only broadcasts cancellation and records the stop instant; it
//! does not wait for in-flight requests, which are left incomplete.

use crate::clock::RunClock;
use crate::config::{ConfigError, SimConfig};
use crate::events::{run_event_loop, EventQueue};
use crate::metrics::SimulationReport;
use crate::request::Request;
use crate::server::Server;
use crate::signal::{ActorGroup, Shutdown, ShutdownListener};
use crate::topology::{Cluster, Topology, TopologyChange};
use crate::workload::{ArrivalProcess, Workload};
use cachesim_routing::{build_router, RequestInfo, Router};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io;
use std::mem;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("simulation is already initialized")]
    AlreadyInitialized,
    #[error("simulation must be initialized before it is started")]
    NotInitialized,
    #[error("simulation has already been started")]
    AlreadyStarted,
    #[error("simulation has been stopped")]
    Stopped,
    #[error("actor group is sealed; cannot start {actor}")]
    Sealed { actor: String },
    #[error("failed to spawn {actor} thread: {source}")]
    Spawn {
        actor: String,
        #[source]
        source: io::Error,
    },
}

/// Lifecycle position of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Initialized,
    Running,
    Stopped,
}

/// State shared with the actor threads.
struct Shared {
    cluster: Cluster,
    requests: Mutex<Vec<Arc<Request>>>,
    clock: RunClock,
    shutdown: Shutdown,
    actors: ActorGroup,
}

/// A single simulation run.
pub struct Simulation {
    config: SimConfig,
    shared: Arc<Shared>,
    events: EventQueue,
    workload: Option<Workload>,
    phase: Phase,
}

impl Simulation {
    /// Build a simulation using the router named in the configuration.
    pub fn new(config: SimConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let router = build_router(config.router.kind, &config.router_params()).ok_or_else(|| {
            ConfigError::Validation(format!(
                "invalid parameters for router {}",
                config.router.kind
            ))
        })?;
        Self::with_router(config, router)
    }

    /// Build a simulation around a caller-supplied router.
    pub fn with_router(
        config: SimConfig,
        router: Box<dyn Router<Server>>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let cluster = Cluster::new(
            router,
            config.cluster.workers_per_server,
            config.queue_capacity(),
        );
        let mut events = EventQueue::new();
        for event in &config.events {
            events.schedule_change(Duration::from_millis(event.at_ms), event.change.clone());
        }
        Ok(Self {
            config,
            shared: Arc::new(Shared {
                cluster,
                requests: Mutex::new(Vec::new()),
                clock: RunClock::new(),
                shutdown: Shutdown::new(),
                actors: ActorGroup::new(),
            }),
            events,
            workload: None,
            phase: Phase::Created,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn router_name(&self) -> &str {
        self.shared.cluster.router().name()
    }

    /// Schedule `action` at `at` after start. Only valid before start.
    pub fn add_event<F>(
        &mut self,
        at: Duration,
        label: impl Into<String>,
        action: F,
    ) -> Result<(), SimulationError>
    where
        F: FnOnce(&mut Topology<'_>) + Send + 'static,
    {
        self.ensure_not_started()?;
        self.events.schedule(at, label, action);
        Ok(())
    }

    /// Schedule a declarative topology change. Only valid before start.
    pub fn schedule_change(
        &mut self,
        at: Duration,
        change: TopologyChange,
    ) -> Result<(), SimulationError> {
        self.ensure_not_started()?;
        self.events.schedule_change(at, change);
        Ok(())
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Build the initial servers and key population and publish the registry.
    pub fn initialize(&mut self) -> Result<(), SimulationError> {
        match self.phase {
            Phase::Created => {}
            Phase::Stopped => return Err(SimulationError::Stopped),
            _ => return Err(SimulationError::AlreadyInitialized),
        }
        let cluster = &self.shared.cluster;
        let servers = (0..self.config.cluster.servers)
            .map(|_| cluster.new_server())
            .collect();
        cluster.publish(servers);

        self.workload = Some(Workload::new(
            self.config.workload.resources,
            self.config.avg_miss_duration(),
            ArrivalProcess::from_interval(self.config.arrival_interval()),
            self.config.simulation.seed,
        ));
        self.phase = Phase::Initialized;
        debug!(
            servers = cluster.len(),
            resources = self.config.workload.resources,
            "simulation initialized"
        );
        Ok(())
    }

    /// Launch server workers, the arrival producer and the event loop.
    pub fn start(&mut self) -> Result<(), SimulationError> {
        match self.phase {
            Phase::Initialized => {}
            Phase::Created => return Err(SimulationError::NotInitialized),
            Phase::Running => return Err(SimulationError::AlreadyStarted),
            Phase::Stopped => return Err(SimulationError::Stopped),
        }
        let workload = self.workload.take().ok_or(SimulationError::NotInitialized)?;
        self.phase = Phase::Running;
        self.shared.clock.start();

        info!(
            name = %self.config.simulation.name,
            router = self.router_name(),
            servers = self.shared.cluster.len(),
            workers_per_server = self.config.cluster.workers_per_server,
            events = self.events.len(),
            "simulation started"
        );

        if let Err(e) = self.launch(workload) {
            self.stop();
            return Err(e);
        }
        Ok(())
    }

    fn launch(&mut self, workload: Workload) -> Result<(), SimulationError> {
        let listener = self.shared.shutdown.listener();
        for server in self.shared.cluster.servers().iter() {
            server
                .run(&listener, &self.shared.actors)
                .map_err(|source| SimulationError::Spawn {
                    actor: format!("server-{}", server.id()),
                    source,
                })?;
        }

        let shared = Arc::clone(&self.shared);
        let limit = self.config.simulation.request_limit;
        let producer_listener = listener.clone();
        self.spawn_actor("producer", move || {
            produce(&shared, workload, limit, &producer_listener)
        })?;

        let shared = Arc::clone(&self.shared);
        let queue = mem::take(&mut self.events);
        let seed = self.config.simulation.seed.wrapping_add(1);
        self.spawn_actor("events", move || {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            run_event_loop(queue, &shared.clock, &listener, |event, elapsed| {
                let mut topology =
                    Topology::new(&shared.cluster, elapsed, &listener, &shared.actors, &mut rng);
                (event.action)(&mut topology);
            });
        })
    }

    fn spawn_actor<F>(&self, name: &str, body: F) -> Result<(), SimulationError>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(token) = self.shared.actors.token() else {
            return Err(SimulationError::Sealed {
                actor: name.to_string(),
            });
        };
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _token = token;
                body();
            })
            .map(drop)
            .map_err(|source| SimulationError::Spawn {
                actor: name.to_string(),
                source,
            })
    }

    /// Initialize, start, sleep for the configured duration, stop.
    pub fn run(&mut self) -> Result<(), SimulationError> {
        if self.phase == Phase::Created {
            self.initialize()?;
        }
        self.start()?;
        thread::sleep(self.config.duration());
        self.stop();
        Ok(())
    }

    /// Broadcast cancellation and record the stop instant. Idempotent.
    ///
    /// Returns immediately; actors exit on their own shortly after.
    pub fn stop(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        let was_running = self.phase == Phase::Running;
        self.phase = Phase::Stopped;
        // Workers never stamp a completion later than the trigger, so the
        // stop instant must be read after it.
        self.shared.shutdown.trigger();
        if was_running {
            self.shared.clock.stop();
            info!(
                name = %self.config.simulation.name,
                router = self.router_name(),
                elapsed_ms = self.shared.clock.run_duration().as_millis() as u64,
                requests = self.shared.requests.lock().len(),
                "simulation stopped"
            );
        }
    }

    /// Wait up to `timeout` for every actor thread to exit.
    ///
    /// Only meaningful after [`Simulation::stop`]; it does not change what
    /// stop abandons.
    pub fn wait_for_actors(&self, timeout: Duration) -> bool {
        self.shared.actors.wait(timeout)
    }

    /// Snapshot of the request log in creation order.
    pub fn requests(&self) -> Vec<Arc<Request>> {
        self.shared.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.shared.requests.lock().len()
    }

    /// Current server registry.
    pub fn servers(&self) -> Arc<Vec<Arc<Server>>> {
        self.shared.cluster.servers()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.shared.clock.started_at()
    }

    /// Stop instant, once a running simulation has been stopped.
    pub fn stopped_at(&self) -> Option<Instant> {
        self.shared.clock.stopped_at()
    }

    /// Time since start.
    pub fn elapsed(&self) -> Duration {
        self.shared.clock.elapsed()
    }

    /// Measured start-to-stop duration.
    pub fn run_duration(&self) -> Duration {
        self.shared.clock.run_duration()
    }

    pub fn shutdown_listener(&self) -> ShutdownListener {
        self.shared.shutdown.listener()
    }

    /// Aggregate the request log into a report.
    pub fn report(&self) -> SimulationReport {
        let requests = self.requests();
        SimulationReport::build(
            &self.config.simulation.name,
            self.router_name(),
            self.run_duration(),
            &requests,
            &self.servers(),
            self.shared.cluster.router().custom_metrics(),
        )
    }

    fn ensure_not_started(&self) -> Result<(), SimulationError> {
        match self.phase {
            Phase::Created | Phase::Initialized => Ok(()),
            Phase::Running => Err(SimulationError::AlreadyStarted),
            Phase::Stopped => Err(SimulationError::Stopped),
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Arrival producer: create, log, route, enqueue until cancelled.
fn produce(shared: &Shared, mut workload: Workload, limit: Option<u64>, shutdown: &ShutdownListener) {
    let mut created: u64 = 0;
    loop {
        if shutdown.is_triggered() || limit.is_some_and(|l| created >= l) {
            break;
        }
        if let Some(gap) = workload.next_gap() {
            if shutdown.wait_timeout(gap) {
                break;
            }
        }

        let request = Arc::new(workload.next_request(created));
        created += 1;
        shared.requests.lock().push(Arc::clone(&request));
        request.mark_arrival();
        let server = shared
            .cluster
            .router()
            .route(&RequestInfo::new(request.id(), request.resource()));
        request.mark_routed();
        if !server.enqueue(request, shutdown) {
            break;
        }
    }
    debug!(created, "producer exiting");
}
