//! Live cluster topology.
//!
//! The [`Cluster`] owns the published server registry and the router that
//! routes against it. The registry is never edited in place: every change
//! builds a new vector, stores it, and hands the same vector to the router's
//! `set_servers`, so the producer either routes against the old registry or
//! the new one.
//!
//! Scheduled events mutate the cluster through a [`Topology`] context, either
//! with a closure or with a declarative [`TopologyChange`].

use crate::server::{Server, ServerId};
use crate::signal::{ActorGroup, ShutdownListener};
use arc_swap::ArcSwap;
use cachesim_routing::Router;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Server registry plus the router it is published to.
pub struct Cluster {
    router: Box<dyn Router<Server>>,
    servers: ArcSwap<Vec<Arc<Server>>>,
    next_id: AtomicU32,
    workers_per_server: usize,
    queue_capacity: usize,
}

impl Cluster {
    pub fn new(
        router: Box<dyn Router<Server>>,
        workers_per_server: usize,
        queue_capacity: usize,
    ) -> Self {
        Self {
            router,
            servers: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU32::new(0),
            workers_per_server,
            queue_capacity,
        }
    }

    pub fn router(&self) -> &dyn Router<Server> {
        self.router.as_ref()
    }

    /// Current registry snapshot.
    pub fn servers(&self) -> Arc<Vec<Arc<Server>>> {
        self.servers.load_full()
    }

    pub fn len(&self) -> usize {
        self.servers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn workers_per_server(&self) -> usize {
        self.workers_per_server
    }

    /// Build a server with a fresh id. Its workers are not started.
    pub fn new_server(&self) -> Arc<Server> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(Server::new(
            id,
            self.workers_per_server,
            self.queue_capacity,
        ))
    }

    /// Replace the registry and republish it to the router.
    pub fn publish(&self, servers: Vec<Arc<Server>>) {
        self.router.set_servers(servers.clone());
        self.servers.store(Arc::new(servers));
    }

    /// Copy-on-write update of the registry.
    ///
    /// Returns false, leaving the registry untouched, if the edit would
    /// leave it empty: the producer cannot route against an empty registry.
    pub fn update<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut Vec<Arc<Server>>),
    {
        let mut servers = self.servers().as_ref().clone();
        edit(&mut servers);
        if servers.is_empty() {
            warn!("refusing topology change that leaves no servers");
            return false;
        }
        self.publish(servers);
        true
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("router", &self.router.name())
            .field("servers", &self.len())
            .field("workers_per_server", &self.workers_per_server)
            .finish()
    }
}

/// Context handed to scheduled event actions.
pub struct Topology<'a> {
    cluster: &'a Cluster,
    elapsed: Duration,
    shutdown: &'a ShutdownListener,
    actors: &'a ActorGroup,
    rng: &'a mut ChaCha8Rng,
}

impl<'a> Topology<'a> {
    pub(crate) fn new(
        cluster: &'a Cluster,
        elapsed: Duration,
        shutdown: &'a ShutdownListener,
        actors: &'a ActorGroup,
        rng: &'a mut ChaCha8Rng,
    ) -> Self {
        Self {
            cluster,
            elapsed,
            shutdown,
            actors,
            rng,
        }
    }

    /// Time since the simulation started, measured when the event fired.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn servers(&self) -> Arc<Vec<Arc<Server>>> {
        self.cluster.servers()
    }

    /// Create a server with the configured worker count and start it.
    ///
    /// The server is not yet part of the registry.
    pub fn create_server(&self) -> io::Result<Arc<Server>> {
        let server = self.cluster.new_server();
        server.run(self.shutdown, self.actors)?;
        Ok(server)
    }

    /// Append `count` new running servers. Returns their ids.
    pub fn add_servers(&mut self, count: usize) -> io::Result<Vec<ServerId>> {
        let added = (0..count)
            .map(|_| self.create_server())
            .collect::<io::Result<Vec<_>>>()?;
        let ids: Vec<ServerId> = added.iter().map(|s| s.id()).collect();
        self.update(|servers| servers.extend(added));
        info!(
            added = ids.len(),
            servers = self.cluster.len(),
            elapsed_ms = self.elapsed.as_millis() as u64,
            "servers added"
        );
        Ok(ids)
    }

    /// Add as many servers as are currently registered.
    pub fn double_servers(&mut self) -> io::Result<Vec<ServerId>> {
        let count = self.cluster.len();
        self.add_servers(count)
    }

    /// Drop `id` from the registry. Its workers keep draining until shutdown.
    pub fn remove_server(&mut self, id: ServerId) -> bool {
        let mut found = false;
        let applied = self.update(|servers| {
            let before = servers.len();
            servers.retain(|s| s.id() != id);
            found = servers.len() != before;
        });
        if applied && found {
            info!(
                server = id,
                servers = self.cluster.len(),
                elapsed_ms = self.elapsed.as_millis() as u64,
                "server removed"
            );
        } else if !found {
            warn!(server = id, "remove_server: no such server");
        }
        applied && found
    }

    /// Remove a uniformly chosen server. Returns its id.
    pub fn remove_random_server(&mut self) -> Option<ServerId> {
        let servers = self.cluster.servers();
        if servers.len() < 2 {
            warn!("remove_random_server: refusing to remove the last server");
            return None;
        }
        let id = servers[self.rng.gen_range(0..servers.len())].id();
        self.remove_server(id).then_some(id)
    }

    /// General copy-on-write edit of the registry.
    pub fn update<F>(&mut self, edit: F) -> bool
    where
        F: FnOnce(&mut Vec<Arc<Server>>),
    {
        self.cluster.update(edit)
    }
}

/// Declarative topology mutation, schedulable from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TopologyChange {
    AddServers { count: usize },
    DoubleServers,
    RemoveServer { server_id: ServerId },
    RemoveRandomServer,
}

impl TopologyChange {
    /// Apply this change, logging any failure to start new servers.
    pub fn apply(&self, topology: &mut Topology<'_>) {
        let result = match self {
            TopologyChange::AddServers { count } => topology.add_servers(*count).map(drop),
            TopologyChange::DoubleServers => topology.double_servers().map(drop),
            TopologyChange::RemoveServer { server_id } => {
                topology.remove_server(*server_id);
                Ok(())
            }
            TopologyChange::RemoveRandomServer => {
                topology.remove_random_server();
                Ok(())
            }
        };
        if let Err(e) = result {
            error!(change = %self, error = %e, "failed to start servers for topology change");
        }
    }
}

impl fmt::Display for TopologyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyChange::AddServers { count } => write!(f, "add_servers({count})"),
            TopologyChange::DoubleServers => f.write_str("double_servers"),
            TopologyChange::RemoveServer { server_id } => write!(f, "remove_server({server_id})"),
            TopologyChange::RemoveRandomServer => f.write_str("remove_random_server"),
        }
    }
}
