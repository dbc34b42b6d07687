//! Backend server with a bounded inbound queue and a fixed worker pool.
//!
//! Each [`Server`] represents one cache node. The arrival producer pushes
//! requests into its queue (blocking when full) and the server's worker
//! threads drain it: a cached key completes immediately, an uncached key
//! holds the cache's write lock for the sampled fetch time and is then
//! inserted.

use crate::cache::ResourceCache;
use crate::request::Request;
use crate::signal::{ActorGroup, ShutdownListener};
use crossbeam::channel::{self, select, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, trace};

/// Server identifier, unique for the lifetime of a simulation.
pub type ServerId = u32;

/// How a worker disposed of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Key was cached; completed with no added latency.
    Hit,
    /// Key was fetched and inserted.
    Miss,
    /// Shutdown fired during the fetch; the request was left incomplete.
    Abandoned,
}

/// Per-server summary for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSummary {
    pub id: ServerId,
    pub served: u64,
    pub cached_keys: usize,
    pub hit_rate: f64,
}

/// A simulated cache node.
#[derive(Debug)]
pub struct Server {
    id: ServerId,
    workers: usize,
    cache: ResourceCache,
    inbox_tx: Sender<Arc<Request>>,
    inbox_rx: Receiver<Arc<Request>>,
    /// Requests taken off the queue by a worker.
    served: AtomicU64,
    started: AtomicBool,
}

impl Server {
    /// Create a server whose queue holds at most `queue_capacity` requests.
    pub fn new(id: ServerId, workers: usize, queue_capacity: usize) -> Self {
        let (inbox_tx, inbox_rx) = channel::bounded(queue_capacity);
        Self {
            id,
            workers,
            cache: ResourceCache::new(),
            inbox_tx,
            inbox_rx,
            served: AtomicU64::new(0),
            started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Requests waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.inbox_rx.len()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn summary(&self) -> ServerSummary {
        ServerSummary {
            id: self.id,
            served: self.served(),
            cached_keys: self.cache.len(),
            hit_rate: self.cache.hit_rate(),
        }
    }

    /// Push `request` into the queue, blocking while it is full.
    ///
    /// Returns false if shutdown fired before the queue had room; the
    /// request is then dropped without being handled.
    pub fn enqueue(&self, request: Arc<Request>, shutdown: &ShutdownListener) -> bool {
        if shutdown.is_triggered() {
            return false;
        }
        select! {
            send(self.inbox_tx, request) -> res => res.is_ok(),
            recv(shutdown.receiver()) -> _ => false,
        }
    }

    /// Spawn the worker pool. Calling this on a running server is a no-op.
    ///
    /// Each worker holds an [`ActorGroup`] token until it exits. Fails if
    /// the group is already sealed, since nothing would drain the queue.
    pub fn run(self: &Arc<Self>, shutdown: &ShutdownListener, actors: &ActorGroup) -> io::Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        for worker in 0..self.workers {
            let Some(token) = actors.token() else {
                if worker == 0 {
                    self.started.store(false, Ordering::Release);
                }
                return Err(io::Error::other(format!(
                    "server {}: actor group is sealed, cannot start worker {}",
                    self.id, worker
                )));
            };
            let server = Arc::clone(self);
            let listener = shutdown.clone();
            thread::Builder::new()
                .name(format!("server-{}-w{}", self.id, worker))
                .spawn(move || {
                    let _token = token;
                    server.worker_loop(&listener);
                })?;
        }
        debug!(server = self.id, workers = self.workers, "server started");
        Ok(())
    }

    fn worker_loop(&self, shutdown: &ShutdownListener) {
        loop {
            if shutdown.is_triggered() {
                break;
            }
            let next = select! {
                recv(shutdown.receiver()) -> _ => None,
                recv(self.inbox_rx) -> msg => msg.ok(),
            };
            let Some(request) = next else {
                break;
            };
            // select! picks at random among ready arms.
            if shutdown.is_triggered() {
                break;
            }
            self.served.fetch_add(1, Ordering::Relaxed);
            self.handle_request(&request, shutdown);
        }
        trace!(server = self.id, "worker exiting");
    }

    /// Serve one request from the cache or fetch it.
    ///
    /// The write lock is held for the whole fetch, so misses on one server
    /// are serialized. A worker that passed the read check while another
    /// was fetching the same key records a second miss.
    ///
    /// Nothing is completed once shutdown has fired: the completion instant
    /// is read before the check, so it never trails the stop instant.
    pub fn handle_request(&self, request: &Request, shutdown: &ShutdownListener) -> HandleOutcome {
        let cached = self.cache.contains(request.resource());
        if cached {
            self.cache.record_hit();
            if self.complete(request, shutdown) {
                return HandleOutcome::Hit;
            }
            return HandleOutcome::Abandoned;
        }

        let mut keys = self.cache.write();
        request.mark_cache_miss();
        self.cache.record_miss();
        if shutdown.wait_timeout(request.work_time()) {
            return HandleOutcome::Abandoned;
        }
        let now = Instant::now();
        if shutdown.is_triggered() {
            return HandleOutcome::Abandoned;
        }
        keys.insert(Arc::clone(request.resource_arc()));
        request.mark_completed_at(self.id, now);
        HandleOutcome::Miss
    }

    fn complete(&self, request: &Request, shutdown: &ShutdownListener) -> bool {
        let now = Instant::now();
        if shutdown.is_triggered() {
            return false;
        }
        request.mark_completed_at(self.id, now);
        true
    }
}
