//! Request model for the caching-tier simulation.
//!
//! A [`Request`] is created by the arrival producer and then handed between
//! threads: the producer stamps arrival and routing, the server that picks it
//! up stamps completion. Each stamp lives in a set-once cell, so the log can
//! be read concurrently and a request can never be completed twice.

use crate::server::ServerId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// A single request for a cacheable resource.
#[derive(Debug)]
pub struct Request {
    /// Unique request identifier (creation order).
    id: u64,
    /// Resource key the request asks for.
    resource: Arc<str>,
    /// How long a cache miss takes to serve.
    work_time: Duration,
    arrival: OnceLock<Instant>,
    routed: OnceLock<Instant>,
    completed: OnceLock<Instant>,
    served_by: OnceLock<ServerId>,
    cache_miss: AtomicBool,
}

impl Request {
    pub fn new(id: u64, resource: Arc<str>, work_time: Duration) -> Self {
        Self {
            id,
            resource,
            work_time,
            arrival: OnceLock::new(),
            routed: OnceLock::new(),
            completed: OnceLock::new(),
            served_by: OnceLock::new(),
            cache_miss: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn resource_arc(&self) -> &Arc<str> {
        &self.resource
    }

    pub fn work_time(&self) -> Duration {
        self.work_time
    }

    pub fn arrival(&self) -> Option<Instant> {
        self.arrival.get().copied()
    }

    pub fn routed(&self) -> Option<Instant> {
        self.routed.get().copied()
    }

    pub fn completed(&self) -> Option<Instant> {
        self.completed.get().copied()
    }

    pub fn served_by(&self) -> Option<ServerId> {
        self.served_by.get().copied()
    }

    pub fn is_cache_miss(&self) -> bool {
        self.cache_miss.load(Ordering::Acquire)
    }

    pub fn is_routed(&self) -> bool {
        self.routed.get().is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get().is_some()
    }

    /// Stamp the producer-side creation time.
    pub fn mark_arrival(&self) {
        stamp(&self.arrival, "arrival", self.id);
    }

    /// Stamp the moment the router picked a server.
    pub fn mark_routed(&self) {
        debug_assert!(
            self.arrival.get().is_some(),
            "request {} routed before arrival",
            self.id
        );
        stamp(&self.routed, "routed", self.id);
    }

    /// Stamp completion on `server`.
    pub fn mark_completed(&self, server: ServerId) {
        self.mark_completed_at(server, Instant::now());
    }

    /// Stamp completion on `server` with an instant read earlier by the caller.
    pub fn mark_completed_at(&self, server: ServerId, at: Instant) {
        let fresh = self.served_by.set(server).is_ok();
        debug_assert!(fresh, "request {}: served_by stamped twice", self.id);
        stamp_at(&self.completed, at, "completed", self.id);
    }

    pub fn mark_cache_miss(&self) {
        self.cache_miss.store(true, Ordering::Release);
    }

    /// Time spent between creation and the routing decision.
    pub fn routing_latency(&self) -> Option<Duration> {
        Some(self.routed()?.saturating_duration_since(self.arrival()?))
    }

    /// Time spent between the routing decision and completion.
    pub fn work_latency(&self) -> Option<Duration> {
        Some(self.completed()?.saturating_duration_since(self.routed()?))
    }

    /// End-to-end latency.
    pub fn total_latency(&self) -> Option<Duration> {
        Some(self.completed()?.saturating_duration_since(self.arrival()?))
    }
}

fn stamp(cell: &OnceLock<Instant>, what: &str, id: u64) {
    stamp_at(cell, Instant::now(), what, id);
}

fn stamp_at(cell: &OnceLock<Instant>, at: Instant, what: &str, id: u64) {
    let fresh = cell.set(at).is_ok();
    debug_assert!(fresh, "request {id}: {what} stamped twice");
}
