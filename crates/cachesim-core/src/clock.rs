//! Wall clock for a single simulation run.
//!
//! The [`RunClock`] records when the run started and stopped. Event offsets
//! and throughput are both measured against it, so the event thread and the
//! report agree on what "elapsed" means.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Start and stop instants of one run. Each is set once.
#[derive(Debug, Default)]
pub struct RunClock {
    started: OnceLock<Instant>,
    stopped: OnceLock<Instant>,
}

impl RunClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start instant. Returns false if already started.
    pub fn start(&self) -> bool {
        self.started.set(Instant::now()).is_ok()
    }

    /// Record the stop instant. Returns false if already stopped.
    pub fn stop(&self) -> bool {
        self.stopped.set(Instant::now()).is_ok()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started.get().copied()
    }

    pub fn stopped_at(&self) -> Option<Instant> {
        self.stopped.get().copied()
    }

    /// Time since start, zero before the run has started.
    pub fn elapsed(&self) -> Duration {
        self.started_at()
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    /// Measured length of the run: start to stop, or start to now while running.
    pub fn run_duration(&self) -> Duration {
        match (self.started_at(), self.stopped_at()) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

/// Duration in fractional milliseconds, as used in reports.
pub fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
