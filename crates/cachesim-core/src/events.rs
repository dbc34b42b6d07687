//! Time-ordered one-shot events.
//!
//! Events are scheduled before the run starts at an offset from the start
//! instant. A dedicated thread fires each one once the elapsed time passes
//! its offset, running the action synchronously against a [`Topology`]
//! context. Equal offsets fire in the order they were scheduled.

use crate::clock::RunClock;
use crate::signal::ShutdownListener;
use crate::topology::{Topology, TopologyChange};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Action run when an event fires.
pub type EventAction = Box<dyn FnOnce(&mut Topology<'_>) + Send>;

/// An event popped from the queue.
pub struct ScheduledEvent {
    pub at: Duration,
    pub label: String,
    pub action: EventAction,
}

impl fmt::Debug for ScheduledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEvent")
            .field("at", &self.at)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

struct TimedEvent {
    at: Duration,
    sequence: u64,
    event: ScheduledEvent,
}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.sequence == other.sequence
    }
}

impl Eq for TimedEvent {}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want min-heap
        other
            .at
            .cmp(&self.at)
            .then(other.sequence.cmp(&self.sequence))
    }
}

/// Pending events ordered by `(offset, insertion sequence)`.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<TimedEvent>,
    sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to run once `at` has elapsed.
    pub fn schedule<F>(&mut self, at: Duration, label: impl Into<String>, action: F)
    where
        F: FnOnce(&mut Topology<'_>) + Send + 'static,
    {
        self.heap.push(TimedEvent {
            at,
            sequence: self.sequence,
            event: ScheduledEvent {
                at,
                label: label.into(),
                action: Box::new(action),
            },
        });
        self.sequence += 1;
    }

    /// Schedule a declarative topology change.
    pub fn schedule_change(&mut self, at: Duration, change: TopologyChange) {
        let label = change.to_string();
        self.schedule(at, label, move |topology| change.apply(topology));
    }

    /// Offset of the next event to fire.
    pub fn next_at(&self) -> Option<Duration> {
        self.heap.peek().map(|e| e.at)
    }

    /// Pop the head if `elapsed` is strictly past its offset.
    pub fn pop_due(&mut self, elapsed: Duration) -> Option<ScheduledEvent> {
        if self.next_at()? < elapsed {
            self.heap.pop().map(|e| e.event)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.heap.len())
            .field("next_at", &self.next_at())
            .finish()
    }
}

/// Fire due events until the queue is empty or shutdown fires.
///
/// Sleeps on the shutdown channel until the head is due instead of polling.
/// Returns the number of events fired.
pub fn run_event_loop<F>(
    mut queue: EventQueue,
    clock: &RunClock,
    shutdown: &ShutdownListener,
    mut fire: F,
) -> usize
where
    F: FnMut(ScheduledEvent, Duration),
{
    let mut fired = 0;
    while let Some(next) = queue.next_at() {
        if shutdown.is_triggered() {
            break;
        }
        let elapsed = clock.elapsed();
        if let Some(event) = queue.pop_due(elapsed) {
            debug!(event = %event.label, at_ms = event.at.as_millis() as u64, "event fired");
            fire(event, elapsed);
            fired += 1;
            continue;
        }
        if shutdown.wait_timeout(next.saturating_sub(elapsed)) {
            break;
        }
    }
    debug!(fired, pending = queue.len(), "event loop exiting");
    fired
}
