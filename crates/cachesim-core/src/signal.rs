//! Broadcast shutdown and actor liveness tracking.
//!
//! Both are built on channel disconnection: a receiver observes
//! `Disconnected` once every matching sender is gone, and that state is
//! visible to every clone of the receiver at once.
//!
//! - [`Shutdown`] owns the only sender of a zero-capacity channel. Dropping
//!   it (via [`Shutdown::trigger`]) wakes every [`ShutdownListener`].
//! - [`ActorGroup`] hands each actor thread an [`ActorToken`] holding a
//!   sender clone; the group's receiver disconnects once every token has
//!   been dropped, i.e. every actor has returned.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Owner side of the shutdown broadcast.
#[derive(Debug)]
pub struct Shutdown {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.rx.clone(),
        }
    }

    /// Wake every listener. Returns false if already triggered.
    pub fn trigger(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of the shutdown broadcast, cheap to clone into threads.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: Receiver<()>,
}

impl ShutdownListener {
    /// Non-blocking check.
    pub fn is_triggered(&self) -> bool {
        // Nothing is ever sent, so the only non-empty outcome is disconnection.
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block for up to `timeout`. Returns true if shutdown fired meanwhile.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return self.is_triggered();
        }
        matches!(
            self.rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Block until shutdown fires.
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }

    /// Channel to `select!` on next to a work channel.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Liveness tracker for a set of actor threads.
#[derive(Debug)]
pub struct ActorGroup {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

/// Held by an actor thread for as long as it runs.
#[derive(Debug)]
pub struct ActorToken {
    _tx: Sender<()>,
}

impl ActorGroup {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Register a new actor. Returns `None` once the group has been sealed.
    pub fn token(&self) -> Option<ActorToken> {
        self.tx
            .lock()
            .as_ref()
            .map(|tx| ActorToken { _tx: tx.clone() })
    }

    /// Stop handing out tokens; the group can now drain.
    pub fn seal(&self) {
        self.tx.lock().take();
    }

    /// Seal the group and wait up to `timeout` for every token to drop.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.seal();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Err(RecvTimeoutError::Disconnected) => return true,
                Err(RecvTimeoutError::Timeout) => return false,
                Ok(()) => continue,
            }
        }
    }
}

impl Default for ActorGroup {
    fn default() -> Self {
        Self::new()
    }
}
