//! Dirty tracking and autosave timing.
//!
//! Timers are deadlines, not sleeps: the owner calls [`AutosaveScheduler::poll`]
//! from its event loop and sleeps at most until [`AutosaveScheduler::next_deadline`].

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Source of the current time
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Persistence bookkeeping for the current puzzle.
///
/// `revision` counts state-changing commands and `epoch` counts puzzle
/// boundaries (new or loaded puzzle). Save responses compare both against the
/// values captured when the request went out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    dirty: bool,
    identity: String,
    revision: u64,
    epoch: u64,
}

impl SessionState {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Id assigned by the persistence backend; empty for an unsaved puzzle
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    /// Clear the dirty flag if nothing changed since `revision`. Returns whether it was cleared.
    pub fn mark_saved(&mut self, revision: u64) -> bool {
        if revision == self.revision {
            self.dirty = false;
        }
        !self.dirty
    }

    pub fn adopt_identity(&mut self, id: impl Into<String>) {
        self.identity = id.into();
    }

    /// Start a new identity boundary with the given id (empty for a fresh puzzle)
    pub fn begin_puzzle(&mut self, id: impl Into<String>) {
        self.identity = id.into();
        self.epoch += 1;
    }

    /// Forget pending changes, used when a saved puzzle has just been loaded
    pub fn reset_clean(&mut self) {
        self.dirty = false;
        self.revision += 1;
    }
}

/// Why an autosave fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    /// The quiet period after the last edit elapsed
    Debounce,
    /// The periodic fallback interval elapsed
    Periodic,
}

/// Debounce plus periodic fallback timer
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    debounce: Duration,
    interval: Duration,
    debounce_deadline: Option<Instant>,
    periodic_deadline: Option<Instant>,
}

impl AutosaveScheduler {
    pub fn new(debounce: Duration, interval: Duration) -> Self {
        Self {
            debounce,
            interval,
            debounce_deadline: None,
            periodic_deadline: None,
        }
    }

    /// Start the periodic fallback timer
    pub fn start(&mut self, now: Instant) {
        self.periodic_deadline = Some(now + self.interval);
    }

    /// Cancel both timers
    pub fn stop(&mut self) {
        self.debounce_deadline = None;
        self.periodic_deadline = None;
    }

    pub fn is_running(&self) -> bool {
        self.periodic_deadline.is_some()
    }

    /// (Re)start the debounce timer; a pending one is replaced
    pub fn arm(&mut self, now: Instant) {
        self.debounce_deadline = Some(now + self.debounce);
    }

    pub fn cancel_debounce(&mut self) {
        self.debounce_deadline = None;
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debounce_deadline
    }

    /// Earliest moment `poll` could fire
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.debounce_deadline, self.periodic_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Expire due timers. Returns a trigger when a save should be attempted,
    /// which only happens while the session is dirty. Both timers expiring in
    /// the same poll produce a single trigger.
    pub fn poll(&mut self, now: Instant, dirty: bool) -> Option<SaveTrigger> {
        let mut trigger = None;

        if self.debounce_deadline.is_some_and(|at| at <= now) {
            self.debounce_deadline = None;
            if dirty {
                trigger = Some(SaveTrigger::Debounce);
            }
        }

        if let Some(at) = self.periodic_deadline {
            if at <= now {
                let mut next = at + self.interval;
                while next <= now {
                    next += self.interval;
                }
                self.periodic_deadline = Some(next);
                if dirty && trigger.is_none() {
                    trigger = Some(SaveTrigger::Periodic);
                }
            }
        }

        trigger
    }
}
