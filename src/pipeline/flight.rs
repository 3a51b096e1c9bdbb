//! Single-flight coordination per fingerprint.
//!
//! The first caller to claim a fingerprint becomes the leader and computes;
//! everyone claiming it meanwhile gets a receiver and waits for the leader's
//! broadcast. A leader dropped without completing (unwinding) closes the
//! waiters' channels, which they report as `Aborted`.

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::cache::Cached;
use crate::error::PipelineError;
use crate::fingerprint::Fingerprint;

pub(crate) type Outcome = Result<Cached, PipelineError>;

type Waiter = Sender<Outcome>;

/// In-progress computations → waiters
#[derive(Default)]
pub(crate) struct Flights {
    active: DashMap<Fingerprint, Vec<Waiter>>,
}

pub(crate) enum Claim<'a> {
    Leader(Leader<'a>),
    Follower(Receiver<Outcome>),
}

impl Flights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically join an existing computation or start a new one.
    pub fn claim(&self, key: Fingerprint) -> Claim<'_> {
        match self.active.entry(key) {
            Entry::Occupied(mut e) => {
                let (tx, rx) = channel::bounded(1);
                e.get_mut().push(tx);
                Claim::Follower(rx)
            }
            Entry::Vacant(e) => {
                e.insert(Vec::new());
                Claim::Leader(Leader {
                    flights: self,
                    key,
                    done: false,
                })
            }
        }
    }

    /// Number of computations in progress.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    fn take_waiters(&self, key: &Fingerprint) -> Vec<Waiter> {
        self.active.remove(key).map(|(_, w)| w).unwrap_or_default()
    }
}

/// The caller responsible for computing a fingerprint.
pub(crate) struct Leader<'a> {
    flights: &'a Flights,
    key: Fingerprint,
    done: bool,
}

impl Leader<'_> {
    /// Release the claim and hand `outcome` to every waiter.
    pub fn complete(mut self, outcome: Outcome) -> Outcome {
        self.done = true;
        for tx in self.flights.take_waiters(&self.key) {
            let _ = tx.send(outcome.clone());
        }
        outcome
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if !self.done {
            // Waiters see a closed channel
            drop(self.flights.take_waiters(&self.key));
        }
    }
}

/// Wait for a leader's outcome.
pub(crate) fn wait(rx: Receiver<Outcome>, route: &str) -> Outcome {
    rx.recv()
        .unwrap_or_else(|_| Err(PipelineError::Aborted(route.to_string())))
}
