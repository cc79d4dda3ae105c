//! Weighted fair dispatch across producers.
//!
//! The gate tracks each producer's normalized progress (records issued
//! divided by weight, a virtual time). A producer may start a batch only
//! while it sits at the minimum virtual time among active producers; over
//! any window of at least `max_weight x batch_size` records this keeps
//! per-producer emission within one batch of the weight ratio.

use std::sync::{Condvar, Mutex};

const VT_EPSILON: f64 = 1e-9;

/// Deficit-style gate over producer batch grants.
pub struct WeightedGate {
    state: Mutex<GateState>,
    cv: Condvar,
}

struct GateState {
    entries: Vec<Entry>,
    closed: bool,
}

struct Entry {
    issued: f64,
    weight: f64,
    active: bool,
}

impl Entry {
    fn virtual_time(&self) -> f64 {
        self.issued / self.weight
    }
}

impl WeightedGate {
    /// Create a gate for producers with the given weights (all > 0).
    pub fn new(weights: &[f64]) -> Self {
        Self {
            state: Mutex::new(GateState {
                entries: weights
                    .iter()
                    .map(|&weight| Entry {
                        issued: 0.0,
                        weight,
                        active: true,
                    })
                    .collect(),
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Wait for producer `id`'s turn, then account `n` records to it.
    ///
    /// Returns `false` when the gate was closed.
    pub fn acquire(&self, id: usize, n: u64) -> bool {
        let mut state = self.state.lock().expect("gate lock poisoned");
        loop {
            if state.closed {
                return false;
            }
            let mine = state.entries[id].virtual_time();
            let min = state
                .entries
                .iter()
                .filter(|e| e.active)
                .map(Entry::virtual_time)
                .fold(f64::INFINITY, f64::min);
            if mine <= min + VT_EPSILON {
                state.entries[id].issued += n as f64;
                self.cv.notify_all();
                return true;
            }
            state = self.cv.wait(state).expect("gate lock poisoned");
        }
    }

    /// Correct producer `id`'s account by `delta` records (negative when
    /// a granted batch shrank or was abandoned).
    pub fn adjust(&self, id: usize, delta: f64) {
        let mut state = self.state.lock().expect("gate lock poisoned");
        state.entries[id].issued = (state.entries[id].issued + delta).max(0.0);
        self.cv.notify_all();
    }

    /// Remove producer `id` from fairness accounting (it finished or
    /// retired); waiting producers recompute their turn without it.
    pub fn retire(&self, id: usize) {
        let mut state = self.state.lock().expect("gate lock poisoned");
        state.entries[id].active = false;
        self.cv.notify_all();
    }

    /// Close the gate; all pending and future acquires return `false`.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("gate lock poisoned");
        state.closed = true;
        self.cv.notify_all();
    }
}
