//! Count guard: the pipeline's record budget.
//!
//! The budget is the only authority over `--number`. Producers *reserve*
//! a batch worth of records before generating them; writers *commit* a
//! reservation when the medium accepted the batch, or *refund* it when
//! the write failed or mappings dropped records. `emitted` therefore
//! counts exactly the records that reached a successful write, and the
//! budget hits zero only when that many records were delivered.

use std::sync::{Condvar, Mutex};

/// Shared record budget with reserve/commit/refund accounting.
pub struct Budget {
    state: Mutex<BudgetState>,
    cv: Condvar,
}

struct BudgetState {
    /// Records still available to reserve; `None` means unlimited.
    remaining: Option<u64>,
    /// Reserved but not yet committed or refunded.
    in_flight: u64,
    /// Records confirmed delivered.
    emitted: u64,
    /// Set on shutdown; makes every reserve return zero.
    closed: bool,
}

impl Budget {
    /// Create a budget for `number` records (`None` = unlimited).
    pub fn new(number: Option<u64>) -> Self {
        Self {
            state: Mutex::new(BudgetState {
                remaining: number,
                in_flight: 0,
                emitted: 0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Reserve up to `want` records.
    ///
    /// Returns the granted size, clipped to what is left so the final
    /// batch can be short. Returns 0 when the budget is spent or closed.
    /// Blocks while the budget is exhausted but reservations are still in
    /// flight: a failed write refunds its reservation, and this producer
    /// must then build the replacement batch.
    pub fn reserve(&self, want: u64) -> u64 {
        let mut state = self.state.lock().expect("budget lock poisoned");
        loop {
            if state.closed {
                return 0;
            }
            match state.remaining {
                None => {
                    state.in_flight += want;
                    return want;
                }
                Some(0) if state.in_flight == 0 => return 0,
                Some(0) => {
                    state = self.cv.wait(state).expect("budget lock poisoned");
                }
                Some(remaining) => {
                    let granted = want.min(remaining);
                    state.remaining = Some(remaining - granted);
                    state.in_flight += granted;
                    return granted;
                }
            }
        }
    }

    /// Confirm delivery of `n` reserved records.
    pub fn commit(&self, n: u64) {
        let mut state = self.state.lock().expect("budget lock poisoned");
        state.in_flight -= n;
        state.emitted += n;
        self.cv.notify_all();
    }

    /// Return `n` reserved records to the pool (failed write or dropped
    /// by mappings).
    pub fn refund(&self, n: u64) {
        let mut state = self.state.lock().expect("budget lock poisoned");
        state.in_flight -= n;
        if let Some(remaining) = state.remaining {
            state.remaining = Some(remaining + n);
        }
        self.cv.notify_all();
    }

    /// Stop handing out reservations; wakes all blocked producers.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("budget lock poisoned");
        state.closed = true;
        self.cv.notify_all();
    }

    /// Records confirmed delivered so far.
    pub fn emitted(&self) -> u64 {
        self.state.lock().expect("budget lock poisoned").emitted
    }
}
