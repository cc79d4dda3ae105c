//! Writer pool: bounded parallel delivery into the medium.
//!
//! `--output-writers` threads consume batches from a bounded channel of
//! the same capacity, so a saturated sink blocks dispatch and the
//! back-pressure propagates to producers. A successful write commits the
//! batch's budget reservation; a failure refunds it (the count guard then
//! issues a replacement batch) and counts toward the medium's
//! consecutive-failure limit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use super::budget::Budget;
use super::ShutdownState;
use crate::error::Error;
use crate::medium::Medium;
use crate::record::Payload;

/// Consecutive medium failures tolerated before the pipeline aborts.
pub const MAX_MEDIUM_FAILURES: u32 = 10;

/// One batch on its way to the medium.
pub(crate) struct WriteJob {
    pub payload: Payload,
    /// Post-mapping record count the batch carries.
    pub size: u64,
}

/// Handle to the spawned writer threads.
pub(crate) struct WriterPool {
    sender: kanal::Sender<WriteJob>,
    handles: Vec<JoinHandle<()>>,
}

impl WriterPool {
    /// Spawn `writers` threads delivering into `medium`.
    pub fn spawn(
        writers: usize,
        medium: Arc<dyn Medium>,
        budget: Arc<Budget>,
        shutdown: Arc<ShutdownState>,
    ) -> Self {
        let (sender, receiver) = kanal::bounded::<WriteJob>(writers.max(1));
        let consecutive_failures = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::with_capacity(writers);
        for slot in 0..writers.max(1) {
            let receiver = receiver.clone();
            let medium = Arc::clone(&medium);
            let budget = Arc::clone(&budget);
            let shutdown = Arc::clone(&shutdown);
            let consecutive_failures = Arc::clone(&consecutive_failures);

            let handle = std::thread::Builder::new()
                .name(format!("writer-{slot}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        match medium.write(&job.payload) {
                            Ok(()) => {
                                budget.commit(job.size);
                                consecutive_failures.store(0, Ordering::Relaxed);
                                debug!(records = job.size, medium = medium.name(), "batch written");
                            }
                            Err(err) => {
                                budget.refund(job.size);
                                let failures =
                                    consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                                warn!(
                                    medium = medium.name(),
                                    failures, error = %err, "batch lost"
                                );
                                if failures >= MAX_MEDIUM_FAILURES {
                                    shutdown.set_fatal(Error::MediumWrite {
                                        cause: format!(
                                            "medium {:?} failed {failures} consecutive writes: {err}",
                                            medium.name()
                                        ),
                                        retriable: false,
                                    });
                                }
                            }
                        }
                    }
                })
                .expect("failed to spawn writer thread");
            handles.push(handle);
        }

        Self { sender, handles }
    }

    /// A sender producers use to dispatch batches (blocks when full).
    pub fn sender(&self) -> kanal::Sender<WriteJob> {
        self.sender.clone()
    }

    /// Close the queue and take the writer handles for joining.
    pub fn into_handles(self) -> Vec<JoinHandle<()>> {
        drop(self.sender);
        self.handles
    }
}
