//! Shared job queue and stop signal.
//!
//! The queue is an unbounded multi-producer/multi-consumer FIFO: every item
//! is delivered to exactly one receiver. Workers wait on the queue and the
//! [`StopSignal`] together, so a stop wakes them without polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use crate::quantize::PlacementJob;

/// An item in the job queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Job(PlacementJob),
    /// Sentinel: the receiving worker drains and exits.
    Stop,
}

/// FIFO of placement jobs shared by all workers.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: Sender<Slot>,
    rx: Receiver<Slot>,
}

impl JobQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Build a queue pre-filled with `jobs` in order.
    pub fn from_jobs(jobs: impl IntoIterator<Item = PlacementJob>) -> Self {
        let queue = Self::new();
        for job in jobs {
            queue.push(job);
        }
        queue
    }

    pub fn push(&self, job: PlacementJob) {
        // Both ends live in `self`, so the channel cannot be disconnected here.
        let _ = self.tx.send(Slot::Job(job));
    }

    /// Enqueue one stop sentinel per worker.
    pub fn push_stops(&self, count: usize) {
        for _ in 0..count {
            let _ = self.tx.send(Slot::Stop);
        }
    }

    /// Consumer handle for a worker.
    pub fn receiver(&self) -> Receiver<Slot> {
        self.rx.clone()
    }

    /// Items currently waiting (jobs and sentinels).
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Remove and return every job still queued, discarding sentinels.
    pub fn drain_jobs(&self) -> Vec<PlacementJob> {
        self.rx
            .try_iter()
            .filter_map(|slot| match slot {
                Slot::Job(job) => Some(job),
                Slot::Stop => None,
            })
            .collect()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative, run-wide cancellation.
///
/// Cancelling sets a flag and disconnects an internal channel; every
/// [`StopSignal::listener`] then becomes ready immediately, which lets
/// blocking waits use `crossbeam_channel::select!` on it.
#[derive(Debug, Clone)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    listener: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(tx))),
            listener: rx,
        }
    }

    /// Request a stop. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let mut trigger = match self.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        trigger.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Receiver that never yields a value and disconnects on cancel.
    pub fn listener(&self) -> &Receiver<()> {
        &self.listener
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
