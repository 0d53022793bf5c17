//! Multi-agent placement orchestration.
//!
//! A run moves jobs from a shared [`JobQueue`] through a pool of worker
//! threads, one per [`PlacementAgent`](crate::agent::PlacementAgent), and
//! folds their [`PlacementResult`]s into [`RunStats`]. A single
//! [`StopSignal`] is shared by every component for cancellation.

pub mod aggregator;
pub mod pool;
pub mod queue;
pub mod scheduler;

pub use aggregator::{AggregateOutcome, Aggregator, Progress, ProgressCallback, RunStats};
pub use pool::{AcquiredAgent, AgentPool, PlacementResult, WorkerState, WorkerSummary};
pub use queue::{JobQueue, Slot, StopSignal};
pub use scheduler::{
    estimate_duration, RunReport, Scheduler, SchedulerConfig, DEFAULT_COOLDOWN,
    DEFAULT_STALL_TIMEOUT,
};
