//! Scheduler for multi-agent placement runs.
//!
//! The scheduler wires a [`JobQueue`], an [`AgentPool`] and an
//! [`Aggregator`] together for a single run. Workers pull jobs on demand, so
//! faster agents naturally take more of the work. The aggregation loop runs on
//! the calling thread; [`Scheduler::run_async`] moves it onto tokio's blocking
//! pool for async callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentId, AgentProvider, AgentSpec};
use crate::config::SchedulerSettings;
use crate::error::{Error, Result};
use crate::orchestration::aggregator::{AggregateOutcome, Aggregator, ProgressCallback, RunStats};
use crate::orchestration::pool::{AcquiredAgent, AgentPool};
use crate::orchestration::queue::{JobQueue, StopSignal};
use crate::quantize::PlacementJob;
use crate::util;
use crate::{plog, plog_error, plog_warn};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Cooldown for agents whose roster entry does not override it.
    pub cooldown: Duration,
    /// Silence on the result channel longer than this logs a warning.
    pub stall_timeout: Duration,
    /// Added to every job's coordinates on enqueue.
    pub offset: (i32, i32),
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            offset: (0, 0),
        }
    }
}

impl SchedulerConfig {
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_offset(mut self, x: i32, y: i32) -> Self {
        self.offset = (x, y);
        self
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            cooldown: settings.cooldown(),
            stall_timeout: Duration::from_secs(settings.stall_timeout_secs.max(1)),
            offset: (settings.start_x, settings.start_y),
        }
    }
}

/// Outcome of [`Scheduler::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunReport {
    /// The run executed; `stats` says how far it got.
    Finished { stats: RunStats },
    /// The run never started.
    SetupFailed { error: String },
}

impl RunReport {
    /// Finished, not cancelled, and every job placed.
    pub fn is_success(&self) -> bool {
        match self {
            RunReport::Finished { stats } => {
                !stats.cancelled && stats.failed == 0 && stats.placed == stats.total
            }
            RunReport::SetupFailed { .. } => false,
        }
    }

    pub fn stats(&self) -> Option<&RunStats> {
        match self {
            RunReport::Finished { stats } => Some(stats),
            RunReport::SetupFailed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RunReport::Finished { .. } => None,
            RunReport::SetupFailed { error } => Some(error),
        }
    }
}

/// Expected wall-clock time for `total` jobs: `ceil(total / agents) * cooldown`.
///
/// Returns `None` when there are no agents.
pub fn estimate_duration(total: usize, agents: usize, cooldown: Duration) -> Option<Duration> {
    if agents == 0 {
        return None;
    }
    let rounds = total.div_ceil(agents);
    let rounds = u32::try_from(rounds).ok()?;
    cooldown.checked_mul(rounds)
}

/// Drives one placement run. Consumed by [`Scheduler::run`].
pub struct Scheduler {
    config: SchedulerConfig,
    stop: StopSignal,
    on_progress: Option<ProgressCallback>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            stop: StopSignal::new(),
            on_progress: None,
        }
    }

    /// Invoke `callback` on the aggregation thread after every result.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Handle for cancelling the run from another thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Acquire agents from `provider`, then run.
    pub fn run_with_provider(
        self,
        jobs: Vec<PlacementJob>,
        provider: &dyn AgentProvider,
        specs: &[AgentSpec],
    ) -> RunReport {
        let agents = AgentPool::acquire(provider, specs, self.config.cooldown);
        self.run(jobs, agents)
    }

    /// Place every job using `agents`, blocking until done or cancelled.
    pub fn run(self, jobs: Vec<PlacementJob>, agents: Vec<AcquiredAgent>) -> RunReport {
        match self.execute(jobs, agents) {
            Ok(stats) => RunReport::Finished { stats },
            Err(e) => {
                plog_error!("Run setup failed: {}", e);
                RunReport::SetupFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Like [`Scheduler::run`], cancelled when `cancel` fires.
    pub async fn run_async(
        self,
        jobs: Vec<PlacementJob>,
        agents: Vec<AcquiredAgent>,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let stop = self.stop_signal();
        let watcher = tokio::spawn(async move {
            cancel.cancelled().await;
            plog!("Cancellation requested");
            stop.cancel();
        });
        let report = util::blocking(move || Ok(self.run(jobs, agents))).await;
        watcher.abort();
        report
    }

    fn execute(self, jobs: Vec<PlacementJob>, agents: Vec<AcquiredAgent>) -> Result<RunStats> {
        if agents.is_empty() {
            return Err(Error::NoAgents);
        }

        let total = jobs.len();
        let (dx, dy) = self.config.offset;
        let queue = JobQueue::from_jobs(jobs.into_iter().map(|job| job.offset(dx, dy)));
        let ids: Vec<AgentId> = agents.iter().map(|a| a.id().clone()).collect();
        plog!(
            "Starting run: {} jobs, {} agents, offset ({}, {})",
            total,
            ids.len(),
            dx,
            dy
        );
        if let Some(eta) = estimate_duration(total, ids.len(), self.config.cooldown) {
            plog!("Estimated duration at default cooldown: {:?}", eta);
        }

        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let mut aggregator = Aggregator::new(
            total,
            &ids,
            result_rx,
            self.stop.clone(),
            self.config.stall_timeout,
        )
        .with_progress(self.on_progress);

        let pool = AgentPool::start(agents, &queue, &result_tx, &self.stop)?;
        // Workers hold the only senders now, so the aggregator sees a
        // disconnect if they all exit early.
        drop(result_tx);

        let outcome = aggregator.run();
        let cancelled = outcome == AggregateOutcome::Stopped;

        queue.push_stops(pool.len());
        self.stop.cancel();
        let summaries = pool.join();
        aggregator.drain();
        let leftover = queue.drain_jobs().len();

        let mut stats = aggregator.finish(cancelled);
        if outcome == AggregateOutcome::Disconnected {
            stats.errors.push(format!(
                "all agents exited with {} jobs unprocessed",
                stats.unprocessed()
            ));
            plog_warn!("All agents exited early; {} jobs left in queue", leftover);
        }
        for summary in &summaries {
            plog!(
                "{}: {} attempted, {} placed, {} failed",
                summary.agent_id,
                summary.attempted,
                summary.placed,
                summary.failed
            );
        }
        plog!(
            "Run {}: {}/{} placed, {} failed, {} unprocessed",
            if cancelled { "cancelled" } else { "finished" },
            stats.placed,
            stats.total,
            stats.failed,
            stats.unprocessed()
        );
        Ok(stats)
    }
}
