//! Result aggregation.
//!
//! The aggregator is the only consumer of the result channel and the only
//! writer of [`RunStats`], so the counters need no locking.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{select, Receiver};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::orchestration::pool::PlacementResult;
use crate::orchestration::queue::StopSignal;
use crate::{plog_debug, plog_warn};

/// Final counters for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: usize,
    pub processed: usize,
    pub placed: usize,
    pub failed: usize,
    /// Successful placements per agent. Every participating agent is present.
    pub per_agent_placed: BTreeMap<AgentId, usize>,
    pub per_agent_failed: BTreeMap<AgentId, usize>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
}

impl RunStats {
    pub fn new(total: usize, agents: &[AgentId]) -> Self {
        Self {
            total,
            processed: 0,
            placed: 0,
            failed: 0,
            per_agent_placed: agents.iter().map(|id| (id.clone(), 0)).collect(),
            per_agent_failed: BTreeMap::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            cancelled: false,
        }
    }

    /// `placed / total`, or 0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.placed as f64 / self.total as f64
        }
    }

    /// `placed / processed`, ignoring jobs never attempted.
    pub fn processed_success_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.placed as f64 / self.processed as f64
        }
    }

    pub fn unprocessed(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.ended_at
            .and_then(|end| (end - self.started_at).to_std().ok())
    }
}

/// Snapshot handed to progress observers after every result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub placed: usize,
    pub failed: usize,
    pub per_agent_placed: BTreeMap<AgentId, usize>,
}

pub type ProgressCallback = Box<dyn FnMut(&Progress) + Send>;

/// Why [`Aggregator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOutcome {
    /// Every job produced a result.
    Completed,
    /// The stop signal fired first.
    Stopped,
    /// All workers exited before every job was processed.
    Disconnected,
}

/// Lower bound for the stall warning interval.
pub const MIN_STALL_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Aggregator {
    stats: RunStats,
    results: Receiver<PlacementResult>,
    stop: StopSignal,
    stall_timeout: Duration,
    on_progress: Option<ProgressCallback>,
}

impl Aggregator {
    pub fn new(
        total: usize,
        agents: &[AgentId],
        results: Receiver<PlacementResult>,
        stop: StopSignal,
        stall_timeout: Duration,
    ) -> Self {
        Self {
            stats: RunStats::new(total, agents),
            results,
            stop,
            stall_timeout: stall_timeout.max(MIN_STALL_TIMEOUT),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: Option<ProgressCallback>) -> Self {
        self.on_progress = callback;
        self
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn stall_timeout(&self) -> Duration {
        self.stall_timeout
    }

    pub fn is_complete(&self) -> bool {
        self.stats.processed >= self.stats.total
    }

    /// Fold one result into the counters and notify the observer.
    pub fn record(&mut self, result: PlacementResult) {
        let stats = &mut self.stats;
        stats.processed += 1;
        if result.success {
            stats.placed += 1;
            *stats.per_agent_placed.entry(result.agent_id).or_insert(0) += 1;
        } else {
            stats.failed += 1;
            if let Some(error) = result.error {
                stats.errors.push(format!("{}: {}", result.agent_id, error));
            }
            *stats.per_agent_failed.entry(result.agent_id).or_insert(0) += 1;
        }

        if let Some(callback) = self.on_progress.as_mut() {
            let progress = Progress {
                current: stats.processed,
                total: stats.total,
                placed: stats.placed,
                failed: stats.failed,
                per_agent_placed: stats.per_agent_placed.clone(),
            };
            callback(&progress);
        }
    }

    /// Consume results until every job is accounted for or the run stops.
    ///
    /// A warning is logged each time no result arrives within the stall
    /// timeout; the run keeps waiting.
    pub fn run(&mut self) -> AggregateOutcome {
        while !self.is_complete() {
            if self.stop.is_cancelled() {
                return AggregateOutcome::Stopped;
            }
            select! {
                recv(self.results) -> msg => match msg {
                    Ok(result) => self.record(result),
                    Err(_) => return AggregateOutcome::Disconnected,
                },
                recv(self.stop.listener()) -> _ => return AggregateOutcome::Stopped,
                default(self.stall_timeout) => {
                    plog_warn!(
                        "No placement results for {:?} ({}/{} processed)",
                        self.stall_timeout,
                        self.stats.processed,
                        self.stats.total
                    );
                }
            }
        }
        AggregateOutcome::Completed
    }

    /// Record results that are already waiting without blocking.
    pub fn drain(&mut self) -> usize {
        let pending: Vec<PlacementResult> = self.results.try_iter().collect();
        let count = pending.len();
        for result in pending {
            self.record(result);
        }
        if count > 0 {
            plog_debug!("Drained {} in-flight results", count);
        }
        count
    }

    pub fn finish(mut self, cancelled: bool) -> RunStats {
        self.stats.cancelled = cancelled;
        self.stats.ended_at = Some(Utc::now());
        self.stats
    }
}
