//! Agent pool: one worker thread per acquired agent.
//!
//! Each worker exclusively owns its [`PlacementAgent`] and runs the cycle
//! `Dequeuing → Placing → CoolingDown → Dequeuing …` until it receives a stop
//! sentinel or observes the run's [`StopSignal`], then releases its session.
//! The cooldown after every attempt, successful or not, is the remote target's
//! rate limit and is never shortened; a stop during cooldown ends the worker
//! instead of letting it place early.

use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{select, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentProvider, AgentSpec, PlacementAgent};
use crate::error::Result;
use crate::orchestration::queue::{JobQueue, Slot, StopSignal};
use crate::quantize::PlacementJob;
use crate::{plog, plog_debug, plog_error, plog_trace, plog_warn};

/// Outcome of one placement attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementResult {
    pub agent_id: AgentId,
    pub job: PlacementJob,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Dequeuing,
    Placing,
    CoolingDown,
    Draining,
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Dequeuing => write!(f, "dequeuing"),
            WorkerState::Placing => write!(f, "placing"),
            WorkerState::CoolingDown => write!(f, "cooling_down"),
            WorkerState::Draining => write!(f, "draining"),
            WorkerState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Per-worker tally returned when the thread exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub agent_id: AgentId,
    pub attempted: usize,
    pub placed: usize,
    pub failed: usize,
}

/// An agent whose session has been opened and is ready to work.
pub struct AcquiredAgent {
    pub agent: Box<dyn PlacementAgent>,
    pub cooldown: Duration,
}

impl AcquiredAgent {
    pub fn new(agent: Box<dyn PlacementAgent>, cooldown: Duration) -> Self {
        Self { agent, cooldown }
    }

    pub fn id(&self) -> &AgentId {
        self.agent.id()
    }
}

impl fmt::Debug for AcquiredAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquiredAgent")
            .field("id", self.id())
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "agent panicked".to_string()
    }
}

struct Worker {
    id: AgentId,
    agent: Box<dyn PlacementAgent>,
    cooldown: Duration,
    /// When the last placement attempt finished. Touched only by this thread.
    last_action: Option<Instant>,
    jobs: Receiver<Slot>,
    results: Sender<PlacementResult>,
    stop: StopSignal,
    state: WorkerState,
}

impl Worker {
    fn transition(&mut self, next: WorkerState) {
        plog_trace!("[{}] {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    fn run(mut self) -> WorkerSummary {
        let mut summary = WorkerSummary {
            agent_id: self.id.clone(),
            attempted: 0,
            placed: 0,
            failed: 0,
        };
        plog_debug!("[{}] worker started (cooldown {:?})", self.id, self.cooldown);

        loop {
            self.transition(WorkerState::Dequeuing);
            let Some(job) = self.next_job() else {
                break;
            };

            self.transition(WorkerState::Placing);
            let result = self.attempt(job);
            self.last_action = Some(Instant::now());
            summary.attempted += 1;
            if result.success {
                summary.placed += 1;
            } else {
                summary.failed += 1;
            }
            if self.results.send(result).is_err() {
                plog_warn!("[{}] result channel closed, stopping", self.id);
                break;
            }

            if self.stop.is_cancelled() {
                break;
            }
            self.transition(WorkerState::CoolingDown);
            if !self.cool_down() {
                break;
            }
        }

        self.transition(WorkerState::Draining);
        if let Err(e) = self.agent.release() {
            plog_warn!("[{}] failed to release session: {}", self.id, e);
        }
        self.transition(WorkerState::Terminated);
        plog!(
            "[{}] finished: {} placed, {} failed",
            self.id,
            summary.placed,
            summary.failed
        );
        summary
    }

    /// Block for the next job, or `None` on sentinel, stop or disconnect.
    fn next_job(&self) -> Option<PlacementJob> {
        if self.stop.is_cancelled() {
            return None;
        }
        let job = select! {
            recv(self.jobs) -> msg => match msg {
                Ok(Slot::Job(job)) => Some(job),
                Ok(Slot::Stop) | Err(_) => None,
            },
            recv(self.stop.listener()) -> _ => None,
        };
        // A stop that raced the dequeue wins; the job stays unprocessed.
        job.filter(|_| !self.stop.is_cancelled())
    }

    /// Run one placement, converting errors and panics into a failed result.
    fn attempt(&mut self, job: PlacementJob) -> PlacementResult {
        let agent = &mut self.agent;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| agent.place(job.x, job.y, job.color)));
        let (success, error) = match outcome {
            Ok(Ok(placed)) => (placed, None),
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(payload) => (false, Some(panic_message(payload.as_ref()))),
        };
        match &error {
            Some(e) => plog_debug!("[{}] ({}, {}) failed: {}", self.id, job.x, job.y, e),
            None => plog_trace!("[{}] ({}, {}) success={}", self.id, job.x, job.y, success),
        }
        PlacementResult {
            agent_id: self.id.clone(),
            job,
            success,
            error,
            timestamp: Utc::now(),
        }
    }

    /// Wait out the cooldown. Returns `false` if a stop arrived first.
    fn cool_down(&self) -> bool {
        let Some(last) = self.last_action else {
            return true;
        };
        let deadline = last + self.cooldown;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            select! {
                recv(self.stop.listener()) -> _ => return false,
                default(deadline - now) => {}
            }
        }
    }
}

/// Running set of worker threads.
pub struct AgentPool {
    workers: Vec<(AgentId, JoinHandle<WorkerSummary>)>,
}

impl AgentPool {
    /// Open a session for every active roster entry.
    ///
    /// Failed acquisitions and duplicate ids are logged and skipped; the
    /// caller decides whether an empty result is fatal.
    pub fn acquire(
        provider: &dyn AgentProvider,
        specs: &[AgentSpec],
        default_cooldown: Duration,
    ) -> Vec<AcquiredAgent> {
        let mut seen = HashSet::new();
        let mut acquired = Vec::new();
        for spec in specs.iter().filter(|s| s.active) {
            if !seen.insert(spec.id.clone()) {
                plog_warn!("Skipping duplicate agent {}", spec.id);
                continue;
            }
            match provider.acquire(spec) {
                Ok(agent) => {
                    acquired.push(AcquiredAgent::new(agent, spec.cooldown(default_cooldown)));
                }
                Err(e) => plog_warn!("Could not acquire agent {}: {}", spec.id, e),
            }
        }
        plog!(
            "Acquired {}/{} agents",
            acquired.len(),
            specs.iter().filter(|s| s.active).count()
        );
        acquired
    }

    /// Spawn one named thread per agent.
    ///
    /// # Errors
    ///
    /// If a thread cannot be spawned, the stop signal is raised, already
    /// running workers are joined, and the spawn error is returned.
    pub fn start(
        agents: Vec<AcquiredAgent>,
        queue: &JobQueue,
        results: &Sender<PlacementResult>,
        stop: &StopSignal,
    ) -> Result<Self> {
        let mut pool = Self {
            workers: Vec::with_capacity(agents.len()),
        };
        for acquired in agents {
            let id = acquired.id().clone();
            let worker = Worker {
                id: id.clone(),
                agent: acquired.agent,
                cooldown: acquired.cooldown,
                last_action: None,
                jobs: queue.receiver(),
                results: results.clone(),
                stop: stop.clone(),
                state: WorkerState::Idle,
            };
            let spawned = thread::Builder::new()
                .name(format!("agent-{}", id))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => pool.workers.push((id, handle)),
                Err(e) => {
                    plog_error!("Failed to spawn worker for {}: {}", id, e);
                    stop.cancel();
                    pool.join();
                    return Err(e.into());
                }
            }
        }
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.workers.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Wait for every worker to exit.
    pub fn join(self) -> Vec<WorkerSummary> {
        let mut summaries = Vec::with_capacity(self.workers.len());
        for (id, handle) in self.workers {
            match handle.join() {
                Ok(summary) => summaries.push(summary),
                Err(payload) => {
                    plog_error!("Worker {} panicked: {}", id, panic_message(payload.as_ref()));
                }
            }
        }
        summaries
    }
}
