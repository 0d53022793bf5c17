//! Parallel execution correctness tests.
//!
//! These tests verify that the pool distributes work without losing or
//! duplicating jobs, whatever the agents report.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use placer::orchestration::{Progress, Scheduler};

use crate::fixtures::{config_with_cooldown, grid_jobs, specs, Behaviour, RecordingProvider};

/// Test: Completeness - 100 jobs over 4 agents
/// Given 100 distinct jobs and 4 agents without cooldown
/// When the scheduler runs to completion
/// Then every job is attempted exactly once and placed + failed == total
#[test]
fn test_every_job_attempted_exactly_once() {
    let provider = RecordingProvider::new(Behaviour::Succeed);
    let report = Scheduler::new(config_with_cooldown(Duration::ZERO))
        .run(grid_jobs(100), provider.agents(4, Duration::ZERO));

    let stats = report.stats().expect("run should start");
    assert_eq!(stats.placed + stats.failed, 100);
    assert_eq!(stats.processed, 100);
    assert!(report.is_success());

    let attempts = provider.attempts();
    assert_eq!(attempts.len(), 100);
    let coords: HashSet<(i32, i32)> = attempts.iter().map(|a| (a.x, a.y)).collect();
    assert_eq!(coords.len(), 100, "a job was placed twice");
}

/// Test: Per-agent accounting matches the attempt log
#[test]
fn test_per_agent_counts_match_attempts() {
    let provider = RecordingProvider::new(Behaviour::Succeed);
    let report = Scheduler::new(config_with_cooldown(Duration::ZERO))
        .run(grid_jobs(40), provider.agents(3, Duration::ZERO));
    let stats = report.stats().unwrap();

    for (agent, placed) in &stats.per_agent_placed {
        let logged = provider
            .attempts()
            .iter()
            .filter(|a| &a.agent == agent)
            .count();
        assert_eq!(*placed, logged, "mismatch for {}", agent);
    }
    assert_eq!(stats.per_agent_placed.len(), 3);
    assert_eq!(stats.per_agent_placed.values().sum::<usize>(), 40);
}

/// Test: Rejections and errors are results, not aborts
/// Given agents that reject every third placement
/// When 30 jobs run
/// Then all 30 are processed and failures are tallied per agent
#[test]
fn test_rejections_counted_as_failures() {
    let provider = RecordingProvider::new(Behaviour::RejectEvery(3));
    let report = Scheduler::new(config_with_cooldown(Duration::ZERO))
        .run(grid_jobs(30), provider.agents(2, Duration::ZERO));
    let stats = report.stats().unwrap();

    assert_eq!(stats.processed, 30);
    assert_eq!(stats.placed + stats.failed, 30);
    assert!(stats.failed >= 8, "expected roughly a third rejected, got {}", stats.failed);
    assert_eq!(
        stats.per_agent_failed.values().sum::<usize>(),
        stats.failed
    );
    // Rejections carry no error message.
    assert!(stats.errors.is_empty());
    assert!(!report.is_success());
}

/// Test: Progress callback fires once per result, in order
#[test]
fn test_progress_reported_for_every_result() {
    let seen: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let provider = RecordingProvider::new(Behaviour::Succeed);
    let report = Scheduler::new(config_with_cooldown(Duration::ZERO))
        .with_progress(Box::new(move |p: &Progress| sink.lock().unwrap().push(p.clone())))
        .run(grid_jobs(12), provider.agents(3, Duration::ZERO));
    assert!(report.is_success());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 12);
    for (i, p) in seen.iter().enumerate() {
        assert_eq!(p.current, i + 1);
        assert_eq!(p.total, 12);
        assert_eq!(p.placed + p.failed, p.current);
    }
    assert_eq!(seen.last().unwrap().per_agent_placed.values().sum::<usize>(), 12);
}

/// Test: Every worker releases its session
#[test]
fn test_all_sessions_released_after_run() {
    let provider = RecordingProvider::new(Behaviour::Succeed);
    let roster = specs(4);
    let report = Scheduler::new(config_with_cooldown(Duration::ZERO)).run_with_provider(
        grid_jobs(8),
        &provider,
        &roster,
    );
    assert!(report.is_success());
    let released = provider.released();
    for spec in &roster {
        assert!(released.contains(&spec.id), "{} not released", spec.id);
    }
}

/// Test: More agents than jobs
/// Given 2 jobs and 5 agents
/// When the scheduler runs
/// Then both jobs are placed and idle agents still shut down
#[test]
fn test_more_agents_than_jobs() {
    let provider = RecordingProvider::new(Behaviour::Succeed);
    let report = Scheduler::new(config_with_cooldown(Duration::ZERO))
        .run(grid_jobs(2), provider.agents(5, Duration::ZERO));
    let stats = report.stats().unwrap();
    assert_eq!(stats.placed, 2);
    assert_eq!(stats.per_agent_placed.len(), 5);
    assert_eq!(provider.released().len(), 5);
}
