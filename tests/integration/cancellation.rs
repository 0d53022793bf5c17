//! Cancellation, setup failure and agent fault tests.

use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use placer::agent::AgentId;
use placer::orchestration::{Progress, RunReport, Scheduler};

use crate::fixtures::{config_with_cooldown, grid_jobs, specs, Behaviour, RecordingProvider};

/// Test: Stop during cooldown
/// Given 20 jobs, 2 agents and a 30s cooldown
/// When the stop signal fires after the first round
/// Then the run ends promptly, no agent places again, and the rest is unprocessed
#[test]
fn test_stop_signal_ends_run_during_cooldown() {
    let cooldown = Duration::from_secs(30);
    let provider = RecordingProvider::new(Behaviour::Succeed);
    let (tick_tx, tick_rx) = crossbeam_channel::unbounded();
    let scheduler = Scheduler::new(config_with_cooldown(cooldown)).with_progress(Box::new(
        move |p: &Progress| {
            let _ = tick_tx.send(p.current);
        },
    ));
    let stop = scheduler.stop_signal();
    let agents = provider.agents(2, cooldown);

    let runner = thread::spawn(move || scheduler.run(grid_jobs(20), agents));
    for _ in 0..2 {
        tick_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("first round should complete");
    }
    let cancelled_at = Instant::now();
    stop.cancel();
    let report = runner.join().unwrap();

    assert!(cancelled_at.elapsed() < Duration::from_secs(5));
    let stats = report.stats().unwrap();
    assert!(stats.cancelled);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.unprocessed(), 18);
    assert!(!report.is_success());
    assert_eq!(provider.attempts().len(), 2);
    assert_eq!(provider.released().len(), 2);
}

/// Test: Stop before any work
#[test]
fn test_stop_before_run_places_nothing() {
    let provider = RecordingProvider::new(Behaviour::Succeed);
    let scheduler = Scheduler::new(config_with_cooldown(Duration::ZERO));
    scheduler.stop_signal().cancel();
    let report = scheduler.run(grid_jobs(10), provider.agents(2, Duration::ZERO));
    let stats = report.stats().unwrap();
    assert!(stats.cancelled);
    assert!(stats.processed <= 2);
    assert_eq!(stats.processed, provider.attempts().len());
}

/// Test: CancellationToken bridges onto the stop signal
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_token_stops_async_run() {
    let cooldown = Duration::from_secs(30);
    let provider = RecordingProvider::new(Behaviour::Succeed);
    let cancel = CancellationToken::new();
    let run = tokio::spawn(
        Scheduler::new(config_with_cooldown(cooldown)).run_async(
            grid_jobs(6),
            provider.agents(3, cooldown),
            cancel.clone(),
        ),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    let report = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("run should stop after cancel")
        .unwrap()
        .unwrap();

    let stats = report.stats().unwrap();
    assert!(stats.cancelled);
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.unprocessed(), 3);
}

/// Test: Zero agents is a setup failure
#[test]
fn test_zero_agents_fails_setup() {
    let report = Scheduler::new(config_with_cooldown(Duration::ZERO)).run(grid_jobs(5), Vec::new());
    match report {
        RunReport::SetupFailed { error } => assert_eq!(error, "No agents available"),
        other => panic!("expected setup failure, got {:?}", other),
    }
}

/// Test: Every acquisition refused
#[test]
fn test_all_acquisitions_refused_fails_setup() {
    let provider = RecordingProvider::new(Behaviour::Succeed).refusing(&["agent-0", "agent-1"]);
    let report = Scheduler::new(config_with_cooldown(Duration::ZERO)).run_with_provider(
        grid_jobs(5),
        &provider,
        &specs(2),
    );
    assert!(report.error().is_some());
    assert!(provider.attempts().is_empty());
}

/// Test: A refused agent is skipped, the rest run
#[test]
fn test_partial_acquisition_continues() {
    let provider = RecordingProvider::new(Behaviour::Succeed).refusing(&["agent-1"]);
    let report = Scheduler::new(config_with_cooldown(Duration::ZERO)).run_with_provider(
        grid_jobs(6),
        &provider,
        &specs(3),
    );
    let stats = report.stats().unwrap();
    assert_eq!(stats.placed, 6);
    assert!(!stats.per_agent_placed.contains_key(&AgentId::from("agent-1")));
    assert_eq!(stats.per_agent_placed.len(), 2);
}

/// Test: A panicking agent produces a failed result and keeps working
#[test]
fn test_agent_panic_is_contained() {
    let provider = RecordingProvider::new(Behaviour::PanicAtX(3));
    let report = Scheduler::new(config_with_cooldown(Duration::ZERO))
        .run(grid_jobs(8), provider.agents(2, Duration::ZERO));
    let stats = report.stats().unwrap();
    assert_eq!(stats.processed, 8);
    assert_eq!(stats.failed, 1);
    assert!(stats.errors[0].contains("agent crashed at 3"));
    assert_eq!(provider.released().len(), 2);
}
