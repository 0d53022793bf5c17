//! Rate-limit tests.
//!
//! Each agent must wait out its cooldown between consecutive attempts, and a
//! run's wall-clock time follows from the cooldown and pool size.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use placer::agent::AgentSpec;
use placer::orchestration::{estimate_duration, Scheduler};

use crate::fixtures::{config_with_cooldown, grid_jobs, Attempt, Behaviour, RecordingProvider};

fn by_agent(attempts: &[Attempt]) -> BTreeMap<String, Vec<Instant>> {
    let mut map: BTreeMap<String, Vec<Instant>> = BTreeMap::new();
    for a in attempts {
        map.entry(a.agent.to_string()).or_default().push(a.at);
    }
    for times in map.values_mut() {
        times.sort();
    }
    map
}

/// Test: Cooldown between consecutive attempts of one agent
#[test]
fn test_consecutive_attempts_respect_cooldown() {
    let cooldown = Duration::from_millis(80);
    let provider = RecordingProvider::new(Behaviour::RejectEvery(2));
    let report = Scheduler::new(config_with_cooldown(cooldown))
        .run(grid_jobs(9), provider.agents(3, cooldown));
    assert_eq!(report.stats().unwrap().processed, 9);

    for (agent, times) in by_agent(&provider.attempts()) {
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= cooldown, "{} placed again after {:?}", agent, gap);
        }
    }
}

/// Test: Failures still cost a cooldown
#[test]
fn test_errors_do_not_skip_cooldown() {
    let cooldown = Duration::from_millis(60);
    let provider = RecordingProvider::new(Behaviour::ErrorAtX(0));
    let report = Scheduler::new(config_with_cooldown(cooldown))
        .run(grid_jobs(3), provider.agents(1, cooldown));
    let stats = report.stats().unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.errors.len(), 1);

    let times = by_agent(&provider.attempts());
    let times = &times["agent-0"];
    assert_eq!(times.len(), 3);
    assert!(times[1] - times[0] >= cooldown);
}

/// Test: Run duration scenario
/// Given 5 jobs, 2 agents and cooldown d
/// When the scheduler runs
/// Then all 5 are placed in roughly ceil(5/2) rounds of d
#[test]
fn test_five_jobs_two_agents_duration() {
    let d = Duration::from_millis(200);
    let provider = RecordingProvider::new(Behaviour::Succeed);
    let started = Instant::now();
    let report = Scheduler::new(config_with_cooldown(d)).run(grid_jobs(5), provider.agents(2, d));
    let elapsed = started.elapsed();

    let stats = report.stats().unwrap();
    assert_eq!(stats.placed, 5);
    let estimate = estimate_duration(5, 2, d).unwrap();
    assert_eq!(estimate, 3 * d);
    // The busiest agent makes three attempts, two cooldowns apart.
    assert!(elapsed >= 2 * d, "finished too fast: {:?}", elapsed);
    assert!(
        elapsed < estimate + Duration::from_secs(2),
        "took {:?}",
        elapsed
    );
}

/// Test: Per-agent cooldown override from the roster
#[test]
fn test_roster_cooldown_override() {
    let slow = Duration::from_millis(150);
    let provider = RecordingProvider::new(Behaviour::Succeed);
    let roster = vec![
        AgentSpec::new("slow").with_cooldown(slow),
        AgentSpec::new("fast").with_cooldown(Duration::ZERO),
    ];
    let report = Scheduler::new(config_with_cooldown(Duration::from_secs(30)))
        .run_with_provider(grid_jobs(10), &provider, &roster);
    let stats = report.stats().unwrap();
    assert_eq!(stats.placed, 10);

    let times = by_agent(&provider.attempts());
    if let Some(slow_times) = times.get("slow") {
        for pair in slow_times.windows(2) {
            assert!(pair[1] - pair[0] >= slow);
        }
    }
    // The fast agent does most of the work while the slow one cools down.
    assert!(stats.per_agent_placed[&placer::agent::AgentId::from("fast")] >= 5);
}
