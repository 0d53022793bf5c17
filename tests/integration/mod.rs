//! Integration test suite for placer.
//!
//! These tests drive the public API end to end: images on disk are
//! quantized, written as job files, and placed by a pool of in-process
//! agents that record every attempt.
//!
//! # Test Categories
//!
//! - `parallel_agents`: every job placed exactly once across the pool
//! - `rate_limit`: per-agent cooldown and run timing
//! - `cancellation`: stop signal, setup failures and agent faults
//! - `pipeline_e2e`: image → job file → run, plus roster config
//!
//! # CI Compatibility
//!
//! No agent here talks to a network target, and cooldowns are kept in the
//! tens of milliseconds with generous slack on timing assertions.

mod fixtures;

mod cancellation;
mod parallel_agents;
mod rate_limit;
