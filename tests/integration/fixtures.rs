//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Agents that record every placement attempt with its start time
//! - Providers that can refuse selected roster entries
//! - Job lists and small images written to temporary directories

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

use placer::agent::{AgentId, AgentProvider, AgentSpec, PlacementAgent};
use placer::orchestration::{AcquiredAgent, SchedulerConfig};
use placer::palette::{Palette, Rgb};
use placer::quantize::PlacementJob;
use placer::{Error, Result};

/// One recorded call to `place`.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub agent: AgentId,
    pub x: i32,
    pub y: i32,
    pub color: Rgb,
    pub at: Instant,
}

pub type AttemptLog = Arc<Mutex<Vec<Attempt>>>;

/// How a [`RecordingAgent`] responds to placements.
#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Succeed,
    /// Return `Ok(false)` on every n-th attempt.
    RejectEvery(u32),
    /// Return an error when placing at this x coordinate.
    ErrorAtX(i32),
    /// Panic when placing at this x coordinate.
    PanicAtX(i32),
}

pub struct RecordingAgent {
    id: AgentId,
    log: AttemptLog,
    behaviour: Behaviour,
    attempts: u32,
    released: Arc<Mutex<HashSet<AgentId>>>,
}

impl PlacementAgent for RecordingAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn place(&mut self, x: i32, y: i32, color: Rgb) -> Result<bool> {
        self.attempts += 1;
        self.log.lock().unwrap().push(Attempt {
            agent: self.id.clone(),
            x,
            y,
            color,
            at: Instant::now(),
        });
        match self.behaviour {
            Behaviour::Succeed => Ok(true),
            Behaviour::RejectEvery(n) => Ok(self.attempts % n != 0),
            Behaviour::ErrorAtX(bad) if bad == x => {
                Err(Error::Placement(format!("pixel ({}, {}) locked", x, y)))
            }
            Behaviour::PanicAtX(bad) if bad == x => panic!("agent crashed at {}", x),
            _ => Ok(true),
        }
    }

    fn release(&mut self) -> Result<()> {
        self.released.lock().unwrap().insert(self.id.clone());
        Ok(())
    }
}

/// Hands out [`RecordingAgent`]s sharing one attempt log.
pub struct RecordingProvider {
    pub log: AttemptLog,
    pub released: Arc<Mutex<HashSet<AgentId>>>,
    pub behaviour: Behaviour,
    /// Roster ids whose acquisition fails.
    pub refuse: HashSet<String>,
}

impl RecordingProvider {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            released: Arc::new(Mutex::new(HashSet::new())),
            behaviour,
            refuse: HashSet::new(),
        }
    }

    pub fn refusing(mut self, ids: &[&str]) -> Self {
        self.refuse = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.log.lock().unwrap().clone()
    }

    pub fn released(&self) -> HashSet<AgentId> {
        self.released.lock().unwrap().clone()
    }

    /// Acquire `n` agents named `agent-0..n` directly, bypassing the roster.
    pub fn agents(&self, n: usize, cooldown: Duration) -> Vec<AcquiredAgent> {
        specs(n)
            .iter()
            .map(|spec| AcquiredAgent::new(self.make(spec), cooldown))
            .collect()
    }

    fn make(&self, spec: &AgentSpec) -> Box<dyn PlacementAgent> {
        Box::new(RecordingAgent {
            id: spec.id.clone(),
            log: self.log.clone(),
            behaviour: self.behaviour,
            attempts: 0,
            released: self.released.clone(),
        })
    }
}

impl AgentProvider for RecordingProvider {
    fn acquire(&self, spec: &AgentSpec) -> Result<Box<dyn PlacementAgent>> {
        if self.refuse.contains(spec.id.as_str()) {
            return Err(Error::AgentAcquire {
                id: spec.id.clone(),
                reason: "session refused".to_string(),
            });
        }
        Ok(self.make(spec))
    }
}

pub fn specs(n: usize) -> Vec<AgentSpec> {
    (0..n).map(|i| AgentSpec::new(format!("agent-{}", i))).collect()
}

/// `n` distinct jobs laid out on a 10-wide grid.
pub fn grid_jobs(n: usize) -> Vec<PlacementJob> {
    (0..n as i32)
        .map(|i| PlacementJob {
            x: i % 10,
            y: i / 10,
            color: Rgb::new(0, 0, 0),
            source_rgb: [0, 0, 0],
        })
        .collect()
}

pub fn config_with_cooldown(cooldown: Duration) -> SchedulerConfig {
    SchedulerConfig {
        cooldown,
        stall_timeout: Duration::from_secs(5),
        offset: (0, 0),
    }
}

/// `[#FFFFFF, #FF0000, #00FF00, #0000FF]`: white and red unrestricted.
pub fn four_color_palette() -> Palette {
    Palette::from_hex(&["#FFFFFF", "#FF0000", "#00FF00", "#0000FF"]).unwrap()
}

/// Write `pixels` (row-major RGBA rows) as a PNG in `dir`.
pub fn write_png(dir: &Path, name: &str, rows: &[&[[u8; 4]]]) -> PathBuf {
    let height = rows.len() as u32;
    let width = rows.first().map(|r| r.len()).unwrap_or(0) as u32;
    let img = RgbaImage::from_fn(width, height, |x, y| Rgba(rows[y as usize][x as usize]));
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

/// The 2x2 image used throughout: red, blue / white, near-black.
pub fn scenario_png(dir: &TempDir) -> PathBuf {
    write_png(
        dir.path(),
        "scenario.png",
        &[
            &[[255, 0, 0, 255], [0, 0, 255, 255]],
            &[[255, 255, 255, 255], [10, 10, 10, 255]],
        ],
    )
}
