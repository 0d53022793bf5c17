//! Placement agents.
//!
//! A [`PlacementAgent`] is one authenticated session against the remote
//! target. The scheduler only ever talks to this trait; how a placement is
//! physically executed lives behind it. Agents are obtained from an
//! [`AgentProvider`] and each one is owned by exactly one worker thread.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::palette::Rgb;
use crate::{plog, plog_debug, Error, Result};

/// Stable identity of an agent (e.g. the account username).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Roster entry describing an agent that may be acquired for a run.
///
/// Credentials live with the provider, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: AgentId,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub premium: bool,
    /// Overrides the scheduler's default cooldown for this agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl AgentSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(id),
            active: true,
            premium: false,
            cooldown_secs: None,
        }
    }

    pub fn premium(mut self, premium: bool) -> Self {
        self.premium = premium;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_secs = Some(cooldown.as_secs_f64());
        self
    }

    /// Effective cooldown, falling back to `default`.
    ///
    /// Negative or non-finite overrides are ignored.
    pub fn cooldown(&self, default: Duration) -> Duration {
        self.cooldown_secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(default)
    }
}

/// One session capable of placing pixels on the remote target.
pub trait PlacementAgent: Send {
    fn id(&self) -> &AgentId;

    /// Place `color` at `(x, y)`.
    ///
    /// `Ok(false)` means the target rejected the placement; `Err` means the
    /// attempt itself failed. Both are recorded as failed results.
    fn place(&mut self, x: i32, y: i32, color: Rgb) -> Result<bool>;

    /// Close the underlying session. Called once when the worker exits.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens sessions for roster entries.
pub trait AgentProvider {
    fn acquire(&self, spec: &AgentSpec) -> Result<Box<dyn PlacementAgent>>;
}

/// Agent that records placements in the log without contacting any target.
///
/// `fail_every = Some(n)` makes every n-th placement fail, which is useful for
/// exercising partial-failure reporting.
#[derive(Debug)]
pub struct DryRunAgent {
    id: AgentId,
    fail_every: Option<u32>,
    attempts: u32,
    released: bool,
}

impl DryRunAgent {
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            fail_every: None,
            attempts: 0,
            released: false,
        }
    }

    pub fn with_fail_every(mut self, n: Option<u32>) -> Self {
        self.fail_every = n.filter(|n| *n > 0);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl PlacementAgent for DryRunAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn place(&mut self, x: i32, y: i32, color: Rgb) -> Result<bool> {
        if self.released {
            return Err(Error::Placement(format!("{} already released", self.id)));
        }
        self.attempts += 1;
        if let Some(n) = self.fail_every {
            if self.attempts % n == 0 {
                return Err(Error::Placement(format!(
                    "simulated failure at ({}, {})",
                    x, y
                )));
            }
        }
        plog_debug!("[{}] place ({}, {}) {}", self.id, x, y, color);
        Ok(true)
    }

    fn release(&mut self) -> Result<()> {
        self.released = true;
        plog_debug!("[{}] session released after {} attempts", self.id, self.attempts);
        Ok(())
    }
}

/// Provider handing out [`DryRunAgent`]s.
#[derive(Debug, Default, Clone)]
pub struct DryRunProvider {
    pub fail_every: Option<u32>,
}

impl AgentProvider for DryRunProvider {
    fn acquire(&self, spec: &AgentSpec) -> Result<Box<dyn PlacementAgent>> {
        plog!("Dry-run session opened for {}", spec.id);
        Ok(Box::new(
            DryRunAgent::new(spec.id.clone()).with_fail_every(self.fail_every),
        ))
    }
}
