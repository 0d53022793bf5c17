use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::{AgentId, AgentSpec};
use crate::orchestration::scheduler::DEFAULT_COOLDOWN;
use crate::palette::{Palette, Subset};
use crate::quantize::{QuantizeOptions, DEFAULT_ALPHA_THRESHOLD, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH};
use crate::{plog_debug, Error, Result};

pub const DEFAULT_PIXEL_SIZE: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeSettings {
    pub max_width: u32,
    pub max_height: u32,
    pub unrestricted_only: bool,
    pub alpha_threshold: u8,
    pub skip_white: bool,
    /// Scale of the preview image.
    pub pixel_size: u32,
}

impl Default for QuantizeSettings {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            unrestricted_only: false,
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
            skip_white: true,
            pixel_size: DEFAULT_PIXEL_SIZE,
        }
    }
}

impl QuantizeSettings {
    pub fn options(&self) -> QuantizeOptions {
        QuantizeOptions {
            max_width: self.max_width,
            max_height: self.max_height,
            subset: if self.unrestricted_only {
                Subset::Unrestricted
            } else {
                Subset::Full
            },
            alpha_threshold: self.alpha_threshold,
            skip_white: self.skip_white,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub cooldown_secs: f64,
    pub stall_timeout_secs: u64,
    pub start_x: i32,
    pub start_y: i32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN.as_secs_f64(),
            stall_timeout_secs: 10,
            start_x: 0,
            start_y: 0,
        }
    }
}

impl SchedulerSettings {
    /// Default per-agent cooldown; invalid values fall back to 30s.
    pub fn cooldown(&self) -> Duration {
        if self.cooldown_secs.is_finite() && self.cooldown_secs >= 0.0 {
            Duration::from_secs_f64(self.cooldown_secs)
        } else {
            DEFAULT_COOLDOWN
        }
    }
}

/// Counts shown by `placer agents list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RosterSummary {
    pub total: usize,
    pub active: usize,
    pub premium: usize,
    pub free: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Ordered hex colors replacing the standard palette.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<String>>,
    #[serde(default)]
    pub quantize: QuantizeSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentSpec>,
}

impl Config {
    pub fn placer_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".placer"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::placer_dir()?.join("placer.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        plog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            plog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        plog_debug!(
            "Config loaded: {} agents, custom palette={}",
            config.agents.len(),
            config.palette.is_some()
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !dir.exists() {
                plog_debug!("Creating config directory {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        plog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// The configured palette, or the standard one.
    pub fn palette(&self) -> Result<Palette> {
        match &self.palette {
            Some(hex) => Palette::from_hex(hex.as_slice()),
            None => Ok(Palette::standard()),
        }
    }

    pub fn agent(&self, id: &AgentId) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| &a.id == id)
    }

    pub fn add_agent(&mut self, spec: AgentSpec) -> Result<()> {
        if self.agent(&spec.id).is_some() {
            return Err(Error::AgentExists { id: spec.id });
        }
        self.agents.push(spec);
        Ok(())
    }

    pub fn remove_agent(&mut self, id: &AgentId) -> Result<AgentSpec> {
        let pos = self
            .agents
            .iter()
            .position(|a| &a.id == id)
            .ok_or_else(|| Error::AgentNotFound { id: id.clone() })?;
        Ok(self.agents.remove(pos))
    }

    pub fn set_active(&mut self, id: &AgentId, active: bool) -> Result<()> {
        let spec = self
            .agents
            .iter_mut()
            .find(|a| &a.id == id)
            .ok_or_else(|| Error::AgentNotFound { id: id.clone() })?;
        spec.active = active;
        Ok(())
    }

    pub fn active_agents(&self) -> Vec<AgentSpec> {
        self.agents.iter().filter(|a| a.active).cloned().collect()
    }

    pub fn roster_summary(&self) -> RosterSummary {
        let premium = self.agents.iter().filter(|a| a.premium).count();
        RosterSummary {
            total: self.agents.len(),
            active: self.agents.iter().filter(|a| a.active).count(),
            premium,
            free: self.agents.len() - premium,
        }
    }
}
