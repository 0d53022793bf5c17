//! Job description file.
//!
//! The JSON hand-off between `placer quantize` and `placer run`. Loading a
//! saved file yields exactly the result that was saved.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::palette::{Palette, Rgb};
use crate::quantize::{PlacementJob, QuantizationResult};
use crate::{plog_debug, Error, Result};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFile {
    pub format_version: u32,
    /// Name of the image the jobs were derived from, if known.
    #[serde(default)]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Palette colors the jobs were matched against, in declared order.
    #[serde(default)]
    pub allowed_colors: Vec<Rgb>,
    #[serde(flatten)]
    pub result: QuantizationResult,
}

impl JobFile {
    /// Wrap `result`, recording the colors `palette` offered for its subset.
    pub fn from_result(
        result: QuantizationResult,
        palette: &Palette,
        source: Option<String>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            source,
            created_at: Utc::now(),
            allowed_colors: palette.subset(result.subset).to_vec(),
            result,
        }
    }

    pub fn jobs(&self) -> &[PlacementJob] {
        &self.result.jobs
    }

    pub fn into_jobs(self) -> Vec<PlacementJob> {
        self.result.jobs
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: Self = serde_json::from_str(json)?;
        if file.format_version > FORMAT_VERSION {
            return Err(Error::Validation(format!(
                "job file format {} is newer than supported {}",
                file.format_version, FORMAT_VERSION
            )));
        }
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        plog_debug!(
            "Saved {} jobs to {}",
            self.result.jobs.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = Self::from_json(&fs::read_to_string(path)?)?;
        plog_debug!(
            "Loaded {} jobs from {}",
            file.result.jobs.len(),
            path.display()
        );
        Ok(file)
    }
}
