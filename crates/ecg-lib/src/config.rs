use crate::detectors::DetectionMethod;
use crate::error::ConfigError;
use crate::io::{FormatHint, LoadOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Analysis defaults, optionally read from a TOML file. Every field may be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub sampling_rate_hz: u32,
    pub lead_count: usize,
    pub uv_per_lsb: f64,
    pub lead_index: i64,
    pub method: DetectionMethod,
    pub format: FormatHint,
    pub plot: PlotConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let load = LoadOptions::default();
        Self {
            sampling_rate_hz: load.sampling_rate_hz,
            lead_count: load.lead_count,
            uv_per_lsb: load.uv_per_lsb,
            lead_index: 0,
            method: DetectionMethod::Default,
            format: FormatHint::Auto,
            plot: PlotConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotConfig {
    /// Leading seconds of the overview and processed views embedded in a full analysis.
    pub duration_s: f64,
    /// Upper bound on points per line series.
    pub max_points: usize,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            duration_s: 30.0,
            max_points: 2048,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            format: self.format,
            sampling_rate_hz: self.sampling_rate_hz,
            lead_count: self.lead_count,
            uv_per_lsb: self.uv_per_lsb,
        }
    }
}
