pub mod ecg;

use crate::error::DetectionError;
use ecg::{AdaptiveDetector, EcgPipelineConfig, LocalMaximaDetector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Closed set of supported R-peak detection variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// General-purpose adaptive detector with a local-maxima fallback.
    #[default]
    #[serde(alias = "neurokit")]
    Default,
    PanTompkins,
    #[serde(alias = "hamilton2002")]
    Hamilton,
    #[serde(rename = "localmax")]
    LocalMaxima,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 4] = [
        DetectionMethod::Default,
        DetectionMethod::PanTompkins,
        DetectionMethod::Hamilton,
        DetectionMethod::LocalMaxima,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Default => "default",
            DetectionMethod::PanTompkins => "pantompkins",
            DetectionMethod::Hamilton => "hamilton",
            DetectionMethod::LocalMaxima => "localmax",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "neurokit" => Ok(DetectionMethod::Default),
            "pantompkins" | "pantompkins1985" => Ok(DetectionMethod::PanTompkins),
            "hamilton" | "hamilton2002" => Ok(DetectionMethod::Hamilton),
            "localmax" => Ok(DetectionMethod::LocalMaxima),
            _ => Err(DetectionError::UnknownMethod(s.to_string())),
        }
    }
}

/// Raw detector result before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorOutput {
    pub cleaned: Vec<f64>,
    pub beats: Vec<usize>,
    pub rate: Vec<f64>,
}

/// Beat-detection capability: one lead in, cleaned signal + beats + rate out.
pub trait BeatDetector: Send + Sync {
    fn detect(&self, lead: &[f64], fs: f64) -> Result<DetectorOutput, DetectionError>;
}

/// Maps each [`DetectionMethod`] to the detector that implements it.
pub struct DetectorRegistry {
    detectors: HashMap<DetectionMethod, Box<dyn BeatDetector>>,
}

impl DetectorRegistry {
    pub fn empty() -> Self {
        Self {
            detectors: HashMap::new(),
        }
    }

    /// Registry with the built-in detector for every method.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(
            DetectionMethod::Default,
            AdaptiveDetector::new(EcgPipelineConfig::default()),
        );
        registry.register(
            DetectionMethod::PanTompkins,
            AdaptiveDetector::new(EcgPipelineConfig::pan_tompkins()),
        );
        registry.register(
            DetectionMethod::Hamilton,
            AdaptiveDetector::new(EcgPipelineConfig::hamilton()),
        );
        registry.register(
            DetectionMethod::LocalMaxima,
            LocalMaximaDetector::new(EcgPipelineConfig::default()),
        );
        registry
    }

    /// Install or replace the detector for `method`.
    pub fn register(&mut self, method: DetectionMethod, detector: impl BeatDetector + 'static) {
        self.detectors.insert(method, Box::new(detector));
    }

    pub fn get(&self, method: DetectionMethod) -> Result<&dyn BeatDetector, DetectionError> {
        self.detectors
            .get(&method)
            .map(|d| d.as_ref())
            .ok_or(DetectionError::Unregistered(method))
    }

    pub fn methods(&self) -> Vec<DetectionMethod> {
        let mut methods: Vec<_> = self.detectors.keys().copied().collect();
        methods.sort_by_key(|m| m.as_str());
        methods
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
