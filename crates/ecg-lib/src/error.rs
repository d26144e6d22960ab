//! Error types for loading, detection and derived metrics.
//!
//! Loader and orchestrator failures surface as [`EcgError`]. Failures inside the
//! report's sub-computations are [`MetricsError`] values that the report aggregator
//! turns into error markers instead of propagating.

use crate::detectors::DetectionMethod;
use std::path::PathBuf;
use thiserror::Error;

pub type EcgResult<T> = Result<T, EcgError>;

/// Top-level error returned by the public loading and processing operations.
#[derive(Debug, Error)]
pub enum EcgError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("lead index {index} out of range for {lead_count} lead(s)")]
    LeadIndex { index: i64, lead_count: usize },

    #[error("no ECG signal loaded; load a recording first")]
    NoSignal,

    #[error("detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("unknown plot kind '{0}' (expected overview, processed or hrv)")]
    UnknownPlotKind(String),
}

/// Malformed, empty or inconsistent input data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    #[error("lead count must be at least 1, got {0}")]
    InvalidLeadCount(usize),

    #[error("sampling rate must be a positive integer")]
    InvalidSamplingRate,

    #[error("unit scale must be finite, got {0}")]
    InvalidUnitScale(f64),

    #[error("input is empty")]
    Empty,

    #[error("{len} byte(s) hold no complete {lead_count}-lead frame")]
    NoCompleteFrame { len: usize, lead_count: usize },

    #[error("no numeric columns found")]
    NoNumericColumns,

    #[error("row {row} has {found} column(s), expected {expected}")]
    InconsistentRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("matrix has {matrix} lead(s) but context declares {context}")]
    LeadCountMismatch { matrix: usize, context: usize },

    #[error("malformed table: {0}")]
    Table(String),

    #[error("unknown input format '{0}' (expected auto, binary or tabular)")]
    UnknownFormat(String),
}

/// Beat-detection capability failure or inconsistent detector output.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectionError {
    #[error("unknown detection method '{0}'")]
    UnknownMethod(String),

    #[error("no detector registered for method '{0}'")]
    Unregistered(DetectionMethod),

    #[error("detector failed: {0}")]
    Capability(String),

    #[error("{series} has {found} sample(s), expected {expected}")]
    LengthMismatch {
        series: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("beat index {index} outside signal of {len} sample(s)")]
    BeatOutOfRange { index: usize, len: usize },

    #[error("beat indices not strictly increasing at position {position}")]
    NotIncreasing { position: usize },

    #[error("{series} contains non-finite values")]
    NonFinite { series: &'static str },
}

/// Failure of a derived-metric sub-computation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricsError {
    #[error("HRV capability failed: {0}")]
    Hrv(String),

    #[error("{0} is not finite")]
    NonFinite(&'static str),
}

impl MetricsError {
    /// Stable identifier used in report error markers.
    pub fn kind(&self) -> &'static str {
        match self {
            MetricsError::Hrv(_) => "hrv_capability",
            MetricsError::NonFinite(_) => "non_finite",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
