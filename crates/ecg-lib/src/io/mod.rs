pub mod binary;
pub mod tabular;

pub use binary::load_binary;
pub use tabular::load_tabular;

use crate::error::FormatError;
use crate::signal::{SampleMatrix, SamplingContext};
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Which decoder a file is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Binary,
    Tabular,
}

impl FileKind {
    /// `.csv` and `.txt` are tabular; every other extension (or none) is binary.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("txt") => {
                FileKind::Tabular
            }
            _ => FileKind::Binary,
        }
    }
}

/// Caller override for format dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatHint {
    #[default]
    Auto,
    Binary,
    Tabular,
}

impl FormatHint {
    pub fn resolve(self, path: &Path) -> FileKind {
        match self {
            FormatHint::Auto => FileKind::from_path(path),
            FormatHint::Binary => FileKind::Binary,
            FormatHint::Tabular => FileKind::Tabular,
        }
    }
}

impl FromStr for FormatHint {
    type Err = FormatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(FormatHint::Auto),
            "binary" | "bin" => Ok(FormatHint::Binary),
            "tabular" | "csv" => Ok(FormatHint::Tabular),
            _ => Err(FormatError::UnknownFormat(s.to_string())),
        }
    }
}

/// Parameters needed to decode a recording from disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    pub format: FormatHint,
    pub sampling_rate_hz: u32,
    /// Only used by the binary decoder.
    pub lead_count: usize,
    /// Only used by the binary decoder.
    pub uv_per_lsb: f64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            format: FormatHint::Auto,
            sampling_rate_hz: 200,
            lead_count: 3,
            uv_per_lsb: 1.0,
        }
    }
}

/// Pre-decoded numeric input.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixInput {
    /// Samples × leads.
    Rows(Vec<Vec<f64>>),
    /// A bare series, treated as one lead.
    Single(Vec<f64>),
}

impl From<Vec<Vec<f64>>> for MatrixInput {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        MatrixInput::Rows(rows)
    }
}

impl From<Vec<f64>> for MatrixInput {
    fn from(values: Vec<f64>) -> Self {
        MatrixInput::Single(values)
    }
}

/// Wrap already-decoded millivolt data with shape validation.
pub fn load_matrix(
    values: impl Into<MatrixInput>,
    sampling_rate_hz: u32,
) -> Result<(SampleMatrix, SamplingContext), FormatError> {
    let matrix = match values.into() {
        MatrixInput::Rows(rows) => SampleMatrix::from_rows(rows)?,
        MatrixInput::Single(values) => SampleMatrix::from_flat(values, 1)?,
    };
    let context =
        SamplingContext::new(sampling_rate_hz, matrix.lead_count(), tabular::TABULAR_UNIT_SCALE)?;
    Ok((matrix, context))
}

/// Read and decode a recording, routing by extension unless `options.format` overrides it.
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<(SampleMatrix, SamplingContext)> {
    let kind = options.format.resolve(path);
    let (matrix, context) = match kind {
        FileKind::Binary => {
            let bytes =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            load_binary(
                &bytes,
                options.lead_count,
                options.sampling_rate_hz,
                options.uv_per_lsb,
            )
            .with_context(|| format!("decoding binary recording {}", path.display()))?
        }
        FileKind::Tabular => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            load_tabular(&text, options.sampling_rate_hz)
                .with_context(|| format!("parsing table {}", path.display()))?
        }
    };
    info!(
        "loaded {} as {:?}: {} sample(s) x {} lead(s) at {} Hz",
        path.display(),
        kind,
        matrix.sample_count(),
        matrix.lead_count(),
        context.sampling_rate_hz
    );
    Ok((matrix, context))
}
