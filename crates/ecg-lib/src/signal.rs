use crate::error::FormatError;
use serde::{Deserialize, Serialize};

/// Basic typed time series for a single lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }

    /// Keep at most `seconds` of leading samples.
    pub fn truncated(&self, seconds: Option<f64>) -> TimeSeries {
        let keep = match seconds {
            Some(s) if s > 0.0 => ((s * self.fs) as usize).min(self.data.len()),
            _ => self.data.len(),
        };
        TimeSeries {
            fs: self.fs,
            data: self.data[..keep].to_vec(),
        }
    }
}

/// Multi-lead recording in millivolts, stored row-major (one row per sample instant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMatrix {
    lead_count: usize,
    data: Vec<f64>,
}

impl SampleMatrix {
    /// Build from a flat row-major buffer whose length must be a multiple of `lead_count`.
    pub fn from_flat(data: Vec<f64>, lead_count: usize) -> Result<Self, FormatError> {
        if lead_count == 0 {
            return Err(FormatError::InvalidLeadCount(lead_count));
        }
        if data.is_empty() {
            return Err(FormatError::Empty);
        }
        if data.len() % lead_count != 0 {
            return Err(FormatError::InconsistentRow {
                row: data.len() / lead_count,
                expected: lead_count,
                found: data.len() % lead_count,
            });
        }
        Ok(Self { lead_count, data })
    }

    /// Build from explicit rows; every row must have the width of the first.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, FormatError> {
        let lead_count = rows.first().map(Vec::len).ok_or(FormatError::Empty)?;
        if lead_count == 0 {
            return Err(FormatError::NoNumericColumns);
        }
        let mut data = Vec::with_capacity(rows.len() * lead_count);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != lead_count {
                return Err(FormatError::InconsistentRow {
                    row,
                    expected: lead_count,
                    found: values.len(),
                });
            }
            data.extend(values);
        }
        Self::from_flat(data, lead_count)
    }

    pub fn lead_count(&self) -> usize {
        self.lead_count
    }

    pub fn sample_count(&self) -> usize {
        self.data.len() / self.lead_count
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.lead_count)?;
        self.data.get(start..start + self.lead_count)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.lead_count)
    }

    /// Copy one lead out as a contiguous series, `None` when out of range.
    pub fn lead(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.lead_count {
            return None;
        }
        Some(self.rows().map(|row| row[index]).collect())
    }
}

/// Sampling metadata fixed at load time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingContext {
    pub sampling_rate_hz: u32,
    pub lead_count: usize,
    /// Device units to millivolts multiplier numerator (µV per LSB); 1000 means already mV.
    pub unit_scale: f64,
}

impl SamplingContext {
    pub fn new(sampling_rate_hz: u32, lead_count: usize, unit_scale: f64) -> Result<Self, FormatError> {
        if sampling_rate_hz == 0 {
            return Err(FormatError::InvalidSamplingRate);
        }
        if lead_count == 0 {
            return Err(FormatError::InvalidLeadCount(lead_count));
        }
        if !unit_scale.is_finite() {
            return Err(FormatError::InvalidUnitScale(unit_scale));
        }
        Ok(Self {
            sampling_rate_hz,
            lead_count,
            unit_scale,
        })
    }

    pub fn fs(&self) -> f64 {
        self.sampling_rate_hz as f64
    }

    pub fn duration_seconds(&self, samples: usize) -> f64 {
        samples as f64 / self.fs()
    }
}

/// RR intervals in milliseconds derived from consecutive beat positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr_ms: Vec<f64>,
}

impl RRSeries {
    pub fn from_indices(indices: &[usize], fs: f64) -> Self {
        let rr_ms = indices
            .windows(2)
            .map(|w| 1000.0 * (w[1] as f64 - w[0] as f64) / fs)
            .collect();
        Self { rr_ms }
    }

    pub fn len(&self) -> usize {
        self.rr_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr_ms.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.rr_ms.is_empty() {
            return None;
        }
        Some(self.rr_ms.iter().sum::<f64>() / self.rr_ms.len() as f64)
    }
}
