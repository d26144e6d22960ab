use crate::detectors::{DetectionMethod, DetectorRegistry};
use crate::error::{DetectionError, EcgResult};
use crate::signal::{RRSeries, TimeSeries};
use crate::store::SignalStore;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Cleaned lead, per-sample heart rate and beat positions from one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedBundle {
    pub lead_index: usize,
    pub method: DetectionMethod,
    pub cleaned_signal: Vec<f64>,
    pub instantaneous_rate: Vec<f64>,
    pub beat_indices: Vec<usize>,
}

impl ProcessedBundle {
    pub fn len(&self) -> usize {
        self.cleaned_signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cleaned_signal.is_empty()
    }

    pub fn beat_count(&self) -> usize {
        self.beat_indices.len()
    }

    pub fn rr_series(&self, fs: f64) -> RRSeries {
        RRSeries::from_indices(&self.beat_indices, fs)
    }

    pub fn cleaned_series(&self, fs: f64) -> TimeSeries {
        TimeSeries {
            fs,
            data: self.cleaned_signal.clone(),
        }
    }

    pub fn rate_series(&self, fs: f64) -> TimeSeries {
        TimeSeries {
            fs,
            data: self.instantaneous_rate.clone(),
        }
    }

    /// Check length alignment, finiteness and beat ordering/range.
    pub fn validate(&self) -> Result<(), DetectionError> {
        let len = self.cleaned_signal.len();
        if self.instantaneous_rate.len() != len {
            return Err(DetectionError::LengthMismatch {
                series: "instantaneous_rate",
                expected: len,
                found: self.instantaneous_rate.len(),
            });
        }
        if !self.cleaned_signal.iter().all(|v| v.is_finite()) {
            return Err(DetectionError::NonFinite {
                series: "cleaned_signal",
            });
        }
        if !self.instantaneous_rate.iter().all(|v| v.is_finite()) {
            return Err(DetectionError::NonFinite {
                series: "instantaneous_rate",
            });
        }
        for (position, w) in self.beat_indices.windows(2).enumerate() {
            if w[1] <= w[0] {
                return Err(DetectionError::NotIncreasing {
                    position: position + 1,
                });
            }
        }
        if let Some(&index) = self.beat_indices.iter().find(|&&b| b >= len) {
            return Err(DetectionError::BeatOutOfRange { index, len });
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus a check against the source lead length.
    pub fn validate_for(&self, expected_len: usize) -> Result<(), DetectionError> {
        if self.cleaned_signal.len() != expected_len {
            return Err(DetectionError::LengthMismatch {
                series: "cleaned_signal",
                expected: expected_len,
                found: self.cleaned_signal.len(),
            });
        }
        self.validate()
    }
}

/// Runs the registered beat detector for a lead and stores the validated result.
#[derive(Default)]
pub struct Orchestrator {
    registry: DetectorRegistry,
}

impl Orchestrator {
    pub fn new(registry: DetectorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    /// Detect beats on `lead_index` with `method`, replacing the store's processed bundle.
    ///
    /// Every call re-runs detection. On failure the store is left without a bundle.
    pub fn process<'s>(
        &self,
        store: &'s mut SignalStore,
        lead_index: usize,
        method: DetectionMethod,
    ) -> EcgResult<&'s ProcessedBundle> {
        store.clear_processed();
        let lead = store.select_lead(lead_index)?;
        let fs = store.context()?.fs();
        let detector = self.registry.get(method)?;

        let output = detector.detect(&lead, fs).map_err(|e| {
            warn!("{method} detector failed on lead {lead_index}: {e}");
            e
        })?;
        let bundle = ProcessedBundle {
            lead_index,
            method,
            cleaned_signal: output.cleaned,
            instantaneous_rate: output.rate,
            beat_indices: output.beats,
        };
        if let Err(e) = bundle.validate_for(lead.len()) {
            warn!("{method} detector returned inconsistent output: {e}");
            return Err(e.into());
        }

        info!(
            "{method} detector found {} beat(s) on lead {lead_index} ({} samples)",
            bundle.beat_count(),
            bundle.len()
        );
        Ok(store.set_processed(bundle))
    }
}
