use crate::error::MetricsError;
use crate::pipeline::ProcessedBundle;
use crate::signal::{RRSeries, SamplingContext};
use serde::{Deserialize, Serialize};

pub const BRADYCARDIA_BELOW_BPM: f64 = 60.0;
pub const TACHYCARDIA_ABOVE_BPM: f64 = 100.0;
pub const IRREGULAR_RR_STD_ABOVE_MS: f64 = 50.0;

/// RR-interval summary. `std_rr` is the population standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RRStatistics {
    pub rr_intervals_ms: Vec<f64>,
    pub mean_rr: f64,
    pub std_rr: f64,
    pub mean_hr: f64,
}

impl RRStatistics {
    /// Fewer than two beats gives all-zero statistics.
    pub fn from_beats(beat_indices: &[usize], fs: f64) -> Self {
        let rr = RRSeries::from_indices(beat_indices, fs);
        let Some(mean_rr) = rr.mean() else {
            return Self {
                rr_intervals_ms: Vec::new(),
                mean_rr: 0.0,
                std_rr: 0.0,
                mean_hr: 0.0,
            };
        };
        let var = rr.rr_ms.iter().map(|x| (x - mean_rr).powi(2)).sum::<f64>() / rr.len() as f64;
        let mean_hr = if mean_rr > 0.0 { 60_000.0 / mean_rr } else { 0.0 };
        Self {
            rr_intervals_ms: rr.rr_ms,
            mean_rr,
            std_rr: var.sqrt(),
            mean_hr,
        }
    }
}

pub fn rr_statistics(bundle: &ProcessedBundle, context: &SamplingContext) -> RRStatistics {
    RRStatistics::from_beats(&bundle.beat_indices, context.fs())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrhythmiaFlags {
    pub bradycardia: bool,
    pub tachycardia: bool,
    pub irregular_rhythm: bool,
}

pub fn classify_arrhythmia(stats: &RRStatistics) -> ArrhythmiaFlags {
    ArrhythmiaFlags {
        bradycardia: stats.mean_hr < BRADYCARDIA_BELOW_BPM,
        tachycardia: stats.mean_hr > TACHYCARDIA_ABOVE_BPM,
        irregular_rhythm: stats.std_rr > IRREGULAR_RR_STD_ABOVE_MS,
    }
}

/// RR-based rate figures plus the threshold flags, as carried in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrhythmiaSummary {
    pub mean_heart_rate: f64,
    pub mean_rr_interval: f64,
    pub rr_std: f64,
    pub total_beats: usize,
    #[serde(flatten)]
    pub flags: ArrhythmiaFlags,
}

impl ArrhythmiaSummary {
    /// Fails when any of the rate figures is NaN or infinite.
    pub fn from_statistics(
        stats: &RRStatistics,
        total_beats: usize,
    ) -> Result<Self, MetricsError> {
        for (name, value) in [
            ("mean_rr", stats.mean_rr),
            ("std_rr", stats.std_rr),
            ("mean_hr", stats.mean_hr),
        ] {
            if !value.is_finite() {
                return Err(MetricsError::NonFinite(name));
            }
        }
        Ok(Self {
            mean_heart_rate: stats.mean_hr,
            mean_rr_interval: stats.mean_rr,
            rr_std: stats.std_rr,
            total_beats,
            flags: classify_arrhythmia(stats),
        })
    }
}

pub fn arrhythmia_summary(
    bundle: &ProcessedBundle,
    context: &SamplingContext,
) -> Result<ArrhythmiaSummary, MetricsError> {
    let stats = rr_statistics(bundle, context);
    ArrhythmiaSummary::from_statistics(&stats, bundle.beat_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectionMethod;

    fn bundle(beats: Vec<usize>, len: usize) -> ProcessedBundle {
        ProcessedBundle {
            lead_index: 0,
            method: DetectionMethod::Default,
            cleaned_signal: vec![0.0; len],
            instantaneous_rate: vec![0.0; len],
            beat_indices: beats,
        }
    }

    fn ctx(fs: u32) -> SamplingContext {
        SamplingContext::new(fs, 1, 1000.0).expect("context")
    }

    #[test]
    fn slow_irregular_beats() {
        let stats = rr_statistics(&bundle(vec![100, 300, 700], 1000), &ctx(200));
        assert_eq!(stats.rr_intervals_ms, vec![1000.0, 2000.0]);
        assert_eq!(stats.mean_rr, 1500.0);
        assert_eq!(stats.std_rr, 500.0);
        assert_eq!(stats.mean_hr, 40.0);
        let flags = classify_arrhythmia(&stats);
        assert!(flags.bradycardia);
        assert!(!flags.tachycardia);
        assert!(flags.irregular_rhythm);
    }

    #[test]
    fn fewer_than_two_beats_is_degenerate() {
        for beats in [vec![], vec![42]] {
            let stats = rr_statistics(&bundle(beats, 100), &ctx(200));
            assert_eq!(stats.mean_hr, 0.0);
            assert_eq!(stats.mean_rr, 0.0);
            assert_eq!(stats.std_rr, 0.0);
            assert!(stats.rr_intervals_ms.is_empty());
            let flags = classify_arrhythmia(&stats);
            assert!(!flags.irregular_rhythm);
            assert!(!flags.tachycardia);
            // a zero rate is below the bradycardia threshold
            assert!(flags.bradycardia);
        }
    }

    #[test]
    fn fast_regular_beats() {
        // 0.5 s spacing at 250 Hz -> 120 bpm, no spread.
        let beats: Vec<usize> = (0..10).map(|i| 10 + i * 125).collect();
        let summary = arrhythmia_summary(&bundle(beats, 1300), &ctx(250)).expect("summary");
        assert_eq!(summary.mean_heart_rate, 120.0);
        assert_eq!(summary.rr_std, 0.0);
        assert_eq!(summary.total_beats, 10);
        assert_eq!(
            summary.flags,
            ArrhythmiaFlags {
                bradycardia: false,
                tachycardia: true,
                irregular_rhythm: false
            }
        );
    }

    #[test]
    fn thresholds_are_strict() {
        let at = |mean_hr: f64, std_rr: f64| RRStatistics {
            rr_intervals_ms: vec![],
            mean_rr: 0.0,
            std_rr,
            mean_hr,
        };
        let flags = classify_arrhythmia(&at(60.0, 50.0));
        assert!(!flags.bradycardia && !flags.irregular_rhythm);
        assert!(!classify_arrhythmia(&at(100.0, 0.0)).tachycardia);
    }

    #[test]
    fn non_finite_statistics_are_rejected() {
        let stats = RRStatistics {
            rr_intervals_ms: vec![800.0, f64::INFINITY],
            mean_rr: f64::INFINITY,
            std_rr: f64::NAN,
            mean_hr: 0.0,
        };
        assert_eq!(
            ArrhythmiaSummary::from_statistics(&stats, 3),
            Err(MetricsError::NonFinite("mean_rr"))
        );
        let stats = RRStatistics {
            mean_rr: 800.0,
            ..stats
        };
        let err = ArrhythmiaSummary::from_statistics(&stats, 3).unwrap_err();
        assert_eq!(err, MetricsError::NonFinite("std_rr"));
        assert_eq!(err.kind(), "non_finite");
    }

    #[test]
    fn summary_serializes_flat() {
        let summary = arrhythmia_summary(&bundle(vec![0, 200], 400), &ctx(200)).expect("summary");
        let value = serde_json::to_value(&summary).expect("json");
        assert_eq!(value["bradycardia"], serde_json::json!(false));
        assert_eq!(value["mean_heart_rate"], serde_json::json!(60.0));
        assert_eq!(value["total_beats"], serde_json::json!(2));
    }
}
