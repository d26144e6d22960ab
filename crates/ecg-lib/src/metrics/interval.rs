use super::hrv::{HrvIndices, HrvReport};
use crate::error::MetricsError;
use crate::pipeline::ProcessedBundle;
use serde::{Deserialize, Serialize};

/// Interval-related figures for the whole processed lead: mean rate plus the HRV indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcgAnalysis {
    #[serde(rename = "ECG_Rate_Mean")]
    pub rate_mean: f64,
    #[serde(flatten)]
    pub hrv: HrvIndices,
}

/// Mean of the instantaneous rate, merged with whatever HRV indices were computed.
pub fn ecg_analysis(
    bundle: &ProcessedBundle,
    hrv: Option<&HrvReport>,
) -> Result<EcgAnalysis, MetricsError> {
    let rate = &bundle.instantaneous_rate;
    if rate.is_empty() {
        return Err(MetricsError::NonFinite("ECG_Rate_Mean"));
    }
    let rate_mean = rate.iter().sum::<f64>() / rate.len() as f64;
    if !rate_mean.is_finite() {
        return Err(MetricsError::NonFinite("ECG_Rate_Mean"));
    }
    Ok(EcgAnalysis {
        rate_mean,
        hrv: hrv.map(|r| r.indices.clone()).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectionMethod;

    fn bundle(rate: Vec<f64>) -> ProcessedBundle {
        ProcessedBundle {
            lead_index: 0,
            method: DetectionMethod::Default,
            cleaned_signal: vec![0.0; rate.len()],
            instantaneous_rate: rate,
            beat_indices: vec![],
        }
    }

    #[test]
    fn rate_mean_and_hrv_are_merged() {
        let report = HrvReport {
            indices: [("HRV_MeanNN".to_string(), 800.0)].into_iter().collect(),
            missing: vec![],
        };
        let analysis = ecg_analysis(&bundle(vec![70.0, 80.0, 75.0, 75.0]), Some(&report))
            .expect("analysis");
        assert_eq!(analysis.rate_mean, 75.0);
        let json = serde_json::to_value(&analysis).expect("json");
        assert_eq!(json["ECG_Rate_Mean"], serde_json::json!(75.0));
        assert_eq!(json["HRV_MeanNN"], serde_json::json!(800.0));
    }

    #[test]
    fn missing_hrv_leaves_rate_only() {
        let analysis = ecg_analysis(&bundle(vec![0.0; 8]), None).expect("analysis");
        assert_eq!(analysis.rate_mean, 0.0);
        assert!(analysis.hrv.is_empty());
    }

    #[test]
    fn empty_or_non_finite_rate_is_an_error() {
        assert_eq!(
            ecg_analysis(&bundle(vec![]), None),
            Err(MetricsError::NonFinite("ECG_Rate_Mean"))
        );
        assert_eq!(
            ecg_analysis(&bundle(vec![60.0, f64::NAN]), None),
            Err(MetricsError::NonFinite("ECG_Rate_Mean"))
        );
    }
}
