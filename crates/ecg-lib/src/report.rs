use crate::error::{EcgResult, MetricsError};
use crate::metrics::hrv::{hrv, HrvAnalyzer, HrvReport};
use crate::metrics::interval::{ecg_analysis, EcgAnalysis};
use crate::metrics::rr::{arrhythmia_summary, ArrhythmiaSummary};
use crate::pipeline::ProcessedBundle;
use crate::signal::{SampleMatrix, SamplingContext};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub total_samples: usize,
    pub duration_seconds: f64,
    pub sampling_rate: u32,
    pub num_leads: usize,
}

impl FileInfo {
    pub fn new(matrix: &SampleMatrix, context: &SamplingContext) -> Self {
        let total_samples = matrix.sample_count();
        Self {
            total_samples,
            duration_seconds: context.duration_seconds(total_samples),
            sampling_rate: context.sampling_rate_hz,
            num_leads: matrix.lead_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub r_peaks_detected: usize,
    /// Beats per minute over the whole recording; 0 for a zero-length recording.
    pub average_heart_rate: f64,
}

impl ProcessingSummary {
    pub fn new(bundle: &ProcessedBundle, duration_seconds: f64) -> Self {
        let beats = bundle.beat_count();
        let average_heart_rate = if duration_seconds > 0.0 {
            beats as f64 * 60.0 / duration_seconds
        } else {
            0.0
        };
        Self {
            r_peaks_detected: beats,
            average_heart_rate,
        }
    }
}

/// Result of one isolated report section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Ok(T),
    Error { kind: String, message: String },
}

impl<T> Outcome<T> {
    pub fn from_result(section: &str, result: Result<T, MetricsError>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(e) => {
                warn!("{section} failed: {e}");
                Outcome::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            Outcome::Ok(value) => Some(value),
            Outcome::Error { .. } => None,
        }
    }
}

/// Consolidated view of one recording and its processed lead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub file_info: FileInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessingSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecg_analysis: Option<Outcome<EcgAnalysis>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrhythmia_detection: Option<Outcome<ArrhythmiaSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hrv_analysis: Option<Outcome<HrvReport>>,
}

/// Merge file info with the detection, interval, arrhythmia and HRV results.
///
/// Each derived section is computed independently; a failure in one becomes an
/// [`Outcome::Error`] in that section. Only a bundle that does not fit the matrix is an error.
pub fn build_report(
    matrix: &SampleMatrix,
    context: &SamplingContext,
    bundle: Option<&ProcessedBundle>,
    analyzer: &dyn HrvAnalyzer,
) -> EcgResult<Report> {
    let file_info = FileInfo::new(matrix, context);
    let Some(bundle) = bundle else {
        return Ok(Report {
            file_info,
            processing: None,
            ecg_analysis: None,
            arrhythmia_detection: None,
            hrv_analysis: None,
        });
    };
    bundle.validate_for(matrix.sample_count())?;

    let processing = ProcessingSummary::new(bundle, file_info.duration_seconds);
    let hrv_result = hrv(bundle, context, analyzer);
    let interval = ecg_analysis(bundle, hrv_result.as_ref().ok());
    Ok(processed_report(
        file_info,
        processing,
        interval,
        arrhythmia_summary(bundle, context),
        hrv_result,
    ))
}

fn processed_report(
    file_info: FileInfo,
    processing: ProcessingSummary,
    interval: Result<EcgAnalysis, MetricsError>,
    arrhythmia: Result<ArrhythmiaSummary, MetricsError>,
    hrv_result: Result<HrvReport, MetricsError>,
) -> Report {
    Report {
        file_info,
        processing: Some(processing),
        ecg_analysis: Some(Outcome::from_result("ECG analysis", interval)),
        arrhythmia_detection: Some(Outcome::from_result("arrhythmia detection", arrhythmia)),
        hrv_analysis: Some(Outcome::from_result("HRV analysis", hrv_result)),
    }
}
