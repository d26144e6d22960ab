//! Session state: one loaded recording and at most one processed lead.
//!
//! A [`SignalStore`] is an ordinary owned value; callers hold one per session and pass it
//! into the orchestrator and report builder. It is not internally synchronised, so sharing
//! one across threads needs an outer lock such as `Mutex<SignalStore>`.

use crate::error::{EcgError, EcgResult, FormatError};
use crate::metrics::hrv::HrvAnalyzer;
use crate::pipeline::ProcessedBundle;
use crate::report::{build_report, Report};
use crate::signal::{SampleMatrix, SamplingContext, TimeSeries};
use log::debug;

#[derive(Debug, Clone)]
struct Recording {
    matrix: SampleMatrix,
    context: SamplingContext,
}

#[derive(Debug, Default)]
pub struct SignalStore {
    recording: Option<Recording>,
    processed: Option<ProcessedBundle>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active recording; any processed bundle from the old one is dropped.
    pub fn load(&mut self, matrix: SampleMatrix, context: SamplingContext) -> EcgResult<()> {
        if matrix.lead_count() != context.lead_count {
            return Err(FormatError::LeadCountMismatch {
                matrix: matrix.lead_count(),
                context: context.lead_count,
            }
            .into());
        }
        if self.processed.take().is_some() {
            debug!("reload invalidated the previously processed lead");
        }
        self.recording = Some(Recording { matrix, context });
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.recording.is_some()
    }

    pub fn matrix(&self) -> EcgResult<&SampleMatrix> {
        self.recording
            .as_ref()
            .map(|r| &r.matrix)
            .ok_or(EcgError::NoSignal)
    }

    pub fn context(&self) -> EcgResult<&SamplingContext> {
        self.recording
            .as_ref()
            .map(|r| &r.context)
            .ok_or(EcgError::NoSignal)
    }

    pub fn processed(&self) -> Option<&ProcessedBundle> {
        self.processed.as_ref()
    }

    /// Validate a caller-supplied (possibly negative) lead number.
    pub fn resolve_lead(&self, index: i64) -> EcgResult<usize> {
        let lead_count = self.context()?.lead_count;
        usize::try_from(index)
            .ok()
            .filter(|&i| i < lead_count)
            .ok_or(EcgError::LeadIndex { index, lead_count })
    }

    pub fn select_lead(&self, index: usize) -> EcgResult<Vec<f64>> {
        let matrix = self.matrix()?;
        matrix.lead(index).ok_or(EcgError::LeadIndex {
            index: i64::try_from(index).unwrap_or(i64::MAX),
            lead_count: matrix.lead_count(),
        })
    }

    /// The selected raw lead with its sampling rate.
    pub fn lead_series(&self, index: usize) -> EcgResult<TimeSeries> {
        let data = self.select_lead(index)?;
        Ok(TimeSeries {
            fs: self.context()?.fs(),
            data,
        })
    }

    /// Fresh report over the current recording and processed lead.
    pub fn report(&self, analyzer: &dyn HrvAnalyzer) -> EcgResult<Report> {
        let recording = self.recording.as_ref().ok_or(EcgError::NoSignal)?;
        build_report(
            &recording.matrix,
            &recording.context,
            self.processed.as_ref(),
            analyzer,
        )
    }

    pub(crate) fn set_processed(&mut self, bundle: ProcessedBundle) -> &ProcessedBundle {
        self.processed.insert(bundle)
    }

    pub(crate) fn clear_processed(&mut self) {
        self.processed = None;
    }
}
