//! Renderer-agnostic figures for the overview, processed and HRV views.
//!
//! Figures only read from the [`SignalStore`]; turning them into pixels is left to a
//! [`PlotBackend`] such as the CLI's PNG renderer.

use crate::error::{EcgError, EcgResult, MetricsError};
use crate::metrics::hrv::{hrv, HrvAnalyzer, HrvReport};
use crate::metrics::rr::RRStatistics;
use crate::pipeline::ProcessedBundle;
use crate::signal::{RRSeries, SamplingContext, TimeSeries};
use crate::store::SignalStore;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NO_DATA_TITLE: &str = "No data available for plotting";
pub const HISTOGRAM_BINS: usize = 30;
pub const HRV_SUMMARY_TITLE: &str = "HRV Analysis Summary";

const ECG_COLOR: u32 = 0x1F77B4;
const PEAK_COLOR: u32 = 0xD62728;
const RATE_COLOR: u32 = 0x2CA02C;
const RR_COLOR: u32 = 0xFF0077;
const HIST_COLOR: u32 = 0xFFAA00;
const IDENTITY_COLOR: u32 = 0x7F7F7F;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        let [_, r, g, b] = self.0.to_be_bytes();
        (r, g, b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Unconnected markers, e.g. R-peak positions or Poincaré pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub radius: u32,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Scatter(ScatterSeries),
}

impl Series {
    pub fn name(&self) -> &str {
        match self {
            Series::Line(s) => &s.name,
            Series::Scatter(s) => &s.name,
        }
    }

    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(s) => &s.points,
            Series::Scatter(s) => &s.points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
    /// Free text lines drawn in place of a chart.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis::default(),
            y: Axis::default(),
            series: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_axes(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn is_placeholder(&self) -> bool {
        self.series.is_empty() && self.notes.is_empty()
    }

    /// Data bounds over every series as `(x_min, x_max, y_min, y_max)`.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        Some(points.fold(
            (first[0], first[0], first[1], first[1]),
            |(x0, x1, y0, y1), p| (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1])),
        ))
    }
}

/// Draws a stack of figures as one image.
pub trait PlotBackend {
    fn draw(&mut self, figures: &[Figure]) -> anyhow::Result<()>;
}

/// Figure with no series shown when there is nothing to plot.
pub fn placeholder_figure() -> Figure {
    Figure::new(Some(NO_DATA_TITLE.to_string()))
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if max_points == 0 || points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| (i as f64 * bucket_size).floor() as usize)
        .take_while(|&start| start < points.len())
        .map(|start| points[start])
        .collect()
}

fn line(name: &str, points: Vec<[f64; 2]>, width: f32, color: u32) -> Series {
    Series::Line(LineSeries {
        name: name.into(),
        points,
        style: Style {
            width,
            dash: None,
            color: Color(color),
        },
    })
}

pub fn figure_from_timeseries(
    title: &str,
    series: &TimeSeries,
    max_points: usize,
    color: u32,
) -> Figure {
    let dt = 1.0 / series.fs.max(1.0);
    let points: Vec<[f64; 2]> = series
        .data
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 * dt, *value])
        .collect();
    let mut fig = Figure::new(Some(title.into()));
    fig.add_series(line(title, decimate_points(&points, max_points), 1.4, color));
    fig
}

/// RR interval (ms) against beat number.
pub fn rr_tachogram_figure(rr: &RRSeries, max_points: usize) -> Figure {
    let points: Vec<[f64; 2]> = rr
        .rr_ms
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64, *value])
        .collect();
    let mut fig = Figure::new(Some("RR Intervals".to_string())).with_axes("Beat Number", "RR Interval (ms)");
    fig.add_series(line("RR", decimate_points(&points, max_points), 2.0, RR_COLOR));
    fig
}

/// Bin counts over `bins` equal-width bins, one point per bin centre.
pub fn rr_histogram_figure(rr: &RRSeries, bins: usize) -> Option<Figure> {
    if rr.is_empty() || bins == 0 {
        return None;
    }
    let min_rr = rr.rr_ms.iter().copied().fold(f64::INFINITY, f64::min);
    let max_rr = rr.rr_ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (bins, width) = if max_rr - min_rr < f64::EPSILON {
        (1, 1.0)
    } else {
        (bins, (max_rr - min_rr) / bins as f64)
    };
    let mut counts = vec![0usize; bins];
    for &value in &rr.rr_ms {
        let idx = (((value - min_rr) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let points: Vec<[f64; 2]> = counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let centre = if bins == 1 {
                min_rr
            } else {
                min_rr + width * (i as f64 + 0.5)
            };
            [centre, count as f64]
        })
        .collect();
    let mut fig = Figure::new(Some("RR Interval Distribution".to_string()))
        .with_axes("RR Interval (ms)", "Frequency");
    fig.add_series(line("RR distribution", points, 2.0, HIST_COLOR));
    Some(fig)
}

/// Successive RR pairs with the identity line.
pub fn poincare_figure(rr: &RRSeries) -> Figure {
    let pairs: Vec<[f64; 2]> = rr.rr_ms.windows(2).map(|w| [w[0], w[1]]).collect();
    let mut fig = Figure::new(Some("Poincaré Plot".to_string())).with_axes("RR(n) (ms)", "RR(n+1) (ms)");
    if !pairs.is_empty() {
        let lo = rr.rr_ms.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = rr.rr_ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        fig.add_series(line("identity", vec![[lo, lo], [hi, hi]], 1.0, IDENTITY_COLOR));
    }
    fig.add_series(Series::Scatter(ScatterSeries {
        name: "RR pairs".into(),
        points: pairs,
        radius: 3,
        color: Color(RR_COLOR),
    }));
    fig
}

/// Text panel with the headline HRV indices and RR figures.
pub fn hrv_summary_figure(report: &HrvReport, stats: &RRStatistics, total_beats: usize) -> Figure {
    let mut fig = Figure::new(Some(HRV_SUMMARY_TITLE.to_string()));
    for (key, label, unit) in [
        ("HRV_RMSSD", "RMSSD", " ms"),
        ("HRV_SDNN", "SDNN", " ms"),
        ("HRV_pNN50", "pNN50", "%"),
    ] {
        if let Some(value) = report.get(key) {
            fig.add_note(format!("{label}: {value:.2}{unit}"));
        }
    }
    fig.add_note(format!("Total Beats: {total_beats}"));
    fig.add_note(format!("Mean RR: {:.2} ms", stats.mean_rr));
    fig.add_note(format!("Std RR: {:.2} ms", stats.std_rr));
    fig
}

/// Single text panel replacing the HRV view when the capability fails.
pub fn hrv_error_figure(err: &MetricsError) -> Figure {
    let mut fig = Figure::new(None);
    fig.add_note(format!("HRV Analysis Error: {err}"));
    fig
}

fn processed_figures(
    bundle: &ProcessedBundle,
    fs: f64,
    duration_s: Option<f64>,
    max_points: usize,
) -> Vec<Figure> {
    let cleaned = bundle.cleaned_series(fs).truncated(duration_s);
    let mut ecg = figure_from_timeseries(
        &format!("Processed ECG - Lead {}", bundle.lead_index + 1),
        &cleaned,
        max_points,
        ECG_COLOR,
    )
    .with_axes("Time (s)", "Amplitude (mV)");
    let peaks: Vec<[f64; 2]> = bundle
        .beat_indices
        .iter()
        .filter(|&&b| b < cleaned.len())
        .map(|&b| [b as f64 / fs, cleaned.data[b]])
        .collect();
    ecg.add_series(Series::Scatter(ScatterSeries {
        name: "R-peaks".into(),
        points: peaks,
        radius: 4,
        color: Color(PEAK_COLOR),
    }));

    let rate = figure_from_timeseries(
        "Heart Rate",
        &bundle.rate_series(fs).truncated(duration_s),
        max_points,
        RATE_COLOR,
    )
    .with_axes("Time (s)", "Heart Rate (BPM)");
    vec![ecg, rate]
}

fn hrv_figures(
    bundle: &ProcessedBundle,
    context: &SamplingContext,
    analyzer: &dyn HrvAnalyzer,
    max_points: usize,
) -> Vec<Figure> {
    let fs = context.fs();
    let rr = bundle.rr_series(fs);
    if rr.is_empty() {
        return vec![placeholder_figure()];
    }
    let report = match hrv(bundle, context, analyzer) {
        Ok(report) => report,
        Err(e) => {
            warn!("HRV view failed: {e}");
            return vec![hrv_error_figure(&e)];
        }
    };
    let stats = RRStatistics::from_beats(&bundle.beat_indices, fs);
    let mut figures = vec![rr_tachogram_figure(&rr, max_points)];
    figures.extend(rr_histogram_figure(&rr, HISTOGRAM_BINS));
    figures.push(poincare_figure(&rr));
    figures.push(hrv_summary_figure(&report, &stats, bundle.beat_count()));
    figures
}

/// Which view to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotKind {
    Overview,
    Processed,
    Hrv,
}

impl PlotKind {
    pub const ALL: [PlotKind; 3] = [PlotKind::Overview, PlotKind::Processed, PlotKind::Hrv];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlotKind::Overview => "overview",
            PlotKind::Processed => "processed",
            PlotKind::Hrv => "hrv",
        }
    }

    /// Build the figures for this view. `duration_s` limits the time-based views to the
    /// leading seconds (`None` shows the whole recording); views that need a processed lead
    /// fall back to a placeholder. Leads are titled from 1.
    pub fn figures(
        &self,
        store: &SignalStore,
        lead_index: usize,
        duration_s: Option<f64>,
        max_points: usize,
        analyzer: &dyn HrvAnalyzer,
    ) -> EcgResult<Vec<Figure>> {
        let context = store.context()?;
        let fs = context.fs();
        match self {
            PlotKind::Overview => {
                let lead = store.lead_series(lead_index)?.truncated(duration_s);
                let fig = figure_from_timeseries(
                    &format!("ECG Signal - Lead {}", lead_index + 1),
                    &lead,
                    max_points,
                    ECG_COLOR,
                )
                .with_axes("Time (s)", "Amplitude (mV)");
                Ok(vec![fig])
            }
            PlotKind::Processed => Ok(match store.processed() {
                Some(bundle) => processed_figures(bundle, fs, duration_s, max_points),
                None => vec![placeholder_figure()],
            }),
            PlotKind::Hrv => Ok(match store.processed() {
                Some(bundle) => hrv_figures(bundle, context, analyzer, max_points),
                None => vec![placeholder_figure()],
            }),
        }
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlotKind {
    type Err = EcgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlotKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EcgError::UnknownPlotKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectionMethod;
    use crate::detectors::ecg::tests::synthetic_ecg;
    use crate::io::load_matrix;
    use crate::metrics::hrv::{HrvIndices, StandardHrv};
    use crate::pipeline::Orchestrator;

    fn store_with(samples: usize, fs: u32) -> SignalStore {
        let data: Vec<f64> = (0..samples).map(|i| (i as f64 * 0.01).sin()).collect();
        let (m, c) = load_matrix(data, fs).expect("matrix");
        let mut store = SignalStore::new();
        store.load(m, c).expect("load");
        store
    }

    fn processed_store() -> SignalStore {
        let lead = synthetic_ecg(250.0, &[0.8, 0.9, 0.85, 0.8, 0.95, 0.8, 0.82]);
        let (m, c) = load_matrix(lead, 250).expect("matrix");
        let mut store = SignalStore::new();
        store.load(m, c).expect("load");
        Orchestrator::default()
            .process(&mut store, 0, DetectionMethod::Default)
            .expect("process");
        store
    }

    #[test]
    fn decimate_limits_points() {
        let points: Vec<[f64; 2]> = (0..1000).map(|i| [i as f64, 0.0]).collect();
        let out = decimate_points(&points, 100);
        assert_eq!(out.len(), 100);
        assert_eq!(out[0], [0.0, 0.0]);
        assert_eq!(decimate_points(&points[..10], 100).len(), 10);
    }

    #[test]
    fn overview_respects_duration() {
        let store = store_with(5000, 100);
        let figs = PlotKind::Overview
            .figures(&store, 0, Some(30.0), 10_000, &StandardHrv::default())
            .expect("figures");
        assert_eq!(figs.len(), 1);
        let points = figs[0].series[0].points();
        assert_eq!(points.len(), 3000);
        assert!(points.last().is_some_and(|p| p[0] < 30.0));
        let all = PlotKind::Overview
            .figures(&store, 0, None, 10_000, &StandardHrv::default())
            .expect("figures");
        assert_eq!(all[0].series[0].points().len(), 5000);
    }

    #[test]
    fn overview_rejects_bad_lead() {
        let store = store_with(100, 100);
        assert!(matches!(
            PlotKind::Overview.figures(&store, 1, None, 100, &StandardHrv::default()),
            Err(EcgError::LeadIndex { .. })
        ));
        assert!(matches!(
            PlotKind::Overview.figures(&SignalStore::new(), 0, None, 100, &StandardHrv::default()),
            Err(EcgError::NoSignal)
        ));
    }

    #[test]
    fn unprocessed_views_are_placeholders() {
        let store = store_with(500, 100);
        for kind in [PlotKind::Processed, PlotKind::Hrv] {
            let figs = kind
                .figures(&store, 0, None, 100, &StandardHrv::default())
                .expect("figures");
            assert_eq!(figs, vec![placeholder_figure()]);
            assert!(figs[0].is_placeholder());
            assert_eq!(figs[0].title.as_deref(), Some(NO_DATA_TITLE));
        }
    }

    #[test]
    fn processed_view_marks_peaks() {
        let store = processed_store();
        let beats = store.processed().expect("bundle").beat_count();
        let figs = PlotKind::Processed
            .figures(&store, 0, None, 100_000, &StandardHrv::default())
            .expect("figures");
        assert_eq!(figs.len(), 2);
        let peaks = figs[0]
            .series
            .iter()
            .find(|s| s.name() == "R-peaks")
            .expect("peaks");
        assert_eq!(peaks.points().len(), beats);

        let short = PlotKind::Processed
            .figures(&store, 0, Some(1.0), 100_000, &StandardHrv::default())
            .expect("figures");
        let short_peaks = short[0].series.iter().find(|s| s.name() == "R-peaks").expect("peaks");
        assert_eq!(short_peaks.points().len(), 1);
        assert_eq!(short[1].series[0].points().len(), 250);
    }

    #[test]
    fn hrv_view_has_four_panels() {
        let store = processed_store();
        let figs = PlotKind::Hrv
            .figures(&store, 0, None, 1000, &StandardHrv::default())
            .expect("figures");
        assert_eq!(figs.len(), 4);
        let beats = store.processed().expect("bundle").beat_count();
        let rr_count = beats - 1;
        assert_eq!(figs[0].series[0].points().len(), rr_count);
        let total: f64 = figs[1].series[0].points().iter().map(|p| p[1]).sum();
        assert_eq!(total as usize, rr_count);
        assert_eq!(figs[1].series[0].points().len(), HISTOGRAM_BINS);
        assert!(figs[2].series.iter().any(|s| matches!(s, Series::Scatter(_))));

        let summary = &figs[3];
        assert_eq!(summary.title.as_deref(), Some(HRV_SUMMARY_TITLE));
        assert!(summary.series.is_empty());
        assert!(!summary.is_placeholder());
        for prefix in ["RMSSD: ", "SDNN: ", "pNN50: ", "Mean RR: ", "Std RR: "] {
            assert!(summary.notes.iter().any(|n| n.starts_with(prefix)), "{prefix}");
        }
        assert!(summary.notes.contains(&format!("Total Beats: {beats}")));
    }

    #[test]
    fn summary_figure_formats_indices() {
        let report = HrvReport {
            indices: [
                ("HRV_RMSSD".to_string(), 42.0),
                ("HRV_pNN50".to_string(), 12.5),
            ]
            .into_iter()
            .collect(),
            missing: vec!["HRV_SDNN".into()],
        };
        let stats = RRStatistics::from_beats(&[0, 200, 400], 250.0);
        let fig = hrv_summary_figure(&report, &stats, 3);
        assert_eq!(
            fig.notes,
            vec![
                "RMSSD: 42.00 ms",
                "pNN50: 12.50%",
                "Total Beats: 3",
                "Mean RR: 800.00 ms",
                "Std RR: 0.00 ms",
            ]
        );
    }

    struct Failing;

    impl HrvAnalyzer for Failing {
        fn analyze(&self, _beats: &[usize], _fs: f64) -> Result<HrvIndices, MetricsError> {
            Err(MetricsError::Hrv("tachogram too short".into()))
        }
    }

    #[test]
    fn hrv_failure_becomes_error_panel() {
        let store = processed_store();
        let figs = PlotKind::Hrv.figures(&store, 0, None, 1000, &Failing).expect("figures");
        assert_eq!(figs.len(), 1);
        assert_eq!(
            figs[0].notes,
            vec!["HRV Analysis Error: HRV capability failed: tachogram too short"]
        );
        assert!(!figs[0].is_placeholder());
    }

    #[test]
    fn lead_titles_count_from_one() {
        let store = processed_store();
        let overview = PlotKind::Overview
            .figures(&store, 0, None, 100, &StandardHrv::default())
            .expect("figures");
        assert_eq!(overview[0].title.as_deref(), Some("ECG Signal - Lead 1"));
        let processed = PlotKind::Processed
            .figures(&store, 0, None, 100, &StandardHrv::default())
            .expect("figures");
        assert_eq!(processed[0].title.as_deref(), Some("Processed ECG - Lead 1"));
    }

    #[test]
    fn histogram_of_constant_rr_is_one_bin() {
        let rr = RRSeries {
            rr_ms: vec![800.0; 5],
        };
        let fig = rr_histogram_figure(&rr, 30).expect("figure");
        assert_eq!(fig.series[0].points(), &[[800.0, 5.0]]);
        assert!(rr_histogram_figure(&RRSeries::default(), 30).is_none());
    }

    #[test]
    fn bounds_cover_all_series() {
        let mut fig = Figure::new(None);
        assert!(fig.bounds().is_none());
        fig.add_series(line("a", vec![[0.0, 1.0], [2.0, -1.0]], 1.0, 0));
        fig.add_series(line("b", vec![[5.0, 3.0]], 1.0, 0));
        assert_eq!(fig.bounds(), Some((0.0, 5.0, -1.0, 3.0)));
    }

    #[test]
    fn plot_kind_parses() {
        assert_eq!("HRV".parse::<PlotKind>().expect("kind"), PlotKind::Hrv);
        assert_eq!("overview".parse::<PlotKind>().expect("kind"), PlotKind::Overview);
        assert!(matches!(
            "spectrum".parse::<PlotKind>(),
            Err(EcgError::UnknownPlotKind(_))
        ));
        assert_eq!(Color(0x1F77B4).rgb(), (0x1F, 0x77, 0xB4));
    }
}
