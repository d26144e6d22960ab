use crate::error::MetricsError;
use crate::pipeline::ProcessedBundle;
use crate::signal::{RRSeries, SamplingContext};
use log::warn;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Named HRV index → value.
pub type HrvIndices = BTreeMap<String, f64>;

/// Keys a report reader can rely on; any the capability leaves out are listed as missing.
pub const EXPECTED_HRV_KEYS: [&str; 4] = ["HRV_MeanNN", "HRV_SDNN", "HRV_RMSSD", "HRV_pNN50"];

const VLF_BAND: (f64, f64) = (0.0033, 0.04);
const LF_BAND: (f64, f64) = (0.04, 0.15);
const HF_BAND: (f64, f64) = (0.15, 0.4);
const MIN_PSD_SAMPLES: usize = 16;
const DFA_MIN_WINDOW: usize = 4;
const DFA_MAX_WINDOW: usize = 16;

/// HRV capability: beat positions in, named indices out.
pub trait HrvAnalyzer: Send + Sync {
    fn analyze(&self, beat_indices: &[usize], fs: f64) -> Result<HrvIndices, MetricsError>;
}

/// Built-in time, frequency and non-linear HRV indices over RR intervals in ms.
#[derive(Debug, Clone, Copy)]
pub struct StandardHrv {
    /// Resampling rate of the RR tachogram for the PSD (Hz).
    pub interp_fs: f64,
    /// Below this many beats the result is empty.
    pub min_beats: usize,
}

impl Default for StandardHrv {
    fn default() -> Self {
        Self {
            interp_fs: 4.0,
            min_beats: 3,
        }
    }
}

impl HrvAnalyzer for StandardHrv {
    fn analyze(&self, beat_indices: &[usize], fs: f64) -> Result<HrvIndices, MetricsError> {
        let mut out = HrvIndices::new();
        if beat_indices.len() < self.min_beats.max(3) {
            return Ok(out);
        }
        let rr = RRSeries::from_indices(beat_indices, fs);
        time_domain(&rr.rr_ms, &mut out);
        if let Some((freqs, psd)) = welch_psd(&rr.rr_ms, self.interp_fs)? {
            frequency_domain(&freqs, &psd, &mut out);
        }
        nonlinear(&rr.rr_ms, &mut out);
        Ok(out)
    }
}

/// Validated HRV output as carried in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvReport {
    pub indices: HrvIndices,
    /// Expected or returned keys without a usable value.
    pub missing: Vec<String>,
}

impl HrvReport {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.indices.get(key).copied()
    }
}

/// Run the HRV capability on a bundle's beats and validate the shape of its output.
pub fn hrv(
    bundle: &ProcessedBundle,
    context: &SamplingContext,
    analyzer: &dyn HrvAnalyzer,
) -> Result<HrvReport, MetricsError> {
    let raw = analyzer.analyze(&bundle.beat_indices, context.fs())?;
    let mut indices = HrvIndices::new();
    let mut missing = Vec::new();
    for (key, value) in raw {
        if value.is_finite() {
            indices.insert(key, value);
        } else {
            warn!("HRV index {key} is not finite ({value}); reporting it as missing");
            missing.push(key);
        }
    }
    for key in EXPECTED_HRV_KEYS {
        if !indices.contains_key(key) && !missing.iter().any(|m| m == key) {
            missing.push(key.to_string());
        }
    }
    Ok(HrvReport { indices, missing })
}

fn put(out: &mut HrvIndices, key: &str, value: Option<f64>) {
    if let Some(v) = value.filter(|v| v.is_finite()) {
        out.insert(key.to_string(), v);
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard deviation with `ddof` degrees of freedom removed.
fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    if values.len() <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss = values.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    Some((ss / (values.len() - ddof) as f64).sqrt())
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    })
}

fn time_domain(rr: &[f64], out: &mut HrvIndices) {
    let diffs: Vec<f64> = rr.windows(2).map(|w| w[1] - w[0]).collect();
    let mean_nn = mean(rr);
    let sdnn = std_dev(rr, 1);
    put(out, "HRV_MeanNN", mean_nn);
    put(out, "HRV_SDNN", sdnn);
    put(out, "HRV_MedianNN", median(rr));
    put(out, "HRV_MinNN", rr.iter().copied().reduce(f64::min));
    put(out, "HRV_MaxNN", rr.iter().copied().reduce(f64::max));
    put(
        out,
        "HRV_CVNN",
        mean_nn.zip(sdnn).filter(|(m, _)| *m > 0.0).map(|(m, s)| s / m),
    );
    if diffs.is_empty() {
        return;
    }
    let squared: Vec<f64> = diffs.iter().map(|d| d * d).collect();
    put(out, "HRV_RMSSD", mean(&squared).map(f64::sqrt));
    put(out, "HRV_SDSD", std_dev(&diffs, 1));
    let share_over = |limit: f64| {
        let count = diffs.iter().filter(|d| d.abs() > limit).count();
        100.0 * count as f64 / diffs.len() as f64
    };
    put(out, "HRV_pNN50", Some(share_over(50.0)));
    put(out, "HRV_pNN20", Some(share_over(20.0)));
}

fn frequency_domain(freqs: &[f64], psd: &[f64], out: &mut HrvIndices) {
    let vlf = band_power(freqs, psd, VLF_BAND);
    let lf = band_power(freqs, psd, LF_BAND);
    let hf = band_power(freqs, psd, HF_BAND);
    put(out, "HRV_VLF", Some(vlf));
    put(out, "HRV_LF", Some(lf));
    put(out, "HRV_HF", Some(hf));
    put(out, "HRV_TP", Some(band_power(freqs, psd, (VLF_BAND.0, HF_BAND.1))));
    put(out, "HRV_LFHF", (hf > 0.0).then(|| lf / hf));
}

fn nonlinear(rr: &[f64], out: &mut HrvIndices) {
    let diffs: Vec<f64> = rr.windows(2).map(|w| w[1] - w[0]).collect();
    let sd1 = std_dev(&diffs, 0).map(|s| s / 2f64.sqrt());
    let sdnn = std_dev(rr, 1);
    let sd2 = sd1
        .zip(sdnn)
        .map(|(sd1, sdnn)| (2.0 * sdnn * sdnn - sd1 * sd1).max(0.0).sqrt());
    put(out, "HRV_SD1", sd1);
    put(out, "HRV_SD2", sd2);
    put(
        out,
        "HRV_SD1SD2",
        sd1.zip(sd2).filter(|(_, b)| *b > 0.0).map(|(a, b)| a / b),
    );
    if let Some(sdnn) = sdnn {
        put(out, "HRV_SampEn", sample_entropy(rr, 2, 0.2 * sdnn.max(1e-4)));
    }
    put(out, "HRV_DFA_alpha1", dfa_alpha1(rr));
}

fn band_power(freqs: &[f64], psd: &[f64], band: (f64, f64)) -> f64 {
    let df = match freqs {
        [a, b, ..] => b - a,
        _ => return 0.0,
    };
    freqs
        .iter()
        .zip(psd)
        .filter(|(f, _)| **f >= band.0 && **f < band.1)
        .map(|(_, p)| p * df)
        .sum()
}

/// Linear interpolation of RR values (ms) at their beat times onto a uniform grid.
fn interpolate_tachogram(rr: &[f64], fs: f64) -> Vec<f64> {
    let mut times = Vec::with_capacity(rr.len());
    let mut acc = 0.0;
    for interval in rr {
        acc += interval / 1000.0;
        times.push(acc);
    }
    let (Some(&start), Some(&end)) = (times.first(), times.last()) else {
        return Vec::new();
    };
    let n = ((end - start) * fs).floor() as usize + 1;
    let mut signal = Vec::with_capacity(n);
    let mut k = 0;
    for i in 0..n {
        let t = start + i as f64 / fs;
        while k + 2 < times.len() && times[k + 1] < t {
            k += 1;
        }
        if k + 1 >= times.len() {
            signal.push(rr[k]);
            continue;
        }
        let span = times[k + 1] - times[k];
        let frac = if span > 0.0 {
            ((t - times[k]) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        signal.push(rr[k] + frac * (rr[k + 1] - rr[k]));
    }
    signal
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

/// One-sided Welch PSD (ms²/Hz) of the detrended tachogram; `None` when too short.
fn welch_psd(rr: &[f64], fs_interp: f64) -> Result<Option<(Vec<f64>, Vec<f64>)>, MetricsError> {
    let signal = interpolate_tachogram(rr, fs_interp);
    if signal.len() < MIN_PSD_SAMPLES || fs_interp <= 0.0 {
        return Ok(None);
    }
    let level = signal.iter().sum::<f64>() / signal.len() as f64;
    let signal: Vec<f64> = signal.iter().map(|x| x - level).collect();

    let window = ((fs_interp * 30.0) as usize).clamp(MIN_PSD_SAMPLES, signal.len());
    let step = (window / 2).max(1);
    let taper = hann(window);
    let norm = fs_interp * taper.iter().map(|w| w * w).sum::<f64>();

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(window);
    let mut spectrum = r2c.make_output_vec();
    let mut powers = vec![0.0; spectrum.len()];
    let mut segments = 0usize;
    let mut pos = 0;
    while pos + window <= signal.len() {
        let mut frame: Vec<f64> = signal[pos..pos + window]
            .iter()
            .zip(&taper)
            .map(|(x, w)| x * w)
            .collect();
        r2c.process(&mut frame, &mut spectrum)
            .map_err(|e| MetricsError::Hrv(format!("FFT failed: {e}")))?;
        for (k, bin) in spectrum.iter().enumerate() {
            let edge = k == 0 || (window % 2 == 0 && k == window / 2);
            let scale = if edge { 1.0 } else { 2.0 };
            powers[k] += scale * bin.norm_sqr() / norm;
        }
        segments += 1;
        pos += step;
    }
    for p in powers.iter_mut() {
        *p /= segments as f64;
    }
    let freqs = (0..powers.len())
        .map(|k| k as f64 * fs_interp / window as f64)
        .collect();
    Ok(Some((freqs, powers)))
}

/// `None` when no template pairs match (entropy undefined).
fn sample_entropy(data: &[f64], m: usize, r: f64) -> Option<f64> {
    if data.len() <= m + 1 {
        return None;
    }
    let chebyshev = |i: usize, j: usize, len: usize| {
        data[i..i + len]
            .iter()
            .zip(&data[j..j + len])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    };
    let (mut matches_m, mut matches_m1) = (0u64, 0u64);
    let last = data.len() - m;
    for i in 0..last {
        for j in (i + 1)..last {
            if chebyshev(i, j, m) < r {
                matches_m += 1;
                if j + m < data.len() && chebyshev(i, j, m + 1) < r {
                    matches_m1 += 1;
                }
            }
        }
    }
    (matches_m > 0 && matches_m1 > 0).then(|| -((matches_m1 as f64) / (matches_m as f64)).ln())
}

/// Short-term DFA scaling exponent over windows of 4..=16 beats.
fn dfa_alpha1(rr: &[f64]) -> Option<f64> {
    if rr.len() < DFA_MIN_WINDOW * 2 {
        return None;
    }
    let level = rr.iter().sum::<f64>() / rr.len() as f64;
    let profile: Vec<f64> = rr
        .iter()
        .scan(0.0, |acc, x| {
            *acc += x - level;
            Some(*acc)
        })
        .collect();

    let mut points = Vec::new();
    for window in DFA_MIN_WINDOW..=rr.len().min(DFA_MAX_WINDOW) {
        let mut total = 0.0;
        let mut segments = 0;
        for segment in profile.chunks_exact(window) {
            let (slope, intercept) = linear_fit(segment);
            total += segment
                .iter()
                .enumerate()
                .map(|(i, y)| (y - (slope * i as f64 + intercept)).powi(2))
                .sum::<f64>()
                / window as f64;
            segments += 1;
        }
        let rms = (total / segments as f64).sqrt();
        if rms.is_finite() && rms > 0.0 {
            points.push(((window as f64).ln(), rms.ln()));
        }
    }
    if points.len() < 2 {
        return None;
    }
    let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    Some(slope_of(&xs, &ys))
}

fn linear_fit(segment: &[f64]) -> (f64, f64) {
    let xs: Vec<f64> = (0..segment.len()).map(|i| i as f64).collect();
    let slope = slope_of(&xs, segment);
    let n = segment.len() as f64;
    let intercept = (segment.iter().sum::<f64>() - slope * xs.iter().sum::<f64>()) / n;
    (slope, intercept)
}

fn slope_of(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let (sx, sy) = (xs.iter().sum::<f64>(), ys.iter().sum::<f64>());
    let sxx = xs.iter().map(|x| x * x).sum::<f64>();
    let sxy = xs.iter().zip(ys).map(|(x, y)| x * y).sum::<f64>();
    let denom = n * sxx - sx * sx;
    if denom.abs() < f64::EPSILON {
        0.0
    } else {
        (n * sxy - sx * sy) / denom
    }
}
