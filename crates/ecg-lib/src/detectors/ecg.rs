use super::{BeatDetector, DetectorOutput};
use crate::error::DetectionError;
use log::debug;

/// Configurable parameters for the QRS envelope detectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EcgPipelineConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds), measured between
    /// chosen R-peaks. Keep it at least as long as `search_back_s`.
    pub min_rr_s: f64,
    /// Scale between noise and signal envelopes for the adaptive threshold.
    pub threshold_scale: f64,
    /// How far back to search (seconds) for the precise R-peak after a detection.
    pub search_back_s: f64,
    /// Band kept in the cleaned waveform handed back to callers (Hz).
    pub clean_band_hz: (f64, f64),
    /// Use the local-maxima picker when the adaptive pass finds fewer than two beats.
    pub fallback: bool,
}

impl Default for EcgPipelineConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.200,
            threshold_scale: 0.6,
            search_back_s: 0.150,
            clean_band_hz: (0.5, 40.0),
            fallback: true,
        }
    }
}

impl EcgPipelineConfig {
    /// Classical Pan–Tompkins settings: 5–15 Hz band, 150 ms integration, 200 ms refractory.
    pub fn pan_tompkins() -> Self {
        Self {
            min_rr_s: 0.200,
            threshold_scale: 0.25,
            clean_band_hz: (5.0, 15.0),
            fallback: false,
            ..Self::default()
        }
    }

    /// Hamilton–Tompkins style: 8–16 Hz band, 80 ms integration, 0.3125 threshold coefficient.
    pub fn hamilton() -> Self {
        Self {
            lowcut_hz: 8.0,
            highcut_hz: 16.0,
            integration_window_s: 0.080,
            min_rr_s: 0.200,
            threshold_scale: 0.3125,
            search_back_s: 0.100,
            clean_band_hz: (8.0, 16.0),
            fallback: false,
        }
    }
}

/// Band-pass + derivative + squaring + integration envelope with adaptive thresholding.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveDetector {
    cfg: EcgPipelineConfig,
}

impl AdaptiveDetector {
    pub fn new(cfg: EcgPipelineConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &EcgPipelineConfig {
        &self.cfg
    }
}

impl BeatDetector for AdaptiveDetector {
    fn detect(&self, lead: &[f64], fs: f64) -> Result<DetectorOutput, DetectionError> {
        check_sampling_rate(fs)?;
        let beats = detect_r_peaks(lead, fs, &self.cfg);
        Ok(assemble(lead, fs, &self.cfg, beats))
    }
}

/// Local maxima above a moving-average baseline, spaced by the refractory period.
#[derive(Debug, Clone, Copy)]
pub struct LocalMaximaDetector {
    cfg: EcgPipelineConfig,
}

impl LocalMaximaDetector {
    pub fn new(cfg: EcgPipelineConfig) -> Self {
        Self { cfg }
    }
}

impl BeatDetector for LocalMaximaDetector {
    fn detect(&self, lead: &[f64], fs: f64) -> Result<DetectorOutput, DetectionError> {
        check_sampling_rate(fs)?;
        let beats = local_maxima_peaks(lead, fs, &self.cfg);
        Ok(assemble(lead, fs, &self.cfg, beats))
    }
}

fn check_sampling_rate(fs: f64) -> Result<(), DetectionError> {
    if fs.is_finite() && fs > 0.0 {
        Ok(())
    } else {
        Err(DetectionError::Capability(format!(
            "sampling rate must be positive, got {fs}"
        )))
    }
}

fn assemble(lead: &[f64], fs: f64, cfg: &EcgPipelineConfig, beats: Vec<usize>) -> DetectorOutput {
    let (low, high) = cfg.clean_band_hz;
    let cleaned = bandpass(lead, fs, low, high);
    let rate = instantaneous_rate(&beats, lead.len(), fs);
    DetectorOutput {
        cleaned,
        beats,
        rate,
    }
}

/// Detect R-peaks with the adaptive envelope pipeline.
pub fn detect_r_peaks(data: &[f64], fs: f64, cfg: &EcgPipelineConfig) -> Vec<usize> {
    if data.is_empty() {
        return Vec::new();
    }

    let (bandpassed, integrated) = qrs_envelope(data, fs, cfg);
    let peaks = pick_peaks(&bandpassed, &integrated, fs, cfg);

    if peaks.len() < 2 && cfg.fallback {
        debug!(
            "adaptive pass found {} beat(s); using local maxima fallback",
            peaks.len()
        );
        return local_maxima_peaks(data, fs, cfg);
    }

    peaks
}

/// Beats-per-minute at every sample, linearly interpolated between beats.
///
/// Each beat carries `60 / RR` of the interval ending at it (the first beat borrows the
/// second one's value); samples outside the first/last beat hold the nearest beat's rate.
/// Fewer than two beats yields all zeros.
pub fn instantaneous_rate(beats: &[usize], len: usize, fs: f64) -> Vec<f64> {
    if beats.len() < 2 || len == 0 {
        return vec![0.0; len];
    }
    let mut at_beat = Vec::with_capacity(beats.len());
    for w in beats.windows(2) {
        let period = (w[1] as f64 - w[0] as f64) / fs;
        at_beat.push(if period > 0.0 { 60.0 / period } else { 0.0 });
    }
    at_beat.insert(0, at_beat[0]);

    let first = beats[0];
    let last = beats[beats.len() - 1];
    let mut out = Vec::with_capacity(len);
    let mut k = 0;
    for i in 0..len {
        let value = if i <= first {
            at_beat[0]
        } else if i >= last {
            at_beat[at_beat.len() - 1]
        } else {
            while beats[k + 1] <= i {
                k += 1;
            }
            let span = (beats[k + 1] - beats[k]) as f64;
            let t = (i - beats[k]) as f64 / span;
            at_beat[k] + t * (at_beat[k + 1] - at_beat[k])
        };
        out.push(value);
    }
    out
}

fn qrs_envelope(data: &[f64], fs: f64, cfg: &EcgPipelineConfig) -> (Vec<f64>, Vec<f64>) {
    let fs = fs.max(1.0);
    let bandpassed = bandpass(data, fs, cfg.lowcut_hz, cfg.highcut_hz);
    let squared: Vec<f64> = derivative(&bandpassed).iter().map(|x| x * x).collect();
    let win = ((cfg.integration_window_s * fs).round() as usize).max(1);
    let integrated = moving_average(&squared, win);
    (bandpassed, integrated)
}

fn bandpass(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let hp = if low > 0.0 {
        single_pole_highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, fs, high)
    }
}

fn rc_constant(cutoff: f64) -> f64 {
    1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01))
}

fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let dt = 1.0 / fs;
    let rc = rc_constant(cutoff);
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let (mut prev_y, mut prev_x) = (data[0], data[0]);
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let dt = 1.0 / fs;
    let alpha = dt / (rc_constant(cutoff) + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

fn derivative(data: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; data.len()];
    for i in 1..data.len() {
        out[i] = data[i] - data[i - 1];
    }
    out
}

fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = vec![0.0; data.len()];
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out[i] = acc / win as f64;
    }
    out
}

/// Adaptive threshold over the envelope's local maxima.
///
/// Each envelope peak above threshold is traced back to the largest band-passed sample
/// after the previous R-peak. A candidate landing inside the refractory gap of the previous
/// R-peak is merged into it, keeping whichever has the larger amplitude.
fn pick_peaks(bandpassed: &[f64], envelope: &[f64], fs: f64, cfg: &EcgPipelineConfig) -> Vec<usize> {
    if bandpassed.is_empty() || envelope.is_empty() {
        return Vec::new();
    }

    let refractory = (cfg.min_rr_s * fs).round().max(1.0) as usize;
    let search = (cfg.search_back_s * fs).round().max(1.0) as usize;
    let last_sample = envelope.len().min(bandpassed.len()) - 1;

    let init = envelope.len().min((fs as usize).max(1));
    let avg = envelope[..init].iter().sum::<f64>() / init as f64;
    let mut signal_level = avg;
    let mut noise_level = avg * 0.5;
    let mut threshold = noise_level + cfg.threshold_scale * (signal_level - noise_level).max(0.0);
    let mut peaks: Vec<usize> = Vec::new();

    for i in 0..=last_sample {
        let sample = envelope[i];
        let rising = i == 0 || sample > envelope[i - 1];
        let falling = i == last_sample || sample >= envelope[i + 1];
        if !(rising && falling) {
            continue;
        }

        if sample >= threshold {
            let floor = peaks.last().map_or(0, |&last| last + 1);
            let start = i.saturating_sub(search).max(floor);
            if start <= i {
                let idx = argmax(bandpassed, start, i);
                match peaks.last_mut() {
                    Some(last) if idx < *last + refractory => {
                        if bandpassed[idx] > bandpassed[*last] {
                            *last = idx;
                        }
                    }
                    _ => peaks.push(idx),
                }
            }
            signal_level = 0.125 * sample + 0.875 * signal_level;
        } else {
            noise_level = 0.125 * sample + 0.875 * noise_level;
        }

        threshold = noise_level + cfg.threshold_scale * (signal_level - noise_level).max(0.0);
    }

    peaks
}

fn argmax(data: &[f64], start: usize, end: usize) -> usize {
    let window = &data[start..=end];
    let best = window
        .iter()
        .enumerate()
        .fold(0, |best, (j, &v)| if v > window[best] { j } else { best });
    start + best
}

/// Fraction of the lead's robust peak a local maximum must reach to count as a beat.
const LOCAL_MAXIMA_GATE: f64 = 0.35;

fn local_maxima_peaks(data: &[f64], fs: f64, cfg: &EcgPipelineConfig) -> Vec<usize> {
    let min_gap = (cfg.min_rr_s * fs).round().max(1.0) as usize;
    if data.len() < 3 {
        return Vec::new();
    }

    let win = ((0.150 * fs) as usize).max(1);
    let baseline = moving_average(data, win);
    let detrended: Vec<f64> = data.iter().zip(&baseline).map(|(x, m)| x - m).collect();

    let mut sorted = detrended.clone();
    sorted.sort_unstable_by(f64::total_cmp);
    let robust_max = sorted[((sorted.len() - 1) as f64 * 0.99).round() as usize];
    let gate = (LOCAL_MAXIMA_GATE * robust_max).max(0.0);

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..data.len() - 1 {
        let y = detrended[i];
        let is_peak = y > gate && y > detrended[i - 1] && y >= detrended[i + 1];
        if !is_peak {
            continue;
        }
        match peaks.last_mut() {
            Some(last) if i - *last < min_gap => {
                if y > detrended[*last] {
                    *last = i;
                }
            }
            _ => peaks.push(i),
        }
    }
    peaks
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detectors::{DetectionMethod, DetectorRegistry};

    /// Gaussian R waves (20 ms wide) on a slow 1 Hz baseline, first beat at 0.5 s.
    pub(crate) fn synthetic_ecg(fs: f64, rr: &[f64]) -> Vec<f64> {
        use std::f64::consts::PI;
        let mut beats = Vec::with_capacity(rr.len() + 1);
        let mut t = 0.5;
        beats.push(t);
        for &interval in rr {
            t += interval;
            beats.push(t);
        }
        let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
        let samples = (duration * fs) as usize;
        (0..samples)
            .map(|i| {
                let time = i as f64 / fs;
                let mut v = 0.05 * (2.0 * PI * time).sin();
                for &bt in &beats {
                    v += 1.2 * (-0.5 * ((time - bt) / 0.02).powi(2)).exp();
                }
                v
            })
            .collect()
    }

    #[test]
    fn detects_regular_beats() {
        let fs = 250.0;
        let rr = [0.9, 0.85, 0.88, 0.86, 0.82, 0.81, 0.8];
        let data = synthetic_ecg(fs, &rr);
        let beats = detect_r_peaks(&data, fs, &EcgPipelineConfig::default());
        assert_eq!(beats.len(), rr.len() + 1);
    }

    #[test]
    fn adaptive_detector_output_is_aligned() {
        let fs = 250.0;
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let data = synthetic_ecg(fs, &rr);
        let out = AdaptiveDetector::new(EcgPipelineConfig::default())
            .detect(&data, fs)
            .expect("detect");
        assert_eq!(out.cleaned.len(), data.len());
        assert_eq!(out.rate.len(), data.len());
        assert!(out.beats.windows(2).all(|w| w[0] < w[1]));
        assert!(out.beats.iter().all(|&b| b < data.len()));
        let mean_rate = out.rate.iter().sum::<f64>() / out.rate.len() as f64;
        assert!(mean_rate > 60.0 && mean_rate < 85.0, "mean rate {mean_rate}");
    }

    #[test]
    fn regular_rhythm_counts_each_beat_once() {
        let fs = 250.0;
        let cfg = EcgPipelineConfig::default();
        for intervals in [4, 6, 8, 11, 20] {
            let rr = vec![0.8; intervals];
            let beats = detect_r_peaks(&synthetic_ecg(fs, &rr), fs, &cfg);
            assert_eq!(beats.len(), intervals + 1, "{intervals} intervals gave {beats:?}");
        }

        let beats = detect_r_peaks(&synthetic_ecg(fs, &[0.8; 11]), fs, &cfg);
        let min_gap = (cfg.min_rr_s * fs) as usize;
        assert!(beats.windows(2).all(|w| w[1] - w[0] >= min_gap), "{beats:?}");
        // R waves sit at 0.5 s + k * 0.8 s.
        for (k, &b) in beats.iter().enumerate() {
            let expected = (0.5 + 0.8 * k as f64) * fs;
            assert!((b as f64 - expected).abs() <= 8.0, "beat {k} at {b}");
        }

        let stats = crate::metrics::RRStatistics::from_beats(&beats, fs);
        assert!((stats.mean_hr - 75.0).abs() < 1.0, "mean hr {}", stats.mean_hr);
        let flags = crate::metrics::classify_arrhythmia(&stats);
        assert!(!flags.tachycardia && !flags.bradycardia && !flags.irregular_rhythm);
    }

    #[test]
    fn default_refractory_covers_search_back() {
        for cfg in [
            EcgPipelineConfig::default(),
            EcgPipelineConfig::pan_tompkins(),
            EcgPipelineConfig::hamilton(),
        ] {
            assert!(cfg.min_rr_s >= cfg.search_back_s, "{cfg:?}");
        }
    }

    #[test]
    fn every_registered_method_finds_beats() {
        let fs = 250.0;
        let rr = [0.8; 10];
        let data = synthetic_ecg(fs, &rr);
        let registry = DetectorRegistry::standard();
        for method in DetectionMethod::ALL {
            let out = registry.get(method).expect("registered").detect(&data, fs).expect("detect");
            let found = out.beats.len();
            assert!(
                found.abs_diff(rr.len() + 1) <= 1,
                "{method} found {found} beats, expected {}",
                rr.len() + 1
            );
            assert_eq!(out.cleaned.len(), data.len());
        }
    }

    #[test]
    fn local_maxima_ignores_baseline_wander() {
        let fs = 250.0;
        let data = synthetic_ecg(fs, &[0.8; 11]);
        let beats = local_maxima_peaks(&data, fs, &EcgPipelineConfig::default());
        assert_eq!(beats.len(), 12, "{beats:?}");
    }

    #[test]
    fn empty_lead_yields_empty_output() {
        let out = AdaptiveDetector::new(EcgPipelineConfig::default())
            .detect(&[], 250.0)
            .expect("detect");
        assert!(out.beats.is_empty());
        assert!(out.cleaned.is_empty());
        assert!(out.rate.is_empty());
    }

    #[test]
    fn rejects_non_positive_sampling_rate() {
        let err = AdaptiveDetector::new(EcgPipelineConfig::default())
            .detect(&[0.0; 10], 0.0)
            .unwrap_err();
        assert!(matches!(err, DetectionError::Capability(_)));
    }

    #[test]
    fn rate_is_constant_for_regular_beats() {
        let rate = instantaneous_rate(&[10, 110, 210, 310], 400, 100.0);
        assert_eq!(rate.len(), 400);
        assert!(rate.iter().all(|&r| (r - 60.0).abs() < 1e-9));
    }

    #[test]
    fn rate_interpolates_between_beats() {
        // 1 s then 0.5 s intervals: 60 bpm at beat 1, 120 bpm at beat 2.
        let rate = instantaneous_rate(&[0, 100, 150], 200, 100.0);
        assert!((rate[0] - 60.0).abs() < 1e-9);
        assert!((rate[100] - 60.0).abs() < 1e-9);
        assert!((rate[125] - 90.0).abs() < 1e-9);
        assert!((rate[199] - 120.0).abs() < 1e-9);
    }

    #[test]
    fn rate_without_enough_beats_is_zero() {
        assert_eq!(instantaneous_rate(&[5], 10, 100.0), vec![0.0; 10]);
        assert!(instantaneous_rate(&[], 0, 100.0).is_empty());
    }
}
