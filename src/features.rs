//! Perceptual feature extractor (Component C): a fixed 55-dim vector
//! combining chroma, MFCC statistics, spectral shape, rhythm, and ZCR.

use ndarray::{Array1, Array2, Axis};
use num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::config::Params;
use crate::error::RecognitionError;

pub const FEATURE_LEN: usize = 55;
const NUM_MEL: usize = 26;
const NUM_MFCC: usize = 13;
const NUM_CONTRAST_BANDS: usize = 6;
const MIN_BPM: f32 = 60.0;
const MAX_BPM: f32 = 200.0;
const EPS: f32 = 1e-6;

/// Fixed 55-dimensional perceptual feature vector. Always finite, always
/// length 55; short or silent clips yield zeros rather than NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f32; FEATURE_LEN]);

impl FeatureVector {
    pub fn zeros() -> Self {
        FeatureVector([0.0; FEATURE_LEN])
    }

    pub fn as_slice(&self) -> &[f32; FEATURE_LEN] {
        &self.0
    }

    pub fn chroma(&self) -> &[f32] {
        &self.0[0..12]
    }

    pub fn mfcc_mean(&self) -> &[f32] {
        &self.0[12..25]
    }

    pub fn mfcc_std(&self) -> &[f32] {
        &self.0[25..38]
    }

    pub fn spectral(&self) -> &[f32] {
        &self.0[38..44]
    }

    pub fn spectral_contrast(&self) -> &[f32] {
        &self.0[44..51]
    }

    pub fn tempo(&self) -> f32 {
        self.0[51]
    }

    pub fn rhythm_consistency(&self) -> f32 {
        self.0[52]
    }

    pub fn zcr(&self) -> &[f32] {
        &self.0[53..55]
    }

    /// A zero-norm vector is degenerate: produced from empty/silent/failed
    /// extraction, and must be excluded from the similarity index.
    pub fn is_degenerate(&self) -> bool {
        self.0.iter().map(|v| v * v).sum::<f32>() == 0.0
    }

    /// Encode for the `FeatureStore` wire (spec §6's `feature_vector` array
    /// column).
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecognitionError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, RecognitionError> {
        Ok(bincode::deserialize(data)?)
    }
}

fn hann(n: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }
    0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / (len - 1) as f32).cos()
}

/// Linear-magnitude (not log-scaled) STFT, frames as columns.
fn magnitude_spectrogram(samples: &[f32], n_fft: usize, hop: usize) -> Array2<f32> {
    let num_bins = n_fft / 2 + 1;
    if samples.len() < n_fft {
        return Array2::zeros((num_bins, 0));
    }
    let num_frames = (samples.len() - n_fft) / hop + 1;
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut out = Array2::<f32>::zeros((num_bins, num_frames));
    let mut buf = vec![Complex::new(0.0f32, 0.0); n_fft];

    for frame in 0..num_frames {
        let start = frame * hop;
        for i in 0..n_fft {
            buf[i] = Complex::new(samples[start + i] * hann(i, n_fft), 0.0);
        }
        fft.process(&mut buf);
        for (bin, c) in buf.iter().take(num_bins).enumerate() {
            out[[bin, frame]] = c.norm();
        }
    }
    out
}

fn frequency_to_chroma(frequency: f32) -> usize {
    if frequency <= 0.0 {
        return 0;
    }
    let chroma = 12.0 * (frequency / 440.0).log2();
    (((chroma % 12.0) + 12.0) % 12.0) as usize
}

fn chroma_filter_bank(sr: u32, n_fft: usize) -> Array2<f32> {
    let num_bins = n_fft / 2 + 1;
    let mut filters = Array2::zeros((12, num_bins));
    let nyquist = sr as f32 / 2.0;
    for bin in 0..num_bins {
        let freq = bin as f32 * nyquist / (num_bins - 1).max(1) as f32;
        if freq > 0.0 {
            filters[[frequency_to_chroma(freq), bin]] += 1.0;
        }
    }
    filters
}

fn mel_filter_bank(sr: u32, n_fft: usize, num_filters: usize) -> Array2<f32> {
    let nyquist = sr as f32 / 2.0;
    let mel_low = 0.0f32;
    let mel_high = 2595.0 * (1.0 + nyquist / 700.0).log10();
    let mel_points = Array1::linspace(mel_low, mel_high, num_filters + 2);
    let freq_points = mel_points.mapv(|mel| 700.0 * (10f32.powf(mel / 2595.0) - 1.0));

    let num_bins = n_fft / 2 + 1;
    let bin_freqs = Array1::linspace(0.0, nyquist, num_bins);
    let mut bank = Array2::zeros((num_filters, num_bins));

    for i in 0..num_filters {
        let left = freq_points[i];
        let center = freq_points[i + 1];
        let right = freq_points[i + 2];
        for (bin_idx, &freq) in bin_freqs.iter().enumerate() {
            if freq >= left && freq <= center && center > left {
                bank[[i, bin_idx]] = (freq - left) / (center - left);
            } else if freq > center && freq <= right && right > center {
                bank[[i, bin_idx]] = (right - freq) / (right - center);
            }
        }
    }
    bank
}

fn dct_ii(input: &[f32], num_coeffs: usize) -> Vec<f32> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; num_coeffs];
    }
    (0..num_coeffs)
        .map(|k| {
            input
                .iter()
                .enumerate()
                .map(|(i, &x)| x * (std::f32::consts::PI * k as f32 * (i as f32 + 0.5) / n as f32).cos())
                .sum()
        })
        .collect()
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

fn std_dev(values: &[f32], m: f32) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        (values.iter().map(|v| (v - m).powi(2)).sum::<f32>() / values.len() as f32).sqrt()
    }
}

fn mean_std(values: &[f32]) -> (f32, f32) {
    let m = mean(values);
    (m, std_dev(values, m))
}

fn spectral_centroid(frame: &[f32], bin_freqs: &[f32]) -> f32 {
    let energy: f32 = frame.iter().sum();
    if energy <= 0.0 {
        return 0.0;
    }
    frame.iter().zip(bin_freqs).map(|(m, f)| m * f).sum::<f32>() / energy
}

fn spectral_rolloff(frame: &[f32], bin_freqs: &[f32], fraction: f32) -> f32 {
    let total: f32 = frame.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let threshold = total * fraction;
    let mut cumulative = 0.0;
    for (m, f) in frame.iter().zip(bin_freqs) {
        cumulative += m;
        if cumulative >= threshold {
            return *f;
        }
    }
    *bin_freqs.last().unwrap_or(&0.0)
}

fn spectral_bandwidth(frame: &[f32], bin_freqs: &[f32], centroid: f32) -> f32 {
    let energy: f32 = frame.iter().sum();
    if energy <= 0.0 {
        return 0.0;
    }
    let variance = frame
        .iter()
        .zip(bin_freqs)
        .map(|(m, f)| m * (f - centroid).powi(2))
        .sum::<f32>()
        / energy;
    variance.sqrt()
}

/// Mean spectral-contrast (peak minus valley, in log domain) per octave-ish
/// band plus one overall value, per frame.
fn spectral_contrast_per_frame(frame: &[f32], num_bins: usize) -> [f32; NUM_CONTRAST_BANDS + 1] {
    let mut out = [0.0f32; NUM_CONTRAST_BANDS + 1];
    let band_size = (num_bins / NUM_CONTRAST_BANDS).max(1);
    for band in 0..NUM_CONTRAST_BANDS {
        let start = band * band_size;
        let end = if band == NUM_CONTRAST_BANDS - 1 { num_bins } else { (start + band_size).min(num_bins) };
        if start >= end {
            continue;
        }
        let slice = &frame[start..end];
        let peak = slice.iter().cloned().fold(f32::MIN, f32::max).max(EPS);
        let valley = slice.iter().cloned().fold(f32::MAX, f32::min).max(EPS);
        out[band] = peak.ln() - valley.ln();
    }
    let peak = frame.iter().cloned().fold(f32::MIN, f32::max).max(EPS);
    let valley = frame.iter().cloned().fold(f32::MAX, f32::min).max(EPS);
    out[NUM_CONTRAST_BANDS] = peak.ln() - valley.ln();
    out
}

fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame.windows(2).filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0)).count();
    crossings as f32 / (frame.len() - 1) as f32
}

fn onset_strength(spec: &Array2<f32>) -> Array1<f32> {
    let num_frames = spec.ncols();
    let mut onset = Array1::zeros(num_frames.max(1).min(num_frames));
    for t in 0..num_frames {
        onset[t] = spec.column(t).iter().map(|v| v * v).sum();
    }
    onset
}

fn estimate_tempo_bpm(onset: &Array1<f32>, sr: u32, hop: usize) -> f32 {
    let frame_rate = sr as f32 / hop as f32;
    if onset.len() < 4 || frame_rate <= 0.0 {
        return 0.0;
    }
    let min_lag = ((60.0 / MAX_BPM) * frame_rate).max(1.0) as usize;
    let max_lag = (((60.0 / MIN_BPM) * frame_rate) as usize).min(onset.len() / 2).max(min_lag + 1);

    let mut best_lag = min_lag;
    let mut best_corr = f32::MIN;
    for lag in min_lag..=max_lag {
        if lag >= onset.len() {
            break;
        }
        let mut corr = 0.0;
        let mut count = 0;
        for i in 0..onset.len() - lag {
            corr += onset[i] * onset[i + lag];
            count += 1;
        }
        if count == 0 {
            continue;
        }
        corr /= count as f32;
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }
    if best_lag == 0 {
        0.0
    } else {
        60.0 * frame_rate / best_lag as f32
    }
}

fn rhythm_consistency(onset: &Array1<f32>, tempo: f32, sr: u32, hop: usize) -> f32 {
    if tempo <= 0.0 || onset.len() < 4 {
        return 0.0;
    }
    let frame_rate = sr as f32 / hop as f32;
    let beat_period_frames = (60.0 / tempo) * frame_rate;
    if beat_period_frames < 1.0 {
        return 0.0;
    }
    // Peaks in onset strength above the mean mark candidate beats; the
    // standard deviation of inter-beat intervals is the inconsistency.
    let threshold = mean(onset.as_slice().unwrap_or(&[]));
    let mut beat_frames = Vec::new();
    for i in 1..onset.len() - 1 {
        if onset[i] > threshold && onset[i] >= onset[i - 1] && onset[i] >= onset[i + 1] {
            beat_frames.push(i as f32);
        }
    }
    if beat_frames.len() < 2 {
        return 0.0;
    }
    let intervals: Vec<f32> = beat_frames.windows(2).map(|w| w[1] - w[0]).collect();
    let m = mean(&intervals);
    let sigma = std_dev(&intervals, m);
    1.0 / (sigma + EPS)
}

fn scrub(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Compute the fixed 55-dim perceptual feature vector for a mono waveform.
/// Never panics or raises; a degenerate input (empty, silent, shorter than
/// the FFT window) produces a zero vector.
pub fn extract_features(samples: &[f32], sr: u32, params: &Params) -> FeatureVector {
    let n_fft = params.n_fft;
    let hop = params.hop;
    let spec = magnitude_spectrogram(samples, n_fft, hop);
    if spec.ncols() == 0 {
        return FeatureVector::zeros();
    }

    let num_bins = spec.nrows();
    let bin_freqs: Vec<f32> = (0..num_bins)
        .map(|b| b as f32 * (sr as f32 / 2.0) / (num_bins - 1).max(1) as f32)
        .collect();

    let chroma_bank = chroma_filter_bank(sr, n_fft);
    let chroma_energy = chroma_bank.dot(&spec); // [12, T]
    let chroma_mean: Vec<f32> = chroma_energy.axis_iter(Axis(0)).map(|row| mean(row.as_slice().unwrap())).collect();

    let mel_bank = mel_filter_bank(sr, n_fft, NUM_MEL);
    let mel_energy = mel_bank.dot(&spec); // [NUM_MEL, T]
    let log_mel = mel_energy.mapv(|v| (v.max(EPS)).ln());

    let num_frames = spec.ncols();
    let mut mfcc_frames: Vec<Vec<f32>> = Vec::with_capacity(num_frames);
    for t in 0..num_frames {
        let col: Vec<f32> = log_mel.column(t).to_vec();
        mfcc_frames.push(dct_ii(&col, NUM_MFCC));
    }

    let mut mfcc_mean = [0.0f32; NUM_MFCC];
    let mut mfcc_std = [0.0f32; NUM_MFCC];
    for c in 0..NUM_MFCC {
        let col: Vec<f32> = mfcc_frames.iter().map(|f| f[c]).collect();
        let (m, s) = mean_std(&col);
        mfcc_mean[c] = m;
        mfcc_std[c] = s;
    }

    let mut centroids = Vec::with_capacity(num_frames);
    let mut rolloffs = Vec::with_capacity(num_frames);
    let mut bandwidths = Vec::with_capacity(num_frames);
    let mut contrast_sums = [0.0f32; NUM_CONTRAST_BANDS + 1];
    for t in 0..num_frames {
        let frame: Vec<f32> = spec.column(t).to_vec();
        let centroid = spectral_centroid(&frame, &bin_freqs);
        centroids.push(centroid);
        rolloffs.push(spectral_rolloff(&frame, &bin_freqs, 0.85));
        bandwidths.push(spectral_bandwidth(&frame, &bin_freqs, centroid));
        let contrast = spectral_contrast_per_frame(&frame, num_bins);
        for (i, v) in contrast.iter().enumerate() {
            contrast_sums[i] += v;
        }
    }
    for v in contrast_sums.iter_mut() {
        *v /= num_frames as f32;
    }

    let (centroid_mean, centroid_std) = mean_std(&centroids);
    let (rolloff_mean, rolloff_std) = mean_std(&rolloffs);
    let (bandwidth_mean, bandwidth_std) = mean_std(&bandwidths);

    let duration_secs = samples.len() as f32 / sr.max(1) as f32;
    let onset = onset_strength(&spec);
    let (tempo, rhythm) = if duration_secs < 2.0 {
        (0.0, 0.0)
    } else {
        let t = estimate_tempo_bpm(&onset, sr, hop);
        let r = rhythm_consistency(&onset, t, sr, hop);
        (t, r)
    };

    let frame_len = n_fft.min(samples.len());
    let mut zcrs = Vec::with_capacity(num_frames);
    for t in 0..num_frames {
        let start = t * hop;
        let end = (start + frame_len).min(samples.len());
        if start < end {
            zcrs.push(zero_crossing_rate(&samples[start..end]));
        }
    }
    let (zcr_mean, zcr_std) = mean_std(&zcrs);

    let mut v = [0.0f32; FEATURE_LEN];
    v[0..12].copy_from_slice(&chroma_mean);
    v[12..25].copy_from_slice(&mfcc_mean);
    v[25..38].copy_from_slice(&mfcc_std);
    v[38] = centroid_mean;
    v[39] = centroid_std;
    v[40] = rolloff_mean;
    v[41] = rolloff_std;
    v[42] = bandwidth_mean;
    v[43] = bandwidth_std;
    v[44..51].copy_from_slice(&contrast_sums);
    v[51] = tempo;
    v[52] = rhythm;
    v[53] = zcr_mean;
    v[54] = zcr_std;

    for x in v.iter_mut() {
        *x = scrub(*x);
    }

    FeatureVector(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wave(freq: f32, sr: u32, seconds: f32) -> Vec<f32> {
        let n = (sr as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn always_55_and_finite() {
        let params = Params::default();
        let samples = sine_wave(440.0, params.sr, 3.0);
        let fv = extract_features(&samples, params.sr, &params);
        assert_eq!(fv.0.len(), FEATURE_LEN);
        assert!(fv.0.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn empty_audio_is_degenerate_zero_vector() {
        let params = Params::default();
        let fv = extract_features(&[], params.sr, &params);
        assert_eq!(fv.0, [0.0; FEATURE_LEN]);
        assert!(fv.is_degenerate());
    }

    #[test]
    fn short_clip_has_zero_tempo_and_rhythm() {
        let params = Params::default();
        let samples = sine_wave(440.0, params.sr, 1.0);
        let fv = extract_features(&samples, params.sr, &params);
        assert_eq!(fv.tempo(), 0.0);
        assert_eq!(fv.rhythm_consistency(), 0.0);
    }

    #[test]
    fn byte_round_trip_preserves_vector() {
        let params = Params::default();
        let samples = sine_wave(440.0, params.sr, 3.0);
        let fv = extract_features(&samples, params.sr, &params);
        let bytes = fv.to_bytes().unwrap();
        let decoded = FeatureVector::from_bytes(&bytes).unwrap();
        assert_eq!(fv, decoded);
    }

    #[test]
    fn silence_is_degenerate() {
        let params = Params::default();
        let samples = vec![0.0f32; params.sr as usize * 3];
        let fv = extract_features(&samples, params.sr, &params);
        assert!(fv.is_degenerate());
    }
}
