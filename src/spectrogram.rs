//! STFT magnitude spectrogram and 2-D local-maximum peak detection.

use ndarray::Array2;
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::FftPlanner;

use crate::config::Params;

/// Mono float waveform at a declared sample rate.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Downmix an interleaved multi-channel buffer to mono.
    pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
        if channels <= 1 {
            return samples.to_vec();
        }
        let channels = channels as usize;
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}

/// `(freq_bin, frame)` coordinate of a local maximum in a spectrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub freq_bin: usize,
    pub frame: usize,
    pub amplitude: f32,
}

fn hann(n: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }
    0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / (len - 1) as f32).cos()
}

/// Resample by linear interpolation. Used only to bring input audio to `SR`
/// before the STFT; not a high-quality resampler, but deterministic.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        let a = samples.get(idx).copied().unwrap_or(0.0);
        let b = samples.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }
    out
}

/// STFT magnitude spectrogram, `log1p`-scaled. `S[[f, t]]`, `f` frequency
/// bin, `t` frame index.
pub fn spectrogram(samples: &[f32], sr: u32, params: &Params) -> Array2<f32> {
    let samples = if sr != params.sr {
        resample_linear(samples, sr, params.sr)
    } else {
        samples.to_vec()
    };

    let n_fft = params.n_fft;
    let hop = params.hop;
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
            let sample = samples[start + i];
            buf[i] = Complex::new(sample * hann(i, n_fft), 0.0);
        }
        fft.process(&mut buf);
        for (bin, c) in buf.iter().take(num_bins).enumerate() {
            out[[bin, frame]] = c.norm().ln_1p();
        }
    }
    out
}

/// 2-D local-maximum peak detection with a `P x P` neighborhood and
/// constant-zero padding, keeping the top `1/R` peaks by amplitude.
pub fn find_peaks(s: &Array2<f32>, params: &Params) -> Vec<Peak> {
    let (num_bins, num_frames) = s.dim();
    if num_bins == 0 || num_frames == 0 {
        return Vec::new();
    }

    let p = params.peak_neighborhood as isize;
    let half = p / 2;

    // Each frequency row is independent; scan rows in parallel and flatten
    // in row order afterward so the result is deterministic regardless of
    // how the thread pool schedules work.
    let per_row: Vec<Vec<Peak>> = (0..num_bins)
        .into_par_iter()
        .map(|f| {
            let mut row_candidates = Vec::new();
            for t in 0..num_frames {
                let value = s[[f, t]];
                if value <= params.min_amp {
                    continue;
                }
                let mut max_in_window = f32::MIN;
                for df in -half..=half {
                    for dt in -half..=half {
                        let nf = f as isize + df;
                        let nt = t as isize + dt;
                        let neighbor = if nf < 0 || nt < 0 || nf >= num_bins as isize || nt >= num_frames as isize {
                            0.0
                        } else {
                            s[[nf as usize, nt as usize]]
                        };
                        if neighbor > max_in_window {
                            max_in_window = neighbor;
                        }
                    }
                }
                if value == max_in_window {
                    row_candidates.push(Peak { freq_bin: f, frame: t, amplitude: value });
                }
            }
            row_candidates
        })
        .collect();

    let mut candidates: Vec<Peak> = per_row.into_iter().flatten().collect();
    candidates.sort_by(|a, b| b.amplitude.partial_cmp(&a.amplitude).unwrap());
    let keep = candidates.len() / params.fp_reduction.max(1);
    candidates.truncate(keep);
    candidates
}
