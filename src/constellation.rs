//! Target-zone peak pairing and deterministic hashing (Component B).

use std::collections::HashSet;

use rayon::prelude::*;

use crate::config::Params;
use crate::spectrogram::{find_peaks, spectrogram, Peak};

/// A `(hash, anchor_time)` pair emitted by [`hash_peaks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashedPeak {
    pub hash: u64,
    pub t_anchor: u32,
}

/// Deterministic pure function of `(f1, f2, delta_t)`. Packs the triple into
/// a 64-bit word: 20 bits anchor freq, 20 bits partner freq, 20 bits delta.
pub fn hash_triple(f1: usize, f2: usize, delta_t: usize) -> u64 {
    let f1 = (f1 as u64) & 0xF_FFFF;
    let f2 = (f2 as u64) & 0xF_FFFF;
    let dt = (delta_t as u64) & 0xF_FFFF;
    (f1 << 40) | (f2 << 20) | dt
}

/// Pair peaks within the target zone `[ZS, ZS+ZW]` frames after each anchor,
/// emitting at most `MAX_PAIRS` hashes per anchor. Pure function of `peaks`
/// and `params`.
pub fn hash_peaks(peaks: &[Peak], params: &Params) -> Vec<HashedPeak> {
    if peaks.len() < 2 {
        return Vec::new();
    }

    let mut sorted = peaks.to_vec();
    sorted.sort_by_key(|p| p.frame);

    let zone_start = params.zone_start;
    let zone_end = params.zone_start + params.zone_width;

    // Each anchor's pairing is independent of every other anchor; process
    // anchors in parallel and flatten in anchor order so the result stays
    // a pure, deterministic function of `peaks`.
    let per_anchor: Vec<Vec<HashedPeak>> = (0..sorted.len())
        .into_par_iter()
        .map(|i| {
            let anchor = sorted[i];
            let mut emitted = 0usize;
            let mut out = Vec::new();
            for partner in sorted.iter().skip(i + 1) {
                if emitted >= params.max_pairs {
                    break;
                }
                let delta_t = partner.frame.saturating_sub(anchor.frame);
                if delta_t < zone_start {
                    continue;
                }
                if delta_t > zone_end {
                    break;
                }
                let hash = hash_triple(anchor.freq_bin, partner.freq_bin, delta_t);
                out.push(HashedPeak { hash, t_anchor: anchor.frame as u32 });
                emitted += 1;
            }
            out
        })
        .collect();

    per_anchor.into_iter().flatten().collect()
}

/// Chunk `samples` into overlapping `window_duration`-second windows (hop
/// `hop_duration` seconds), hash each independently, and union the results
/// by `hash` so a caller can register several partial fingerprints per track
/// rather than one fingerprint over the whole waveform. Additive alongside
/// [`hash_peaks`]; windows shorter than 80% of `window_duration` are skipped.
pub fn hash_windows(samples: &[f32], sr: u32, window_duration: f32, hop_duration: f32, params: &Params) -> Vec<HashedPeak> {
    let window_samples = (window_duration * sr as f32) as usize;
    let hop_samples = (hop_duration * sr as f32).max(1.0) as usize;
    if window_samples == 0 || samples.len() < window_samples {
        return Vec::new();
    }
    let min_len = (window_samples as f32 * 0.8) as usize;

    let starts: Vec<usize> = (0..=samples.len() - window_samples).step_by(hop_samples).collect();
    let per_window: Vec<Vec<HashedPeak>> = starts
        .into_par_iter()
        .filter_map(|start| {
            let end = start + window_samples;
            let window = &samples[start..end];
            if window.len() < min_len {
                return None;
            }
            let spec = spectrogram(window, sr, params);
            let peaks = find_peaks(&spec, params);
            Some(hash_peaks(&peaks, params))
        })
        .collect();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for hp in per_window.into_iter().flatten() {
        if seen.insert(hp.hash) {
            out.push(hp);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(freq_bin: usize, frame: usize) -> Peak {
        Peak { freq_bin, frame, amplitude: 1.0 }
    }

    #[test]
    fn fewer_than_two_peaks_yields_empty() {
        let params = Params::default();
        assert!(hash_peaks(&[], &params).is_empty());
        assert!(hash_peaks(&[peak(1, 1)], &params).is_empty());
    }

    #[test]
    fn pairs_only_within_target_zone() {
        let params = Params::default();
        let peaks = vec![peak(10, 0), peak(20, 1), peak(30, 50), peak(40, 1000)];
        let hashes = hash_peaks(&peaks, &params);
        // delta_t=1 (too close), delta_t=50 (in zone for anchor 0), delta_t=1000 (too far)
        assert!(hashes.iter().any(|h| h.t_anchor == 0));
        assert!(hashes.len() <= peaks.len() * params.max_pairs);
    }

    #[test]
    fn hash_is_pure_function_of_triple() {
        assert_eq!(hash_triple(5, 9, 12), hash_triple(5, 9, 12));
        assert_ne!(hash_triple(5, 9, 12), hash_triple(5, 9, 13));
    }

    #[test]
    fn respects_max_pairs_per_anchor() {
        let params = Params::default();
        let mut peaks = vec![peak(1, 0)];
        for t in 0..20 {
            peaks.push(peak(2 + t, params.zone_start + t));
        }
        let hashes = hash_peaks(&peaks, &params);
        let anchor_count = hashes.iter().filter(|h| h.t_anchor == 0).count();
        assert!(anchor_count <= params.max_pairs);
    }

    #[test]
    fn is_pure_function_of_peaks() {
        let params = Params::default();
        let peaks = vec![peak(1, 0), peak(2, 10), peak(3, 20)];
        let a = hash_peaks(&peaks, &params);
        let b = hash_peaks(&peaks, &params);
        assert_eq!(a, b);
    }

    fn sine_wave(freq: f32, sr: u32, seconds: f32) -> Vec<f32> {
        let n = (sr as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn windows_shorter_than_clip_yield_empty() {
        let params = Params::default();
        let samples = sine_wave(440.0, params.sr, 1.0);
        assert!(hash_windows(&samples, params.sr, 10.0, 5.0, &params).is_empty());
    }

    #[test]
    fn overlapping_windows_produce_deduplicated_hashes() {
        let params = Params::default();
        let samples = sine_wave(440.0, params.sr, 12.0);
        let hashes = hash_windows(&samples, params.sr, 5.0, 2.5, &params);
        assert!(!hashes.is_empty());
        let unique: HashSet<u64> = hashes.iter().map(|h| h.hash).collect();
        assert_eq!(unique.len(), hashes.len());
    }
}
