//! Similarity Engine (Component G): weighted cosine similarity over
//! precomputed feature vectors, plus the user-history recommender.
//!
//! The feature map is a read-mostly snapshot behind an `ArcSwap`-style
//! pattern: a new map is built off to the side and swapped in with a single
//! `RwLock` write, so readers never observe a partially populated map
//! (spec §5, "Shared-resource policy").

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::features::FeatureVector;

/// Per-dimension weight applied before the cosine dot product, mirroring the
/// slice layout in [`FeatureVector`].
const WEIGHTS: [f32; crate::features::FEATURE_LEN] = {
    let mut w = [0.0f32; crate::features::FEATURE_LEN];
    let mut i = 0;
    while i < 55 {
        w[i] = match i {
            0..=11 => 3.0,   // chroma
            12..=24 => 1.5,  // MFCC mean
            25..=37 => 0.8,  // MFCC std
            38..=43 => 1.0,  // spectral centroid/rolloff/bandwidth
            44..=50 => 2.0,  // spectral contrast
            51..=52 => 0.3,  // rhythm
            _ => 0.2,        // ZCR
        };
        i += 1;
    }
    w
};

/// Weighted cosine similarity: `((W*a) . (W*b)) / (||W*a|| * ||W*b||)`,
/// `0.0` when either weighted norm is zero. Symmetric in `a`/`b`.
pub fn weighted_cosine(a: &FeatureVector, b: &FeatureVector) -> f32 {
    let a = a.as_slice();
    let b = b.as_slice();
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..crate::features::FEATURE_LEN {
        let wa = WEIGHTS[i] * a[i];
        let wb = WEIGHTS[i] * b[i];
        dot += wa * wb;
        norm_a += wa * wa;
        norm_b += wb * wb;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Read-mostly snapshot of every track's feature vector, rebuilt and
/// atomically swapped as a whole (no partial updates visible to readers).
pub struct SimilarityEngine {
    snapshot: RwLock<Arc<HashMap<u64, FeatureVector>>>,
}

impl SimilarityEngine {
    pub fn new(initial: HashMap<u64, FeatureVector>) -> Self {
        Self { snapshot: RwLock::new(Arc::new(initial)) }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    /// Atomically replace the in-memory feature map. Build the new map
    /// first, then call this once; existing readers keep their `Arc` to the
    /// old map until they re-read.
    pub fn reload(&self, fresh: HashMap<u64, FeatureVector>) {
        *self.snapshot.write().unwrap() = Arc::new(fresh);
    }

    fn current(&self) -> Arc<HashMap<u64, FeatureVector>> {
        self.snapshot.read().unwrap().clone()
    }

    /// Top-`n` tracks by weighted cosine similarity to `seed_id`, excluding
    /// the seed itself. Ties break by ascending `track_id`. Empty if the
    /// seed isn't present or has a zero-norm (degenerate) vector.
    pub fn top_similar(&self, seed_id: u64, n: usize) -> Vec<(u64, f32)> {
        let map = self.current();
        let Some(seed_vec) = map.get(&seed_id) else {
            return Vec::new();
        };
        if seed_vec.is_degenerate() {
            return Vec::new();
        }

        let mut scored: Vec<(u64, f32)> = map
            .iter()
            .filter(|(id, _)| **id != seed_id)
            .map(|(id, v)| (*id, weighted_cosine(seed_vec, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        scored.truncate(n);
        scored
    }

    /// Rank every stored track against an externally supplied query vector
    /// (not necessarily itself in the map) — used by the Orchestrator's
    /// feature-similarity fallback. Keeps only `sim >= min_sim`, sorts
    /// descending, and truncates to `top_n`.
    pub fn rank_against_query(&self, query: &FeatureVector, min_sim: f32, top_n: usize) -> Vec<(u64, f32)> {
        if query.is_degenerate() {
            return Vec::new();
        }
        let map = self.current();
        let mut scored: Vec<(u64, f32)> = map
            .iter()
            .map(|(id, v)| (*id, weighted_cosine(query, v)))
            .filter(|(_, sim)| *sim >= min_sim)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        scored.truncate(top_n);
        scored
    }

    /// Recommend for a user given their listening history, newest-first.
    /// Each history position `i` gets weight `len - i` if `time_weight`,
    /// else `1`; per-seed top-10 recommendations are accumulated by summed
    /// weight, heard tracks excluded, ties broken by ascending `track_id`.
    pub fn recommend_for_user(&self, history: &[u64], n: usize, time_weight: bool) -> Vec<(u64, f32)> {
        let heard: HashSet<u64> = history.iter().copied().collect();
        let len = history.len();

        let mut totals: HashMap<u64, f32> = HashMap::new();
        for (i, &seed_id) in history.iter().enumerate() {
            let weight = if time_weight { (len - i) as f32 } else { 1.0 };
            for (rec_id, _sim) in self.top_similar(seed_id, 10) {
                if heard.contains(&rec_id) {
                    continue;
                }
                *totals.entry(rec_id).or_insert(0.0) += weight;
            }
        }

        let mut ranked: Vec<(u64, f32)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec3(values: [f32; 3]) -> FeatureVector {
        // Pack into slots 0..3 (chroma weight 3.0) so the weighting is
        // uniform for these small hand-built test vectors.
        let mut v = [0.0f32; crate::features::FEATURE_LEN];
        v[0] = values[0];
        v[1] = values[1];
        v[2] = values[2];
        FeatureVector(v)
    }

    #[test]
    fn weighted_cosine_is_symmetric() {
        let a = vec3([1.0, 0.2, 0.0]);
        let b = vec3([0.3, 1.0, 0.1]);
        assert!((weighted_cosine(&a, &b) - weighted_cosine(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn zero_norm_is_zero_similarity() {
        let a = FeatureVector::zeros();
        let b = vec3([1.0, 0.0, 0.0]);
        assert_eq!(weighted_cosine(&a, &b), 0.0);
    }

    #[test]
    fn scenario_s3_similarity_recommendation() {
        let mut map = HashMap::new();
        map.insert(1, vec3([1.0, 0.0, 0.0]));
        map.insert(2, vec3([0.9, 0.1, 0.0]));
        map.insert(3, vec3([0.0, 1.0, 0.0]));
        let engine = SimilarityEngine::new(map);

        let top = engine.top_similar(1, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, 2);
        assert!((top[0].1 - 0.9938).abs() < 1e-3);
        assert_eq!(top[1].0, 3);
        assert!((top[1].1 - 0.0).abs() < 1e-6);
    }

    #[test]
    fn identical_vectors_tie_break_by_ascending_id() {
        let mut map = HashMap::new();
        map.insert(1, vec3([1.0, 0.0, 0.0]));
        map.insert(5, vec3([0.5, 0.0, 0.0]));
        map.insert(3, vec3([0.5, 0.0, 0.0]));
        let engine = SimilarityEngine::new(map);

        let top = engine.top_similar(1, 2);
        assert_eq!(top[0].0, 3);
        assert_eq!(top[1].0, 5);
    }

    #[test]
    fn degenerate_seed_yields_empty() {
        let mut map = HashMap::new();
        map.insert(1, FeatureVector::zeros());
        map.insert(2, vec3([1.0, 0.0, 0.0]));
        let engine = SimilarityEngine::new(map);
        assert!(engine.top_similar(1, 5).is_empty());
    }

    #[test]
    fn reload_swaps_atomically() {
        let engine = SimilarityEngine::empty();
        assert!(engine.top_similar(1, 5).is_empty());

        let mut fresh = HashMap::new();
        fresh.insert(1, vec3([1.0, 0.0, 0.0]));
        fresh.insert(2, vec3([0.9, 0.1, 0.0]));
        engine.reload(fresh);
        assert_eq!(engine.top_similar(1, 5).len(), 1);
    }

    #[test]
    fn scenario_s5_time_weighted_user_history() {
        // History newest-first [A, B, C] -> weights A=3, B=2, C=1.
        let mut map = HashMap::new();
        map.insert(100, vec3([1.0, 0.0, 0.0])); // A
        map.insert(101, vec3([0.0, 1.0, 0.0])); // B
        map.insert(102, vec3([0.0, 0.0, 1.0])); // C
        map.insert(200, vec3([1.0, 0.0, 0.01])); // X: similar to A and C
        map.insert(201, vec3([0.0, 1.0, 0.01])); // Y: similar to B only
        let engine = SimilarityEngine::new(map);

        let recs = engine.recommend_for_user(&[100, 101, 102], 5, true);
        let x_pos = recs.iter().position(|(id, _)| *id == 200).unwrap();
        let y_pos = recs.iter().position(|(id, _)| *id == 201).unwrap();
        assert!(x_pos < y_pos, "X (weight ~4) should rank before Y (weight ~2)");
    }
}
