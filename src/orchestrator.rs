//! Recognition Orchestrator (Component H): chains spectrogram -> peaks ->
//! hashing -> hash matching, falls back to feature similarity, and enriches
//! the winning candidates via `CatalogLookup`.

use std::time::Duration;

use tracing::{info, warn};

use crate::blob::BlobStore;
use crate::catalog::CatalogLookup;
use crate::config::Params;
use crate::constellation::hash_peaks;
use crate::error::RecognitionError;
use crate::features::extract_features;
use crate::matcher::Matcher;
use crate::similarity::SimilarityEngine;
use crate::spectrogram::{find_peaks, spectrogram};
use crate::store::FingerprintStore;
use crate::types::{MatchStrategy, RecognitionCandidate, RecognitionResult};

pub struct Orchestrator<'a, S: FingerprintStore, C: CatalogLookup, B: BlobStore> {
    fingerprints: &'a S,
    similarity: &'a SimilarityEngine,
    catalog: &'a C,
    blobs: &'a B,
    params: &'a Params,
    task_timeout: Duration,
}

impl<'a, S: FingerprintStore, C: CatalogLookup, B: BlobStore> Orchestrator<'a, S, C, B> {
    /// `task_timeout_sec` is `Config::task_timeout_sec` (spec §6's
    /// `TASK_TIMEOUT_SEC`/`ENGINE_TASK_TIMEOUT_SEC`), the wall-clock budget
    /// enforced around the whole recognition pipeline.
    pub fn new(fingerprints: &'a S, similarity: &'a SimilarityEngine, catalog: &'a C, blobs: &'a B, params: &'a Params, task_timeout_sec: u64) -> Self {
        Self { fingerprints, similarity, catalog, blobs, params, task_timeout: Duration::from_secs(task_timeout_sec) }
    }

    /// Run recognition for the decoded blob at `path`, always deleting it
    /// on exit regardless of outcome. Enforces the configured wall-clock
    /// timeout.
    pub async fn recognize(&self, path: &str, strategy: MatchStrategy) -> RecognitionResult {
        let result = match tokio::time::timeout(self.task_timeout, self.recognize_inner(path, strategy)).await {
            Ok(result) => result,
            Err(_) => Err(RecognitionError::Timeout),
        };

        if let Err(e) = self.blobs.delete(path).await {
            warn!(error = %e, path, "failed to delete blob after recognition");
        }

        match result {
            Ok(result) => result,
            Err(e) => {
                info!(error = %e, "recognition failed");
                RecognitionResult::failure(e.as_failure_message())
            }
        }
    }

    async fn recognize_inner(&self, path: &str, strategy: MatchStrategy) -> Result<RecognitionResult, RecognitionError> {
        let waveform = self.blobs.load(path).await?;

        if matches!(strategy, MatchStrategy::Exact | MatchStrategy::Hybrid) {
            let spec = spectrogram(&waveform.samples, waveform.sample_rate, self.params);
            let peaks = find_peaks(&spec, self.params);
            let fps = hash_peaks(&peaks, self.params);

            if !fps.is_empty() {
                let matcher = Matcher::new(self.fingerprints, self.params);
                if let Some(candidates) = matcher.match_fingerprints(&fps).await? {
                    let results = self.enrich(candidates.into_iter().map(|c| RecognitionCandidate {
                        song_id: c.track_id,
                        probability: c.probability,
                        match_score: Some(c.score),
                        similarity: None,
                        title: None,
                        artist_id: None,
                        artist_name: None,
                        album_id: None,
                        album_name: None,
                        album_image: None,
                    })).await;
                    return Ok(RecognitionResult::success(results));
                }
            } else if matches!(strategy, MatchStrategy::Exact) {
                return Ok(RecognitionResult::no_match());
            }
        }

        if matches!(strategy, MatchStrategy::Similarity | MatchStrategy::Hybrid) {
            // Re-load for the feature extraction path; a real BlobStore may
            // cache the decode, but the contract only guarantees one load
            // succeeds before delete.
            let waveform = self.blobs.load(path).await.unwrap_or(waveform);
            let query = extract_features(&waveform.samples, waveform.sample_rate, self.params);
            if query.is_degenerate() {
                return Ok(RecognitionResult::no_match());
            }

            let scored = self.similarity.rank_against_query(&query, self.params.sim_threshold_low, self.params.sim_top_n);
            if scored.is_empty() {
                return Ok(RecognitionResult::no_match());
            }

            let probabilities = softmax(&scored.iter().map(|(_, sim)| *sim).collect::<Vec<_>>(), self.params.softmax_temp);
            let mut ranked: Vec<(u64, f32, f32)> = scored
                .into_iter()
                .zip(probabilities)
                .map(|((id, sim), prob)| (id, sim, prob))
                .collect();
            ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap());
            ranked.truncate(3);

            let results = self.enrich(ranked.into_iter().map(|(id, sim, prob)| RecognitionCandidate {
                song_id: id,
                probability: prob,
                match_score: None,
                similarity: Some(sim),
                title: None,
                artist_id: None,
                artist_name: None,
                album_id: None,
                album_name: None,
                album_image: None,
            })).await;
            return Ok(RecognitionResult::success(results));
        }

        Ok(RecognitionResult::no_match())
    }

    async fn enrich(&self, candidates: impl Iterator<Item = RecognitionCandidate>) -> Vec<RecognitionCandidate> {
        let mut out = Vec::new();
        for mut candidate in candidates {
            let metadata = self.catalog.get_track(candidate.song_id).await;
            candidate.apply_metadata(metadata);
            out.push(candidate);
        }
        out
    }
}

/// Softmax with temperature `tau`: smaller `tau` sharpens the distribution.
fn softmax(scores: &[f32], tau: f32) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let scaled: Vec<f32> = scores.iter().map(|s| s / tau).collect();
    let max = scaled.iter().cloned().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = scaled.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
