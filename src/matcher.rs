//! Hash Matcher (Component F): time-offset histogram voting over query
//! fingerprints against the stored index.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::Params;
use crate::constellation::HashedPeak;
use crate::error::RecognitionError;
use crate::store::FingerprintStore;

/// One ranked candidate: a track id, its raw vote score, and its
/// probability within the returned top-N.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub track_id: u64,
    pub score: u32,
    pub probability: f32,
}

const K_MAX: usize = 5;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 100;

pub struct Matcher<'a, S: FingerprintStore> {
    store: &'a S,
    params: &'a Params,
}

impl<'a, S: FingerprintStore> Matcher<'a, S> {
    pub fn new(store: &'a S, params: &'a Params) -> Self {
        Self { store, params }
    }

    async fn lookup_with_retry(&self, hashes: &[u64]) -> Result<HashMap<u64, Vec<(u64, u32)>>, RecognitionError> {
        let mut attempt = 0;
        loop {
            match self.store.get_by_hashes(hashes).await {
                Ok(result) => return Ok(result),
                Err(_err) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    let jitter = rand::thread_rng().gen_range(0.75..1.25);
                    let backoff_ms = (BASE_BACKOFF_MS as f64 * 2f64.powi(attempt as i32 - 1) * jitter) as u64;
                    warn!(attempt, backoff_ms, "fingerprint store lookup failed, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Vote via a time-offset histogram: for each query hash matched to a
    /// stored posting, increment `counts[(track_id, t_stored - t_query)]`;
    /// a track's score is the max count over any single offset.
    pub async fn vote(&self, query_fps: &[HashedPeak]) -> Result<HashMap<u64, u32>, RecognitionError> {
        let query_hashes: Vec<u64> = query_fps.iter().map(|h| h.hash).collect();
        if query_hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let postings = self.lookup_with_retry(&query_hashes).await?;

        let mut counts: HashMap<(u64, i64), u32> = HashMap::new();
        for qfp in query_fps {
            let Some(matches) = postings.get(&qfp.hash) else {
                continue;
            };
            for &(track_id, t_stored) in matches {
                let delta = t_stored as i64 - qfp.t_anchor as i64;
                *counts.entry((track_id, delta)).or_insert(0) += 1;
            }
        }

        let mut scores: HashMap<u64, u32> = HashMap::new();
        for ((track_id, _delta), count) in counts {
            let entry = scores.entry(track_id).or_insert(0);
            if count > *entry {
                *entry = count;
            }
        }
        Ok(scores)
    }

    /// Rank votes, keep the top `K_MAX`, and compute probabilities as
    /// `score / sum(top-N score)`. Returns `None` if the best score is below
    /// `MIN_VOTES` (no-match).
    pub async fn match_fingerprints(&self, query_fps: &[HashedPeak]) -> Result<Option<Vec<MatchCandidate>>, RecognitionError> {
        let scores = self.vote(query_fps).await?;
        if scores.is_empty() {
            return Ok(None);
        }

        let mut ranked: Vec<(u64, u32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(K_MAX);

        let best = ranked[0].1;
        if best < self.params.min_votes {
            return Ok(None);
        }

        let total: u32 = ranked.iter().map(|(_, s)| s).sum();
        let candidates = ranked
            .into_iter()
            .map(|(track_id, score)| MatchCandidate {
                track_id,
                score,
                probability: score as f32 / total as f32,
            })
            .collect();
        Ok(Some(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryFingerprintStore;

    fn hp(hash: u64, t: u32) -> HashedPeak {
        HashedPeak { hash, t_anchor: t }
    }

    #[tokio::test]
    async fn empty_store_yields_empty_votes() {
        let store = InMemoryFingerprintStore::new();
        let params = Params::default();
        let matcher = Matcher::new(&store, &params);
        let votes = matcher.vote(&[hp(1, 0)]).await.unwrap();
        assert!(votes.is_empty());
    }

    #[tokio::test]
    async fn scenario_s4_time_offset_voting() {
        // hA=10 matched stored (1,100),(2,50); hB=30 matched stored (1,120),(2,90)
        let store = InMemoryFingerprintStore::new();
        store.insert(1, &[hp(100, 100), hp(200, 120)]).await.unwrap();
        store.insert(2, &[hp(100, 50), hp(200, 90)]).await.unwrap();

        let params = Params::default();
        let matcher = Matcher::new(&store, &params);
        let query = vec![hp(100, 10), hp(200, 30)];
        let votes = matcher.vote(&query).await.unwrap();

        assert_eq!(votes.get(&1).copied(), Some(2));
        assert_eq!(votes.get(&2).copied(), Some(1));
    }

    #[tokio::test]
    async fn below_min_votes_is_no_match() {
        let store = InMemoryFingerprintStore::new();
        store.insert(1, &[hp(1, 0)]).await.unwrap();
        let params = Params::default();
        let matcher = Matcher::new(&store, &params);
        let result = matcher.match_fingerprints(&[hp(1, 0)]).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn exact_match_yields_probability_one() {
        let store = InMemoryFingerprintStore::new();
        let fps: Vec<HashedPeak> = (0..10).map(|i| hp(i, i as u32)).collect();
        store.insert(7, &fps).await.unwrap();
        let params = Params::default();
        let matcher = Matcher::new(&store, &params);
        let candidates = matcher.match_fingerprints(&fps).await.unwrap().unwrap();
        assert_eq!(candidates[0].track_id, 7);
        assert!((candidates[0].probability - 1.0).abs() < 1e-6);
    }
}
