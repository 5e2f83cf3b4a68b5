//! The recognition result wire shape (spec §6) and the strategy tag the
//! Orchestrator picks between (spec §9, "Strategy selection").

use serde::{Deserialize, Serialize};

use crate::catalog::TrackMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecognitionStatus {
    Success,
    NoMatch,
    Failure,
}

/// One ranked candidate in a recognition response. `match_score` is set only
/// for exact (hash-vote) results, `similarity` only for feature-similarity
/// results; the two are mutually exclusive within one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionCandidate {
    pub song_id: u64,
    pub probability: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_image: Option<String>,
}

impl RecognitionCandidate {
    pub fn apply_metadata(&mut self, metadata: Option<TrackMetadata>) {
        let Some(metadata) = metadata else { return };
        self.title = Some(metadata.title);
        self.artist_id = Some(metadata.artist_id);
        self.artist_name = metadata.artist_name;
        self.album_id = metadata.album_id;
        self.album_name = metadata.album_name;
        self.album_image = metadata.album_image;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub status: RecognitionStatus,
    pub results: Vec<RecognitionCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecognitionResult {
    pub fn no_match() -> Self {
        Self { status: RecognitionStatus::NoMatch, results: Vec::new(), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { status: RecognitionStatus::Failure, results: Vec::new(), error: Some(error.into()) }
    }

    pub fn success(results: Vec<RecognitionCandidate>) -> Self {
        Self { status: RecognitionStatus::Success, results, error: None }
    }

    /// Sum of `probability` across `results`; should equal `1.0` within
    /// `1e-6` for a non-empty `SUCCESS` response (spec §6, invariant).
    pub fn probability_sum(&self) -> f32 {
        self.results.iter().map(|r| r.probability).sum()
    }
}

/// Which recognition strategy produced (or should produce) a result.
/// Replaces the source's `ThresholdStrategy` class hierarchy (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Hash-vote matching only.
    Exact,
    /// Feature-vector cosine similarity only.
    Similarity,
    /// Exact first, falling back to similarity when the vote is weak —
    /// the default, and what spec §4.H's algorithm describes.
    Hybrid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_probabilities_sum_to_one() {
        let result = RecognitionResult::success(vec![
            RecognitionCandidate {
                song_id: 1,
                probability: 0.6,
                match_score: Some(6),
                similarity: None,
                title: None,
                artist_id: None,
                artist_name: None,
                album_id: None,
                album_name: None,
                album_image: None,
            },
            RecognitionCandidate {
                song_id: 2,
                probability: 0.4,
                match_score: Some(4),
                similarity: None,
                title: None,
                artist_id: None,
                artist_name: None,
                album_id: None,
                album_name: None,
                album_image: None,
            },
        ]);
        assert!((result.probability_sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn no_match_has_empty_results() {
        let result = RecognitionResult::no_match();
        assert_eq!(result.status, RecognitionStatus::NoMatch);
        assert!(result.results.is_empty());
    }
}
