//! Fingerprint Store (Component D) and Feature Store (Component E).
//!
//! Both are storage-neutral trait contracts with an in-process reference
//! implementation; a host application backs them with whatever document
//! store or cache it already runs (see spec §6 for the wire-level shapes
//! these traits stand in for).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::constellation::HashedPeak;
use crate::error::RecognitionError;
use crate::features::FeatureVector;

/// One posting: a track and the frame offset its hash was anchored at.
pub type Posting = (u64, u32);

#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Atomically delete existing records for `track_id`, then bulk-insert
    /// the new ones.
    async fn insert(&self, track_id: u64, fingerprints: &[HashedPeak]) -> Result<(), RecognitionError>;

    /// Exact-equality lookup; returns only keys present in the store.
    async fn get_by_hashes(&self, hashes: &[u64]) -> Result<HashMap<u64, Vec<Posting>>, RecognitionError>;

    async fn delete(&self, track_id: u64) -> Result<usize, RecognitionError>;

    async fn count(&self, track_id: u64) -> Result<usize, RecognitionError>;
}

#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Set-or-replace `track_id`'s vector. `created_at` is stamped once;
    /// `updated_at` on every write. A degenerate (zero-norm) vector is never
    /// indexed (spec §3/§4.C: silent/failed extraction must not pollute the
    /// similarity index) — implementations skip the write and leave any
    /// existing record untouched.
    async fn upsert(&self, track_id: u64, vector: FeatureVector) -> Result<(), RecognitionError>;

    async fn get(&self, track_id: u64) -> Result<Option<FeatureVector>, RecognitionError>;

    /// Full scan, used once to prime the Similarity Engine's snapshot.
    async fn load_all(&self) -> Result<HashMap<u64, FeatureVector>, RecognitionError>;
}

struct FeatureRecord {
    vector: FeatureVector,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    #[allow(dead_code)]
    updated_at: DateTime<Utc>,
}

/// `HashMap`-backed reference implementation of [`FingerprintStore`]. Index
/// by `hash` is the map key itself; the `(hash, t_offset)` index required by
/// the spec is implicit in each posting's `(track_id, t_offset)` pair.
#[derive(Default)]
pub struct InMemoryFingerprintStore {
    by_hash: RwLock<HashMap<u64, Vec<Posting>>>,
    by_track: RwLock<HashMap<u64, Vec<u64>>>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn insert(&self, track_id: u64, fingerprints: &[HashedPeak]) -> Result<(), RecognitionError> {
        self.delete(track_id).await?;

        let mut by_hash = self.by_hash.write().unwrap();
        let mut by_track = self.by_track.write().unwrap();
        let mut hashes = Vec::with_capacity(fingerprints.len());
        for fp in fingerprints {
            by_hash.entry(fp.hash).or_default().push((track_id, fp.t_anchor));
            hashes.push(fp.hash);
        }
        by_track.insert(track_id, hashes);
        Ok(())
    }

    async fn get_by_hashes(&self, hashes: &[u64]) -> Result<HashMap<u64, Vec<Posting>>, RecognitionError> {
        let by_hash = self.by_hash.read().unwrap();
        let mut out = HashMap::new();
        for h in hashes {
            if let Some(postings) = by_hash.get(h) {
                out.insert(*h, postings.clone());
            }
        }
        Ok(out)
    }

    async fn delete(&self, track_id: u64) -> Result<usize, RecognitionError> {
        let mut by_track = self.by_track.write().unwrap();
        let Some(hashes) = by_track.remove(&track_id) else {
            return Ok(0);
        };
        let mut by_hash = self.by_hash.write().unwrap();
        let mut removed = 0;
        for h in &hashes {
            if let Some(postings) = by_hash.get_mut(h) {
                let before = postings.len();
                postings.retain(|(tid, _)| *tid != track_id);
                removed += before - postings.len();
                if postings.is_empty() {
                    by_hash.remove(h);
                }
            }
        }
        Ok(removed)
    }

    async fn count(&self, track_id: u64) -> Result<usize, RecognitionError> {
        let by_track = self.by_track.read().unwrap();
        Ok(by_track.get(&track_id).map(|h| h.len()).unwrap_or(0))
    }
}

/// `HashMap`-backed reference implementation of [`FeatureStore`].
#[derive(Default)]
pub struct InMemoryFeatureStore {
    records: RwLock<HashMap<u64, FeatureRecord>>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeatureStore for InMemoryFeatureStore {
    async fn upsert(&self, track_id: u64, vector: FeatureVector) -> Result<(), RecognitionError> {
        if vector.is_degenerate() {
            return Ok(());
        }
        let now = Utc::now();
        let mut records = self.records.write().unwrap();
        records
            .entry(track_id)
            .and_modify(|r| {
                r.vector = vector.clone();
                r.updated_at = now;
            })
            .or_insert(FeatureRecord { vector, created_at: now, updated_at: now });
        Ok(())
    }

    async fn get(&self, track_id: u64) -> Result<Option<FeatureVector>, RecognitionError> {
        let records = self.records.read().unwrap();
        Ok(records.get(&track_id).map(|r| r.vector.clone()))
    }

    async fn load_all(&self) -> Result<HashMap<u64, FeatureVector>, RecognitionError> {
        let records = self.records.read().unwrap();
        Ok(records.iter().map(|(k, v)| (*k, v.vector.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hp(hash: u64, t: u32) -> HashedPeak {
        HashedPeak { hash, t_anchor: t }
    }

    #[tokio::test]
    async fn insert_then_delete_leaves_zero_count() {
        let store = InMemoryFingerprintStore::new();
        store.insert(7, &[hp(1, 0), hp(2, 10)]).await.unwrap();
        assert_eq!(store.count(7).await.unwrap(), 2);
        store.delete(7).await.unwrap();
        assert_eq!(store.count(7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reinsert_is_not_doubled() {
        let store = InMemoryFingerprintStore::new();
        let fps = vec![hp(1, 0), hp(2, 10)];
        store.insert(7, &fps).await.unwrap();
        store.insert(7, &fps).await.unwrap();
        assert_eq!(store.count(7).await.unwrap(), fps.len());
    }

    #[tokio::test]
    async fn get_by_hashes_returns_only_present_keys() {
        let store = InMemoryFingerprintStore::new();
        store.insert(1, &[hp(42, 0)]).await.unwrap();
        let result = store.get_by_hashes(&[42, 99]).await.unwrap();
        assert!(result.contains_key(&42));
        assert!(!result.contains_key(&99));
    }

    #[tokio::test]
    async fn empty_store_returns_empty_map() {
        let store = InMemoryFingerprintStore::new();
        let result = store.get_by_hashes(&[1, 2, 3]).await.unwrap();
        assert!(result.is_empty());
    }

    fn nonzero_vector(first: f32) -> FeatureVector {
        let mut v = [0.0f32; crate::features::FEATURE_LEN];
        v[0] = first;
        FeatureVector(v)
    }

    #[tokio::test]
    async fn feature_store_upsert_and_get() {
        let store = InMemoryFeatureStore::new();
        let v = nonzero_vector(1.0);
        store.upsert(5, v.clone()).await.unwrap();
        assert_eq!(store.get(5).await.unwrap(), Some(v));
        assert_eq!(store.get(6).await.unwrap(), None);
    }

    #[tokio::test]
    async fn feature_store_load_all_snapshots_every_track() {
        let store = InMemoryFeatureStore::new();
        store.upsert(1, nonzero_vector(1.0)).await.unwrap();
        store.upsert(2, nonzero_vector(0.5)).await.unwrap();
        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn degenerate_vector_is_never_indexed() {
        let store = InMemoryFeatureStore::new();
        store.upsert(5, FeatureVector::zeros()).await.unwrap();
        assert_eq!(store.get(5).await.unwrap(), None);
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn degenerate_upsert_does_not_clobber_existing_vector() {
        let store = InMemoryFeatureStore::new();
        let v = nonzero_vector(1.0);
        store.upsert(5, v.clone()).await.unwrap();
        store.upsert(5, FeatureVector::zeros()).await.unwrap();
        assert_eq!(store.get(5).await.unwrap(), Some(v));
    }
}
