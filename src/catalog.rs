//! `CatalogLookup` (spec §6): the external collaborator that maps a
//! `track_id` to display metadata. The relational catalog itself (tracks,
//! artists, albums, users, playlists, history) is out of scope for this
//! crate; only the lookup seam lives here.

use async_trait::async_trait;

/// Metadata the Orchestrator enriches a candidate with. Missing fields are
/// omitted from the result, never null-filled (spec §4.H step 5).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist_id: u64,
    pub artist_name: Option<String>,
    pub album_id: Option<u64>,
    pub album_name: Option<String>,
    pub album_image: Option<String>,
}

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn get_track(&self, track_id: u64) -> Option<TrackMetadata>;
}

/// `HashMap`-backed reference implementation, useful for tests and for
/// embedding the engine without a real catalog service.
pub struct InMemoryCatalog {
    tracks: std::collections::HashMap<u64, TrackMetadata>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self { tracks: std::collections::HashMap::new() }
    }

    pub fn insert(&mut self, track_id: u64, metadata: TrackMetadata) {
        self.tracks.insert(track_id, metadata);
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn get_track(&self, track_id: u64) -> Option<TrackMetadata> {
        self.tracks.get(&track_id).cloned()
    }
}
