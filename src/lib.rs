//! Cadence Engine — audio fingerprinting, recognition, and similarity
//! recommendation.
//!
//! The crate covers the CORE described by the design: turning a raw
//! waveform into a constellation fingerprint or a perceptual feature
//! vector, matching those against a persisted index, and ranking acoustic
//! neighbors. The relational catalog, authentication, HTTP surface, file
//! uploads, and noise reduction are external collaborators reached only
//! through the [`catalog::CatalogLookup`], [`blob::BlobStore`], and
//! [`tasks::TaskQueue`] trait seams.
//!
//! # Usage
//!
//! ```no_run
//! use cadence_engine::config::Params;
//! use cadence_engine::store::{InMemoryFingerprintStore, InMemoryFeatureStore};
//! use cadence_engine::catalog::InMemoryCatalog;
//! use cadence_engine::blob::FilesystemBlobStore;
//! use cadence_engine::similarity::SimilarityEngine;
//! use cadence_engine::orchestrator::Orchestrator;
//! use cadence_engine::types::MatchStrategy;
//!
//! # async fn run() {
//! let params = Params::default();
//! let fingerprints = InMemoryFingerprintStore::new();
//! let features = InMemoryFeatureStore::new();
//! let similarity = SimilarityEngine::empty();
//! let catalog = InMemoryCatalog::new();
//! let blobs = FilesystemBlobStore::new(params.sr);
//!
//! let config = cadence_engine::config::Config::default();
//! let orchestrator = Orchestrator::new(&fingerprints, &similarity, &catalog, &blobs, &params, config.task_timeout_sec);
//! let _ = orchestrator.recognize("/tmp/clip.pcm", MatchStrategy::Hybrid).await;
//! # let _ = features;
//! # }
//! ```

pub mod blob;
pub mod catalog;
pub mod config;
pub mod constellation;
pub mod error;
pub mod features;
pub mod matcher;
pub mod orchestrator;
pub mod similarity;
pub mod spectrogram;
pub mod store;
pub mod tasks;
pub mod types;

pub use config::{Config, Params};
pub use error::RecognitionError;
pub use types::{MatchStrategy, RecognitionCandidate, RecognitionResult, RecognitionStatus};
