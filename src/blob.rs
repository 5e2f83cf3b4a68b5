//! `BlobStore` (spec §1/§6): the external collaborator that hands the
//! Orchestrator decoded PCM for a path and reclaims the temp file
//! afterward. Upload handling, format decoding, and actual storage belong
//! to the host application; this crate only specifies the seam.

use async_trait::async_trait;

use crate::error::RecognitionError;
use crate::spectrogram::Waveform;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Load a decoded PCM blob at `path` into a mono waveform.
    async fn load(&self, path: &str) -> Result<Waveform, RecognitionError>;

    /// Reclaim the temp file at `path`. Called unconditionally by the
    /// Orchestrator on every exit path (success, no-match, or error).
    async fn delete(&self, path: &str) -> Result<(), RecognitionError>;
}

/// Reference implementation backed by the local filesystem, reading raw
/// little-endian `f32` PCM samples at a fixed declared sample rate. Host
/// applications with a real decoding boundary (WAV/FLAC/MP3/OGG) supply
/// their own `BlobStore`.
pub struct FilesystemBlobStore {
    pub sample_rate: u32,
}

impl FilesystemBlobStore {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn load(&self, path: &str) -> Result<Waveform, RecognitionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RecognitionError::InputDecode(e.to_string()))?;
        if bytes.len() % 4 != 0 {
            return Err(RecognitionError::InputDecode("blob length not a multiple of 4 bytes".into()));
        }
        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Waveform::new(samples, self.sample_rate))
    }

    async fn delete(&self, path: &str) -> Result<(), RecognitionError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RecognitionError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_written_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.pcm");
        let samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        tokio::fs::write(&path, &bytes).await.unwrap();

        let store = FilesystemBlobStore::new(22050);
        let path_str = path.to_str().unwrap();
        let waveform = store.load(path_str).await.unwrap();
        assert_eq!(waveform.samples, samples);

        store.delete(path_str).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn delete_of_missing_path_is_ok() {
        let store = FilesystemBlobStore::new(22050);
        store.delete("/tmp/does-not-exist-sonica-test.pcm").await.unwrap();
    }
}
