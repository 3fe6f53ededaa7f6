// Completion handling for fetched segments: decrypt when needed, store, index.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::hls::decryption;
use crate::hls::events::{OnProgress, PipelineEvent};
use crate::hls::output::OutputIndex;
use crate::hls::playlist::Segment;
use crate::hls::scheduler::FetchJob;
use crate::hls::storage::Storage;
use crate::{DownloadError, GrabConfig};

/// Runs after a job's body has been fetched and its slot released.
#[async_trait]
pub trait SegmentHandler: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn handle(&self, job: &FetchJob, data: Bytes) -> Result<Self::Output, DownloadError>;

    /// Called once for every job whose fetch or handling failed.
    fn on_failure(&self, _job: &FetchJob, _error: &DownloadError) {}
}

pub struct SegmentProcessor {
    segments: Arc<[Segment]>,
    key: Bytes,
    iv: Bytes,
    storage: Arc<dyn Storage>,
    index: Arc<OutputIndex>,
    config: Arc<GrabConfig>,
    on_progress: Option<OnProgress>,
}

impl SegmentProcessor {
    pub fn new(
        segments: Arc<[Segment]>,
        key: Bytes,
        iv: Bytes,
        storage: Arc<dyn Storage>,
        index: Arc<OutputIndex>,
        config: Arc<GrabConfig>,
    ) -> Self {
        Self {
            segments,
            key,
            iv,
            storage,
            index,
            config,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: Option<OnProgress>) -> Self {
        self.on_progress = on_progress;
        self
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(cb) = &self.on_progress {
            cb(event);
        }
    }

    fn segment(&self, job: &FetchJob) -> Result<&Segment, DownloadError> {
        self.segments
            .get(job.index)
            .ok_or_else(|| DownloadError::Task(format!("no segment at position {}", job.index)))
    }
}

#[async_trait]
impl SegmentHandler for SegmentProcessor {
    type Output = PathBuf;

    async fn handle(&self, job: &FetchJob, data: Bytes) -> Result<PathBuf, DownloadError> {
        let segment = self.segment(job)?;

        let data = if segment.encrypted && !self.key.is_empty() {
            let key = self.key.clone();
            let iv = self.iv.clone();
            let plain = tokio::task::spawn_blocking(move || decryption::decrypt(&data, &key, &iv))
                .await
                .map_err(|e| DownloadError::Task(e.to_string()))??;
            Bytes::from(plain)
        } else {
            data
        };

        let bytes = data.len();
        let path = self
            .storage
            .write(&self.config.segment_file_name(&segment.name), data)
            .await?;
        self.index.record(job.index, path.clone());

        debug!(index = job.index, name = %segment.name, bytes, "Segment stored");
        self.emit(PipelineEvent::SegmentStored {
            index: job.index,
            path: path.clone(),
            bytes,
        });
        Ok(path)
    }

    fn on_failure(&self, job: &FetchJob, error: &DownloadError) {
        self.emit(PipelineEvent::SegmentFailed {
            index: job.index,
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::storage::FsStorage;
    use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
    use reqwest::header::HeaderMap;
    use std::time::Duration;

    fn segment(name: &str, encrypted: bool) -> Segment {
        Segment {
            name: name.to_string(),
            uri: format!("http://h/{name}.ts"),
            duration_tag: "#EXTINF:2.0,".to_string(),
            encrypted,
        }
    }

    fn job(index: usize) -> FetchJob {
        FetchJob {
            index,
            url: String::new(),
            headers: HeaderMap::new(),
            timeout: Duration::ZERO,
        }
    }

    fn encrypt(plain: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
        let mut buf = vec![0u8; plain.len() + 16];
        buf[..plain.len()].copy_from_slice(plain);
        let len = cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plain.len())
            .unwrap()
            .len();
        buf.truncate(len);
        buf
    }

    #[tokio::test]
    async fn test_decrypts_only_encrypted_segments() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FsStorage::create(dir.path()).await.unwrap());
        let index = Arc::new(OutputIndex::default());
        let key = [7u8; 16];
        let iv = [1u8; 16];

        let segments: Arc<[Segment]> = vec![segment("a", true), segment("b", false)].into();
        let processor = SegmentProcessor::new(
            segments,
            Bytes::copy_from_slice(&key),
            Bytes::copy_from_slice(&iv),
            storage,
            index.clone(),
            Arc::new(GrabConfig::default()),
        );

        let cipher = Bytes::from(encrypt(b"secret payload", &key, &iv));
        let a = processor.handle(&job(0), cipher).await.unwrap();
        let b = processor
            .handle(&job(1), Bytes::from_static(b"clear"))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&a).unwrap(), b"secret payload");
        assert_eq!(std::fs::read(&b).unwrap(), b"clear");
        assert!(a.ends_with("a.ts"));
        assert_eq!(index.ordered_paths(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_bad_ciphertext_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FsStorage::create(dir.path()).await.unwrap());
        let index = Arc::new(OutputIndex::default());
        let processor = SegmentProcessor::new(
            vec![segment("a", true)].into(),
            Bytes::from_static(&[3u8; 16]),
            Bytes::new(),
            storage,
            index.clone(),
            Arc::new(GrabConfig::default()),
        );

        let err = processor
            .handle(&job(0), Bytes::from_static(b"not a block"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cipher(_)));
        assert!(index.is_empty());
        assert!(!dir.path().join("a.ts").exists());
    }
}
