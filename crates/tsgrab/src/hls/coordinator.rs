// Segment pipeline: turns a parsed playlist into position-ordered local files.
//
// Segments whose output file already exists are reused without a fetch; the
// rest are dispatched through the bounded loader. A failed segment is logged
// and left out of the result, the run only fails when nothing was produced.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::hls::events::{OnProgress, PipelineEvent};
use crate::hls::fetcher::Fetcher;
use crate::hls::output::OutputIndex;
use crate::hls::playlist::Playlist;
use crate::hls::processor::SegmentProcessor;
use crate::hls::scheduler::{BoundedLoader, FetchJob, LoaderStats};
use crate::hls::storage::Storage;
use crate::{DownloadError, GrabConfig};

#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Output files in playlist order, failed positions omitted.
    pub paths: Vec<PathBuf>,
    pub total: usize,
    /// Segments served from files left by an earlier run.
    pub resumed: usize,
    pub stats: LoaderStats,
}

impl PipelineReport {
    pub fn failed(&self) -> usize {
        self.total - self.paths.len()
    }
}

pub struct SegmentPipeline {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn Storage>,
    config: Arc<GrabConfig>,
    on_progress: Option<OnProgress>,
}

impl SegmentPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, storage: Arc<dyn Storage>, config: GrabConfig) -> Self {
        Self {
            fetcher,
            storage,
            config: Arc::new(config),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: OnProgress) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(cb) = &self.on_progress {
            cb(event);
        }
    }

    pub async fn run(&self, playlist: &Playlist) -> Result<PipelineReport, DownloadError> {
        let total = playlist.len();
        info!(
            segments = total,
            encrypted = !playlist.key.is_empty(),
            "Starting segment download"
        );
        debug!(
            key = %hex::encode(&playlist.key),
            iv = %hex::encode(&playlist.iv),
            "Playlist key material"
        );
        self.emit(PipelineEvent::Started { total });

        let index = Arc::new(OutputIndex::default());
        let segments: Arc<[_]> = playlist.segments.clone().into();
        let processor = SegmentProcessor::new(
            Arc::clone(&segments),
            playlist.key.clone(),
            playlist.iv.clone(),
            Arc::clone(&self.storage),
            Arc::clone(&index),
            Arc::clone(&self.config),
        )
        .with_progress(self.on_progress.clone());

        let mut loader = BoundedLoader::new(
            Arc::clone(&self.fetcher),
            Arc::new(processor),
            self.config.effective_parallelism(),
        );

        let mut resumed = 0;
        for (position, segment) in segments.iter().enumerate() {
            let file_name = self.config.segment_file_name(&segment.name);
            if self.storage.exists(&file_name).await {
                let path = self.storage.path_of(&file_name);
                debug!(index = position, path = %path.display(), "Reusing existing segment");
                index.record(position, path.clone());
                self.emit(PipelineEvent::SegmentSkipped {
                    index: position,
                    path,
                });
                resumed += 1;
                continue;
            }

            loader
                .submit(FetchJob {
                    index: position,
                    url: segment.uri.clone(),
                    headers: self.config.headers.clone(),
                    timeout: self.config.segment_timeout,
                })
                .await?;
        }

        loader.await_all().await;
        let stats = loader.stats();

        info!(
            success = stats.success_count,
            failed = stats.failure_count,
            resumed,
            elapsed_ms = stats.elapsed().as_millis() as u64,
            "Segment download finished"
        );
        if stats.failure_count > 0 {
            warn!(
                failed = stats.failure_count,
                "Some segments failed and are missing from the output"
            );
        }

        if index.is_empty() {
            return Err(DownloadError::NoSegments);
        }

        Ok(PipelineReport {
            paths: index.ordered_paths(),
            total,
            resumed,
            stats,
        })
    }
}
