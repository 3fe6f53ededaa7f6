use std::path::PathBuf;
use std::sync::Arc;

/// Progress notifications emitted while a playlist is downloaded.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Dispatch is about to start.
    Started { total: usize },
    /// The segment file already existed and was reused.
    SegmentSkipped { index: usize, path: PathBuf },
    SegmentStored {
        index: usize,
        path: PathBuf,
        bytes: usize,
    },
    SegmentFailed { index: usize, error: String },
}

pub type OnProgress = Arc<dyn Fn(PipelineEvent) + Send + Sync>;
