// HLS playlist download: parsing, decryption, bounded fetching and output

pub mod coordinator;
pub mod decryption;
pub mod events;
pub mod fetcher;
pub mod output;
pub mod playlist;
pub mod processor;
pub mod scheduler;
pub mod storage;

// Re-exports for easier access
pub use coordinator::{PipelineReport, SegmentPipeline};
pub use decryption::{CipherError, decrypt};
pub use events::{OnProgress, PipelineEvent};
pub use fetcher::{Fetcher, HttpFetcher};
pub use output::{
    OutputIndex, concat_command, concat_list, local_playlist, write_concat_list,
    write_local_playlist,
};
pub use playlist::{Playlist, PlaylistParser, Segment, resolve_uri, url_directory};
pub use processor::{SegmentHandler, SegmentProcessor};
pub use scheduler::{BoundedLoader, FetchJob, LoaderStats, TaskOutcome};
pub use storage::{FsStorage, Storage};
