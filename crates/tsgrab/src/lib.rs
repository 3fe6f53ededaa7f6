//! # tsgrab
//!
//! A library for downloading segmented HLS playlists into ordered local files.
//!
//! ## Features
//!
//! - Master playlist resolution with bounded variant recursion
//! - AES-128 (CBC) segment decryption with permissive padding removal
//! - Bounded-concurrency segment fetching with per-run statistics
//! - Resumable runs that reuse segment files already on disk
//! - ffmpeg concat list and local playlist generation

pub mod builder;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hls;

pub use builder::GrabConfigBuilder;
pub use config::{ClientConfig, GrabConfig};
pub use error::DownloadError;

pub use downloader::create_client;

pub use hls::{
    BoundedLoader, CipherError, FetchJob, Fetcher, FsStorage, HttpFetcher, LoaderStats,
    OnProgress, OutputIndex, PipelineEvent, PipelineReport, Playlist, PlaylistParser, Segment,
    SegmentHandler, SegmentPipeline, SegmentProcessor, Storage, TaskOutcome, concat_command,
    decrypt, resolve_uri, url_directory, write_concat_list, write_local_playlist,
};
