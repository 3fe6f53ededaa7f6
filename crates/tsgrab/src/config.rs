use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Concurrency used when none (or zero) is configured.
pub const DEFAULT_MAX_PARALLEL: usize = 5;

/// Maximum number of nested variant playlists followed before giving up.
pub const DEFAULT_MAX_VARIANT_DEPTH: usize = 8;

/// Options for the shared HTTP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Headers sent with every request made by the client
    pub default_headers: HeaderMap,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: ClientConfig::get_default_headers(),
        }
    }
}

impl ClientConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers
    }
}

/// Configuration of a single playlist download run
#[derive(Debug, Clone)]
pub struct GrabConfig {
    /// Maximum number of segment fetches in flight. Zero means the default.
    pub max_parallel: usize,

    /// Deadline for each segment request. Zero disables the deadline.
    pub segment_timeout: Duration,

    /// Deadline for key and variant playlist requests. Zero disables the deadline.
    pub playlist_timeout: Duration,

    /// Maximum nesting of variant playlists
    pub max_variant_depth: usize,

    /// Extra headers attached to every request of the run
    pub headers: HeaderMap,

    /// Directory segments and generated files are written to
    pub work_dir: PathBuf,

    /// Extension given to stored segment files
    pub segment_extension: String,
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            segment_timeout: Duration::from_secs(5),
            playlist_timeout: Duration::ZERO,
            max_variant_depth: DEFAULT_MAX_VARIANT_DEPTH,
            headers: HeaderMap::new(),
            work_dir: PathBuf::from("m3u8cache"),
            segment_extension: "ts".to_owned(),
        }
    }
}

impl GrabConfig {
    pub fn builder() -> crate::builder::GrabConfigBuilder {
        crate::builder::GrabConfigBuilder::new()
    }

    /// Concurrency limit with the zero-means-default rule applied.
    pub fn effective_parallelism(&self) -> usize {
        if self.max_parallel == 0 {
            DEFAULT_MAX_PARALLEL
        } else {
            self.max_parallel
        }
    }

    /// File name a segment is stored under inside the work directory.
    pub fn segment_file_name(&self, segment_name: &str) -> String {
        format!("{segment_name}.{}", self.segment_extension)
    }
}
