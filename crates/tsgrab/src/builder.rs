//! # Builder for GrabConfig
//!
//! Fluent construction of a [`GrabConfig`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tsgrab_engine::GrabConfig;
//!
//! let config = GrabConfig::builder()
//!     .with_max_parallel(8)
//!     .with_segment_timeout(Duration::from_secs(10))
//!     .with_header("Referer", "https://example.com/")
//!     .with_work_dir("cache")
//!     .build();
//!
//! assert_eq!(config.effective_parallelism(), 8);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::GrabConfig;

/// Builder for creating GrabConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct GrabConfigBuilder {
    config: GrabConfig,
}

impl GrabConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: GrabConfig::default(),
        }
    }

    /// Set the maximum number of concurrent segment fetches (0 = default)
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.config.max_parallel = max_parallel;
        self
    }

    /// Set the per-segment request deadline (zero = none)
    pub fn with_segment_timeout(mut self, timeout: Duration) -> Self {
        self.config.segment_timeout = timeout;
        self
    }

    /// Set the deadline for key and variant playlist requests (zero = none)
    pub fn with_playlist_timeout(mut self, timeout: Duration) -> Self {
        self.config.playlist_timeout = timeout;
        self
    }

    pub fn with_max_variant_depth(mut self, depth: usize) -> Self {
        self.config.max_variant_depth = depth;
        self
    }

    /// Add a request header. Invalid names or values are dropped with a warning.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match (
            name.as_ref().parse::<HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.config.headers.insert(name, value);
            }
            _ => warn!(
                "Ignoring invalid header '{}: {}'",
                name.as_ref(),
                value.as_ref()
            ),
        }
        self
    }

    /// Merge headers into the current set; later values win
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.config.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = work_dir.into();
        self
    }

    pub fn with_segment_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.segment_extension = extension.into();
        self
    }

    /// Build the GrabConfig instance
    pub fn build(self) -> GrabConfig {
        self.config
    }
}

impl Default for GrabConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
