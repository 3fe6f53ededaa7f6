use reqwest::StatusCode;

use crate::hls::decryption::CipherError;

// Error type shared by the parser, loader and pipeline
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Playlist error: {0}")]
    Playlist(String),

    #[error("Decryption error: {0}")]
    Cipher(#[from] CipherError),

    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server returned status code {status} for {url}")]
    StatusCode { status: StatusCode, url: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No segments were produced")]
    NoSegments,

    #[error("Segment task failed: {0}")]
    Task(String),
}

impl DownloadError {
    pub fn playlist(msg: impl Into<String>) -> Self {
        DownloadError::Playlist(msg.into())
    }

    /// Whether the error came from the transport rather than local processing.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            DownloadError::Network(_) | DownloadError::StatusCode { .. }
        )
    }
}
