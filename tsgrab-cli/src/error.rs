use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] tsgrab_engine::DownloadError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Manifest download failed: {0}")]
    ManifestOnly(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Mux failed: {0}")]
    Mux(String),
}

impl AppError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::InvalidInput(_) | AppError::Initialization(_) => 1,
            AppError::InvalidHeader(_) => 2,
            AppError::ManifestOnly(_) => 3,
            AppError::Io(_) | AppError::Download(_) => 4,
            AppError::Mux(_) => 5,
        }
    }
}
