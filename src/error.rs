//! Error types for the capture service

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, rendering, or serving a capture
#[derive(Error, Debug)]
pub enum Error {
    /// The request was rejected before any browser was launched
    #[error("{0}")]
    ValidationError(String),

    /// Failed to launch the browser or open a page
    #[error("Browser initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load the target URL (unreachable, timeout, invalid URL)
    #[error("Failed to load URL: {0}")]
    NavigationError(String),

    /// The screenshot step failed or returned no data
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// Invalid configuration (startup only)
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// CDP-specific error
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status code this error is reported with.
    ///
    /// Only input validation failures are the caller's fault; everything else
    /// is a rendering or internal failure.
    pub fn status(&self) -> u16 {
        match self {
            Error::ValidationError(_) => 400,
            _ => 500,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::ValidationError(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(format!("{:#}", err))
    }
}
