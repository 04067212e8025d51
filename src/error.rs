//! Error types for the studio engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, StudioError>;

/// Failures that reject a whole operation before it mutates anything.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StudioError {
    /// An upload was refused (wrong MIME type, oversize file)
    #[error("Invalid upload: {0}")]
    Validation(String),

    /// Export requested before there is anything to export from
    #[error("Export is not ready: {0}")]
    ExportNotReady(String),

    /// The off-screen drawing surface could not be allocated
    #[error("Failed to allocate a {width}x{height} drawing surface")]
    Surface { width: u32, height: u32 },

    /// The composed surface could not be encoded
    #[error("PNG encoding failed: {0}")]
    Encode(String),

    /// A persisted snapshot could not be read or written
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The packaging collaborator refused the exported set
    #[error("Packaging failed: {0}")]
    Packaging(String),
}

/// Failures local to a single image resource. These are contained: the
/// entity that needed the image is skipped and drawing continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Loading {url} timed out after {millis}ms")]
    TimedOut { url: String, millis: u64 },

    #[error("No image data available for {0}")]
    Missing(String),
}

impl ResourceError {
    pub fn url(&self) -> &str {
        match self {
            ResourceError::Fetch { url, .. }
            | ResourceError::Decode { url, .. }
            | ResourceError::TimedOut { url, .. } => url,
            ResourceError::Missing(url) => url,
        }
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(err: serde_json::Error) -> Self {
        StudioError::Snapshot(err.to_string())
    }
}
