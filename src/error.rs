use thiserror::Error;

/// Every caller-facing failure in snapb64.
///
/// `Display` output is a single sentence meant to be shown to a user as-is.
#[derive(Debug, Error)]
pub enum SnapError {
    #[error("{0}")]
    Fetch(String),

    #[error("No photos found in the collection.")]
    NoPhotosFound,

    #[error("Failed to encode image data: {0}")]
    Encoding(String),

    #[error("{0}")]
    Classification(String),

    #[error("Could not detect image type from the Base64 data.")]
    UnrecognizedFormat,

    #[error("{0}")]
    InvalidPayload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapError {
    /// Short machine-friendly label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SnapError::Fetch(_) | SnapError::Http(_) => "fetch_failure",
            SnapError::NoPhotosFound => "no_photos_found",
            SnapError::Encoding(_) => "encoding_failure",
            SnapError::Classification(_) => "classification_failure",
            SnapError::UnrecognizedFormat => "unrecognized_format",
            SnapError::InvalidPayload(_) => "invalid_payload",
            SnapError::Config(_) => "config",
            SnapError::Storage(_) => "storage",
            SnapError::Json(_) => "json",
            SnapError::Io(_) => "io",
        }
    }
}
