use thiserror::Error;

/// Result type for annotation operations
pub type Result<T> = std::result::Result<T, AnnotationError>;

/// Errors raised by the annotation codecs
#[derive(Error, Debug)]
pub enum AnnotationError {
    /// Interchange document is not valid JSON or does not match the schema
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Interchange document parsed but carries unusable content
    #[error("Schema error: {0}")]
    Schema(String),

    /// Bounding box rejected by geometry validation
    #[error("Invalid bounding box: {0}")]
    InvalidBox(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl AnnotationError {
    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create an invalid box error
    pub fn invalid_box(msg: impl Into<String>) -> Self {
        Self::InvalidBox(msg.into())
    }
}
