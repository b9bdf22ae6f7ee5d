use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Color sampling failed for {path}: {reason}")]
    Sampling { path: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl AnalysisError {
    pub fn sampling(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Sampling {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
