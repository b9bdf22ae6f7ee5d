use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Annotation error: {0}")]
    AnnotationError(#[from] rally_annotations::AnnotationError),

    #[error("Not a rally folder: {}", .0.display())]
    NotARally(PathBuf),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Failures worth another attempt: I/O errors other than a missing file or bad input
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::IoError(err) => !matches!(
                err.kind(),
                ErrorKind::NotFound | ErrorKind::InvalidInput | ErrorKind::InvalidData
            ),
            _ => false,
        }
    }
}
