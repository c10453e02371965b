//! Error types for the blob store

use std::fmt;

/// Failures of the archive codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    /// The bytes are not a readable ZIP container
    Corrupt(String),
    /// The container is valid but holds no entries
    Empty,
    /// Writing the container failed
    Pack(String),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::Corrupt(msg) => write!(f, "Corrupt archive: {}", msg),
            ArchiveError::Empty => write!(f, "Archive contains no entries"),
            ArchiveError::Pack(msg) => write!(f, "Failed to pack archive: {}", msg),
        }
    }
}

impl std::error::Error for ArchiveError {}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        ArchiveError::Corrupt(err.to_string())
    }
}

#[derive(Debug)]
pub enum StoreError {
    MissingExtension,
    UnsupportedExtension(String),
    InvalidImage(String),
    NotFound(String),
    Archive(ArchiveError),
    Io(Box<std::io::Error>),
    Internal(String),
}

impl StoreError {
    /// True when stored data exists but cannot be read back as an image archive
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            StoreError::Archive(ArchiveError::Corrupt(_)) | StoreError::Archive(ArchiveError::Empty)
        )
    }

    /// True for failures caused by the upload's filename
    pub fn is_rejected_extension(&self) -> bool {
        matches!(
            self,
            StoreError::MissingExtension | StoreError::UnsupportedExtension(_)
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::MissingExtension => write!(f, "Filename has no extension"),
            StoreError::UnsupportedExtension(ext) => {
                write!(f, "Extension not allowed: {}", ext)
            }
            StoreError::InvalidImage(msg) => write!(f, "Invalid image: {}", msg),
            StoreError::NotFound(id) => write!(f, "Blob not found: {}", id),
            StoreError::Archive(err) => write!(f, "{}", err),
            StoreError::Io(err) => write!(f, "IO error: {}", err),
            StoreError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Archive(err) => Some(err),
            StoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<ArchiveError> for StoreError {
    fn from(err: ArchiveError) -> Self {
        StoreError::Archive(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Internal(format!("blocking task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_extension_display() {
        let err = StoreError::UnsupportedExtension("bmp".to_string());
        assert_eq!(format!("{}", err), "Extension not allowed: bmp");
    }

    #[test]
    fn test_archive_errors_count_as_corrupt() {
        assert!(StoreError::Archive(ArchiveError::Empty).is_corrupt());
        assert!(StoreError::Archive(ArchiveError::Corrupt("eocd".into())).is_corrupt());
        assert!(!StoreError::Archive(ArchiveError::Pack("full".into())).is_corrupt());
        assert!(!StoreError::NotFound("abc".into()).is_corrupt());
    }

    #[test]
    fn test_rejected_extension() {
        assert!(StoreError::MissingExtension.is_rejected_extension());
        assert!(StoreError::UnsupportedExtension("tiff".into()).is_rejected_extension());
        assert!(!StoreError::InvalidImage("eof".into()).is_rejected_extension());
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error;

        let err = StoreError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(err.source().is_some());
        assert!(format!("{}", err).contains("denied"));
    }
}
