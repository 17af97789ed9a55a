//! Store error types.

use std::io;
use thiserror::Error;

use crate::types::Ino;

/// Store error type.
///
/// Every public operation returns one of these kinds. Faults from the
/// backing engine are folded into [`StoreError::Internal`] so callers never
/// see an unclassified error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No such inode or name binding.
    #[error("not found: {0}")]
    NotFound(String),

    /// Name already bound in the target directory.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a regular file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory still has children.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Inode cannot be removed (the tenant root).
    #[error("resource busy: {0}")]
    Busy(String),

    /// Malformed argument (bad name, empty token).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// File name too long.
    #[error("file name too long")]
    NameTooLong,

    /// Write would extend past the largest representable offset.
    #[error("file too large")]
    FileTooLarge,

    /// Backing store failure or any unexpected fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create a NotFound error for an inode number.
    pub fn ino_not_found(ino: Ino) -> Self {
        Self::NotFound(format!("ino {ino}"))
    }

    /// Create a NotFound error for a name binding.
    pub fn entry_not_found(parent: Ino, name: &str) -> Self {
        Self::NotFound(format!("{name:?} in {parent}"))
    }

    /// Create an AlreadyExists error for a name binding.
    pub fn already_exists(parent: Ino, name: &str) -> Self {
        Self::AlreadyExists(format!("{name:?} in {parent}"))
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(ino: Ino) -> Self {
        Self::NotADirectory(format!("ino {ino}"))
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(ino: Ino) -> Self {
        Self::IsADirectory(format!("ino {ino}"))
    }

    /// Create a NotEmpty error.
    pub fn not_empty(ino: Ino) -> Self {
        Self::NotEmpty(format!("ino {ino}"))
    }

    /// Create a Busy error.
    pub fn busy(ino: Ino) -> Self {
        Self::Busy(format!("ino {ino}"))
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an Internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for backing-store faults as opposed to domain failures.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// POSIX errno for this kind, as expected by the filesystem driver.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => 2,
            Self::AlreadyExists(_) => 17,
            Self::NotADirectory(_) => 20,
            Self::IsADirectory(_) => 21,
            Self::NotEmpty(_) => 39,
            Self::Busy(_) => 16,
            Self::InvalidArgument(_) => 22,
            Self::NameTooLong => 36,
            Self::FileTooLarge => 27,
            Self::Internal(_) => 5,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Internal(format!("sqlite: {e}"))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {e}"))
    }
}

/// Convert StoreError to std::io::Error for compatibility.
impl From<StoreError> for io::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            StoreError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            StoreError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            StoreError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            StoreError::NotEmpty(msg) => io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg),
            StoreError::Busy(msg) => io::Error::new(io::ErrorKind::ResourceBusy, msg),
            StoreError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            StoreError::NameTooLong => {
                io::Error::new(io::ErrorKind::InvalidInput, "file name too long")
            }
            StoreError::FileTooLarge => io::Error::new(io::ErrorKind::FileTooLarge, "file too large"),
            StoreError::Internal(msg) => io::Error::other(msg),
        }
    }
}

/// Store result type.
pub type StoreResult<T> = Result<T, StoreError>;
