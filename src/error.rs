//! Errors arising during operator construction and from collaborator interfaces.

use std::{error, fmt, io, path::PathBuf, result};

/// Convenience alias for results carrying a [`RegistrationError`].
pub type Result<T> = result::Result<T, RegistrationError>;

/// The failure conditions of operator construction and its collaborators.
///
/// `Precondition` failures are recoverable by correcting the caller's inputs
/// and are always reported before any parallel work has started. The
/// remaining variants are fatal for the operation (or, for
/// `BackendCollective`, for the entire process group) that encountered them.
#[derive(Debug)]
pub enum RegistrationError {
    /// Caller-supplied inputs violated a documented precondition.
    Precondition(String),
    /// A required configuration option was missing or malformed.
    Configuration(String),
    /// A file required for the operation does not exist.
    FileNotFound(PathBuf),
    /// An underlying I/O operation failed.
    Io(io::Error),
    /// The collective assembly call failed for the whole process group.
    BackendCollective(String),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precondition(message) => write!(f, "Precondition violated: {}", message),
            Self::Configuration(message) => write!(f, "Configuration error: {}", message),
            Self::FileNotFound(file_path) => {
                write!(f, "File {} does not exist", file_path.display())
            }
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::BackendCollective(message) => {
                write!(f, "Collective assembly failed: {}", message)
            }
        }
    }
}

impl error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RegistrationError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
