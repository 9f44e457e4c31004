//! Failure taxonomy for the copy engine.
//!
//! Nothing here is process-fatal. Each kind maps to one recovery rule:
//! - Io: the single file is skipped, the run continues
//! - VerificationMismatch: the target is deleted, the run continues
//! - Packaging: the directory falls back to per-file copies
//! - DirectoryCreate: the subtree below the directory is abandoned

use std::fmt;
use std::io;
use std::path::PathBuf;

/// How an I/O failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The thing we wanted already exists; treat as success.
    AlreadyExists,
    /// Terminal for this file or directory. There are no retries.
    Fatal,
}

#[derive(Debug)]
pub enum CopyError {
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    VerificationMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    Packaging {
        dir: PathBuf,
        message: String,
    },
    DirectoryCreate {
        path: PathBuf,
        source: io::Error,
    },
}

impl CopyError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn packaging(dir: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Packaging {
            dir: dir.into(),
            message: message.into(),
        }
    }

    /// Short operation label used when routing the failure to a reporter.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Io { op, .. } => op,
            Self::VerificationMismatch { .. } => "verify",
            Self::Packaging { .. } => "package",
            Self::DirectoryCreate { .. } => "mkdir",
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. }
            | Self::VerificationMismatch { path, .. }
            | Self::DirectoryCreate { path, .. } => path,
            Self::Packaging { dir, .. } => dir,
        }
    }
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { op, path, source } => write!(f, "{op} {}: {source}", path.display()),
            Self::VerificationMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "verification failed for {}: expected md5 {expected}, got {actual}",
                path.display()
            ),
            Self::Packaging { dir, message } => {
                write!(f, "packaging {} failed: {message}", dir.display())
            }
            Self::DirectoryCreate { path, source } => {
                write!(f, "failed to create directory {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for CopyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } | Self::DirectoryCreate { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Categorize an IO error.
pub fn categorize_io_error(err: &io::Error) -> ErrorCategory {
    match err.kind() {
        io::ErrorKind::AlreadyExists => ErrorCategory::AlreadyExists,
        _ => ErrorCategory::Fatal,
    }
}

pub type CopyResult<T> = std::result::Result<T, CopyError>;
