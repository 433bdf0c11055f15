//! Error types for synchronization passes

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::report::SyncReport;

/// The filesystem action that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Inspect,
    Compare,
    Copy,
    Update,
    Delete,
    Replace,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Inspect => "inspect",
            Self::Compare => "compare",
            Self::Copy => "copy",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Replace => "replace",
        };
        f.write_str(verb)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// A directory or entry vanished, or became unreadable, mid-pass
    #[error("{} vanished or is unreadable: {source}", .path.display())]
    Precondition {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: Operation,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("worker pool closed: {0}")]
    PoolClosed(#[from] tokio::sync::AcquireError),

    /// Aggregate of every per-entry failure in one pass
    #[error("{} entries failed to synchronize", .errors.len())]
    Incomplete {
        report: SyncReport,
        errors: Vec<SyncError>,
    },
}

impl SyncError {
    /// Classify an I/O failure on `path`: missing entries are precondition
    /// failures, everything else is an I/O failure of `op`.
    pub(crate) fn io(op: Operation, path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::Precondition { path, source }
        } else {
            Self::Io { op, path, source }
        }
    }

    /// Per-entry failures carried by this error (itself, unless aggregated)
    #[must_use]
    pub fn failures(&self) -> Vec<&SyncError> {
        match self {
            Self::Incomplete { errors, .. } => errors.iter().flat_map(Self::failures).collect(),
            other => vec![other],
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
