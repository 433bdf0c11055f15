//! Folder snapshots and the three-way name classification between a source
//! directory and its replica

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::Path;

use crate::error::{Result, SyncError};

/// The immediate children of one directory, listed once per visit
#[derive(Debug, Clone)]
pub struct FolderSnapshot {
    entries: BTreeSet<OsString>,
}

impl FolderSnapshot {
    /// List `path` without recursing
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read
    pub fn capture(path: &Path) -> io::Result<Self> {
        let mut entries = BTreeSet::new();
        for entry in std::fs::read_dir(path)? {
            entries.insert(entry?.file_name());
        }
        Ok(Self { entries })
    }

    /// Create a snapshot from known names
    #[must_use]
    pub fn from_names<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<OsString>,
    {
        Self {
            entries: names.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, name: &OsStr) -> bool {
        self.entries.contains(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Partition of child names between a source and a replica directory.
///
/// Names are compared exactly, byte for byte; each name lands in exactly
/// one of the three lists, which are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Present only in the source: copy to the replica
    pub source_only: Vec<OsString>,
    /// Present only in the replica: delete from the replica
    pub replica_only: Vec<OsString>,
    /// Present in both: recurse or compare
    pub in_both: Vec<OsString>,
}

impl Classification {
    #[must_use]
    pub fn of(source: &FolderSnapshot, replica: &FolderSnapshot) -> Self {
        Self {
            source_only: source.entries.difference(&replica.entries).cloned().collect(),
            replica_only: replica.entries.difference(&source.entries).cloned().collect(),
            in_both: source.entries.intersection(&replica.entries).cloned().collect(),
        }
    }

    /// Total number of distinct names
    #[must_use]
    pub fn len(&self) -> usize {
        self.source_only.len() + self.replica_only.len() + self.in_both.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// List both directories and classify their children.
///
/// # Errors
/// Returns [`SyncError::Precondition`] if either directory cannot be listed
pub fn classify(source_dir: &Path, replica_dir: &Path) -> Result<Classification> {
    let source = capture(source_dir)?;
    let replica = capture(replica_dir)?;
    Ok(Classification::of(&source, &replica))
}

fn capture(dir: &Path) -> Result<FolderSnapshot> {
    FolderSnapshot::capture(dir).map_err(|source| SyncError::Precondition {
        path: dir.to_path_buf(),
        source,
    })
}
