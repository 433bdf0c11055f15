//! Synchronization events and the sink that consumes them

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::Settings;

/// One completed action against the replica
///
/// Every variant carries the absolute source path and replica path of the
/// entry involved. For deletions the source path is where the entry would
/// have been in the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    FileUpToDate { source: PathBuf, replica: PathBuf },
    FileCopied { source: PathBuf, replica: PathBuf },
    FileUpdated { source: PathBuf, replica: PathBuf },
    FileDeleted { source: PathBuf, replica: PathBuf },
    DirectoryCopied { source: PathBuf, replica: PathBuf },
    DirectoryDeleted { source: PathBuf, replica: PathBuf },
    /// The replica entry had the wrong type (file vs directory) and was
    /// removed and recreated from the source
    EntryReplaced { source: PathBuf, replica: PathBuf },
}

impl SyncEvent {
    #[must_use]
    pub fn source(&self) -> &Path {
        match self {
            Self::FileUpToDate { source, .. }
            | Self::FileCopied { source, .. }
            | Self::FileUpdated { source, .. }
            | Self::FileDeleted { source, .. }
            | Self::DirectoryCopied { source, .. }
            | Self::DirectoryDeleted { source, .. }
            | Self::EntryReplaced { source, .. } => source,
        }
    }

    #[must_use]
    pub fn replica(&self) -> &Path {
        match self {
            Self::FileUpToDate { replica, .. }
            | Self::FileCopied { replica, .. }
            | Self::FileUpdated { replica, .. }
            | Self::FileDeleted { replica, .. }
            | Self::DirectoryCopied { replica, .. }
            | Self::DirectoryDeleted { replica, .. }
            | Self::EntryReplaced { replica, .. } => replica,
        }
    }

    /// Whether this event changed the replica
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::FileUpToDate { .. })
    }
}

/// Receiver of synchronization events.
///
/// Implementations render or persist events; they must not fail back into
/// the engine. The engine only calls [`EventSink::record`], which fans out to
/// the per-event methods.
pub trait EventSink: Send + Sync {
    fn file_up_to_date(&self, source: &Path, replica: &Path);
    fn file_copied(&self, source: &Path, replica: &Path);
    fn file_updated(&self, source: &Path, replica: &Path);
    fn file_deleted(&self, source: &Path, replica: &Path);
    fn directory_copied(&self, source: &Path, replica: &Path);
    fn directory_deleted(&self, source: &Path, replica: &Path);
    fn entry_replaced(&self, source: &Path, replica: &Path);

    /// Announce the start of a run with its settings
    fn sync_started(&self, settings: &Settings);

    /// A root folder was missing and has been created
    fn folder_created(&self, path: &Path);

    /// The run was interrupted between passes
    fn terminated_manually(&self);

    fn error(&self, message: &str);

    fn record(&self, event: &SyncEvent) {
        match event {
            SyncEvent::FileUpToDate { source, replica } => self.file_up_to_date(source, replica),
            SyncEvent::FileCopied { source, replica } => self.file_copied(source, replica),
            SyncEvent::FileUpdated { source, replica } => self.file_updated(source, replica),
            SyncEvent::FileDeleted { source, replica } => self.file_deleted(source, replica),
            SyncEvent::DirectoryCopied { source, replica } => {
                self.directory_copied(source, replica);
            }
            SyncEvent::DirectoryDeleted { source, replica } => {
                self.directory_deleted(source, replica);
            }
            SyncEvent::EntryReplaced { source, replica } => self.entry_replaced(source, replica),
        }
    }
}

/// Sink that keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<SyncEvent> {
        std::mem::take(&mut *lock(&self.events))
    }

    #[must_use]
    pub fn events(&self) -> Vec<SyncEvent> {
        lock(&self.events).clone()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    fn push(&self, event: SyncEvent) {
        lock(&self.events).push(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl EventSink for RecordingSink {
    fn file_up_to_date(&self, source: &Path, replica: &Path) {
        self.push(SyncEvent::FileUpToDate {
            source: source.to_path_buf(),
            replica: replica.to_path_buf(),
        });
    }

    fn file_copied(&self, source: &Path, replica: &Path) {
        self.push(SyncEvent::FileCopied {
            source: source.to_path_buf(),
            replica: replica.to_path_buf(),
        });
    }

    fn file_updated(&self, source: &Path, replica: &Path) {
        self.push(SyncEvent::FileUpdated {
            source: source.to_path_buf(),
            replica: replica.to_path_buf(),
        });
    }

    fn file_deleted(&self, source: &Path, replica: &Path) {
        self.push(SyncEvent::FileDeleted {
            source: source.to_path_buf(),
            replica: replica.to_path_buf(),
        });
    }

    fn directory_copied(&self, source: &Path, replica: &Path) {
        self.push(SyncEvent::DirectoryCopied {
            source: source.to_path_buf(),
            replica: replica.to_path_buf(),
        });
    }

    fn directory_deleted(&self, source: &Path, replica: &Path) {
        self.push(SyncEvent::DirectoryDeleted {
            source: source.to_path_buf(),
            replica: replica.to_path_buf(),
        });
    }

    fn entry_replaced(&self, source: &Path, replica: &Path) {
        self.push(SyncEvent::EntryReplaced {
            source: source.to_path_buf(),
            replica: replica.to_path_buf(),
        });
    }

    fn sync_started(&self, _settings: &Settings) {}

    fn folder_created(&self, _path: &Path) {}

    fn terminated_manually(&self) {}

    fn error(&self, message: &str) {
        lock(&self.errors).push(message.to_string());
    }
}
