//! Per-pass counters

use crate::event::SyncEvent;

/// Totals for one synchronization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub up_to_date: usize,
    pub files_copied: usize,
    pub files_updated: usize,
    pub files_deleted: usize,
    pub directories_copied: usize,
    pub directories_deleted: usize,
    pub entries_replaced: usize,
    /// Bytes written into the replica by copies, updates and replacements
    pub bytes_copied: u64,
}

impl SyncReport {
    /// Count one event
    pub fn record(&mut self, event: &SyncEvent) {
        let counter = match event {
            SyncEvent::FileUpToDate { .. } => &mut self.up_to_date,
            SyncEvent::FileCopied { .. } => &mut self.files_copied,
            SyncEvent::FileUpdated { .. } => &mut self.files_updated,
            SyncEvent::FileDeleted { .. } => &mut self.files_deleted,
            SyncEvent::DirectoryCopied { .. } => &mut self.directories_copied,
            SyncEvent::DirectoryDeleted { .. } => &mut self.directories_deleted,
            SyncEvent::EntryReplaced { .. } => &mut self.entries_replaced,
        };
        *counter += 1;
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: &Self) {
        self.up_to_date += other.up_to_date;
        self.files_copied += other.files_copied;
        self.files_updated += other.files_updated;
        self.files_deleted += other.files_deleted;
        self.directories_copied += other.directories_copied;
        self.directories_deleted += other.directories_deleted;
        self.entries_replaced += other.entries_replaced;
        self.bytes_copied += other.bytes_copied;
    }

    /// Number of actions that changed the replica
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.files_copied
            + self.files_updated
            + self.files_deleted
            + self.directories_copied
            + self.directories_deleted
            + self.entries_replaced
    }

    /// Number of events emitted, including up-to-date checks
    #[must_use]
    pub fn total(&self) -> usize {
        self.mutations() + self.up_to_date
    }
}
