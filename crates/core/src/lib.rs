//! treemirror-core: one-way directory mirroring
//!
//! Lists a source and a replica directory, classifies their children by name,
//! and applies copies, updates and deletions to the replica until it matches
//! the source. Every completed action is reported to an [`EventSink`].

pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fsops;
pub mod hash;
pub mod report;

pub use compare::{Classification, FolderSnapshot, classify};
pub use config::{MirrorConfig, Settings};
pub use engine::SyncEngine;
pub use error::{Operation, SyncError};
pub use event::{EventSink, RecordingSink, SyncEvent};
pub use hash::{Comparison, ContentHash, compare_files, files_equal};
pub use report::SyncReport;
