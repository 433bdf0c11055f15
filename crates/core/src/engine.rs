//! The synchronization engine: applies a [`Classification`] to the replica,
//! recursing into directories present on both sides.
//!
//! Each directory visit lists both sides once, then spawns one task per child
//! entry and waits for all of them before returning. Every filesystem
//! operation runs on the blocking pool while holding a permit from a shared
//! semaphore, which bounds in-flight I/O however wide or deep the tree is.
//! Permits are never held across a recursive visit.

use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::compare::{Classification, classify};
use crate::config::DEFAULT_JOBS;
use crate::error::{Operation, Result, SyncError};
use crate::event::{EventSink, SyncEvent};
use crate::fsops::{self, EntryKind};
use crate::hash::compare_files;
use crate::report::SyncReport;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Mirrors a source tree onto a replica tree, one full pass per call
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Arc<dyn EventSink>,
    permits: Arc<Semaphore>,
    /// Serializes overlapping passes on the same engine
    pass: Mutex<()>,
}

/// An action that completed against the replica
struct Applied {
    event: SyncEvent,
    bytes: u64,
    /// Entries inside a copied tree that were left out
    failures: Vec<SyncError>,
}

impl Applied {
    fn new(event: SyncEvent, bytes: u64) -> Self {
        Self {
            event,
            bytes,
            failures: Vec::new(),
        }
    }
}

/// What one entry (or subtree) contributed to a pass
#[derive(Default)]
struct Outcome {
    report: SyncReport,
    errors: Vec<SyncError>,
}

impl Outcome {
    fn failed(error: SyncError) -> Self {
        Self {
            report: SyncReport::default(),
            errors: vec![error],
        }
    }

    fn absorb(&mut self, other: Self) {
        self.report.merge(&other.report);
        self.errors.extend(other.errors);
    }
}

impl SyncEngine {
    /// Create an engine with the default concurrency limit
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        let jobs = NonZeroUsize::new(DEFAULT_JOBS).unwrap_or(NonZeroUsize::MIN);
        Self::with_concurrency(sink, jobs)
    }

    /// Create an engine allowing at most `jobs` filesystem operations at once.
    ///
    /// `jobs` is capped at [`Semaphore::MAX_PERMITS`].
    #[must_use]
    pub fn with_concurrency(sink: Arc<dyn EventSink>, jobs: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                permits: Arc::new(Semaphore::new(jobs.get().min(Semaphore::MAX_PERMITS))),
                pass: Mutex::new(()),
            }),
        }
    }

    /// Run one full pass, making `replica` identical to `source`.
    ///
    /// Both directories must exist. The source is never written to. A failure
    /// on one entry does not stop its siblings; every failure of the pass is
    /// collected into [`SyncError::Incomplete`], which also carries the report
    /// of what did succeed.
    ///
    /// # Errors
    /// Returns [`SyncError::Incomplete`] if any entry failed
    #[instrument(skip_all)]
    pub async fn synchronize(
        &self,
        source: impl AsRef<Path>,
        replica: impl AsRef<Path>,
    ) -> Result<SyncReport> {
        let _pass = self.inner.pass.lock().await;
        debug!(
            "Synchronizing {} -> {}",
            source.as_ref().display(),
            replica.as_ref().display()
        );

        let outcome = Arc::clone(&self.inner)
            .sync_dir(source.as_ref().to_path_buf(), replica.as_ref().to_path_buf())
            .await;

        debug!(
            "Pass finished: {} events, {} mutations, {} errors",
            outcome.report.total(),
            outcome.report.mutations(),
            outcome.errors.len()
        );

        if outcome.errors.is_empty() {
            Ok(outcome.report)
        } else {
            Err(SyncError::Incomplete {
                report: outcome.report,
                errors: outcome.errors,
            })
        }
    }
}

impl Inner {
    /// Run a blocking filesystem operation under a concurrency permit
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits).acquire_owned().await?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            op()
        })
        .await?
    }

    fn emit(&self, applied: Option<Applied>) -> Outcome {
        let mut outcome = Outcome::default();
        if let Some(Applied {
            event,
            bytes,
            failures,
        }) = applied
        {
            outcome.report.record(&event);
            outcome.report.bytes_copied += bytes;
            outcome.errors.extend(failures);
            self.sink.record(&event);
        }
        outcome
    }

    fn sync_dir(self: Arc<Self>, source: PathBuf, replica: PathBuf) -> BoxFuture<Outcome> {
        Box::pin(async move {
            let listing = {
                let (source, replica) = (source.clone(), replica.clone());
                self.blocking(move || classify(&source, &replica)).await
            };
            let Classification {
                source_only,
                replica_only,
                in_both,
            } = match listing {
                Ok(classification) => classification,
                Err(e) => return Outcome::failed(e),
            };

            let mut tasks = JoinSet::new();
            for name in source_only {
                let (s, r) = (source.join(&name), replica.join(&name));
                tasks.spawn(Arc::clone(&self).add(s, r));
            }
            for name in in_both {
                let (s, r) = (source.join(&name), replica.join(&name));
                tasks.spawn(Arc::clone(&self).reconcile(s, r));
            }
            for name in replica_only {
                let (s, r) = (source.join(&name), replica.join(&name));
                tasks.spawn(Arc::clone(&self).remove(s, r));
            }

            let mut outcome = Outcome::default();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(child) => outcome.absorb(child),
                    Err(e) => outcome.errors.push(e.into()),
                }
            }
            outcome
        })
    }

    /// Entry only in the source: copy it over
    async fn add(self: Arc<Self>, source: PathBuf, replica: PathBuf) -> Outcome {
        let result = self
            .blocking(move || {
                let kind = EntryKind::of_source(&source)
                    .map_err(|e| SyncError::io(Operation::Inspect, &source, e))?;
                copy_entry(kind, source, replica, Operation::Copy)
            })
            .await;
        self.finish(result)
    }

    /// Entry on both sides: recurse, compare, or replace on type mismatch
    async fn reconcile(self: Arc<Self>, source: PathBuf, replica: PathBuf) -> Outcome {
        let kinds = {
            let (source, replica) = (source.clone(), replica.clone());
            self.blocking(move || {
                let source_kind = EntryKind::of_source(&source)
                    .map_err(|e| SyncError::io(Operation::Inspect, &source, e))?;
                let replica_kind = EntryKind::of_replica(&replica)
                    .map_err(|e| SyncError::io(Operation::Inspect, &replica, e))?;
                Ok((source_kind, replica_kind))
            })
            .await
        };

        let result = match kinds {
            Err(e) => Err(e),
            Ok((EntryKind::Directory, EntryKind::Directory)) => {
                return self.sync_dir(source, replica).await;
            }
            Ok((EntryKind::File, EntryKind::File)) => {
                self.blocking(move || update_file(source, replica)).await
            }
            Ok((EntryKind::Other, replica_kind)) => {
                // Skipped in the source, so the replica must not keep the name
                warn!("Skipping special file {}", source.display());
                self.blocking(move || delete_entry(replica_kind, source, replica))
                    .await
            }
            Ok((source_kind, replica_kind)) => {
                debug!(
                    "{} is {source_kind:?} in source but {replica_kind:?} in replica",
                    replica.display()
                );
                self.blocking(move || replace_entry(source_kind, replica_kind, source, replica))
                    .await
            }
        };
        self.finish(result)
    }

    /// Entry only in the replica: delete it
    async fn remove(self: Arc<Self>, source: PathBuf, replica: PathBuf) -> Outcome {
        let result = self
            .blocking(move || {
                let kind = EntryKind::of_replica(&replica)
                    .map_err(|e| SyncError::io(Operation::Inspect, &replica, e))?;
                delete_entry(kind, source, replica)
            })
            .await;
        self.finish(result)
    }

    fn finish(&self, result: Result<Option<Applied>>) -> Outcome {
        match result {
            Ok(applied) => self.emit(applied),
            Err(e) => {
                debug!("{e}");
                Outcome::failed(e)
            }
        }
    }
}

/// Copy a source entry of `kind` to a replica path that does not exist.
///
/// A directory is installed even when some of its entries fail; those
/// failures ride along in [`Applied::failures`].
fn copy_entry(
    kind: EntryKind,
    source: PathBuf,
    replica: PathBuf,
    op: Operation,
) -> Result<Option<Applied>> {
    match kind {
        EntryKind::Directory => {
            let copied = fsops::copy_tree(&source, &replica)
                .map_err(|e| SyncError::io(op, &replica, e))?;
            let failures = copied
                .failures
                .into_iter()
                .map(|(path, e)| SyncError::io(op, path, e))
                .collect();
            Ok(Some(Applied {
                event: SyncEvent::DirectoryCopied { source, replica },
                bytes: copied.bytes,
                failures,
            }))
        }
        EntryKind::File => {
            let bytes = fsops::copy_file(&source, &replica)
                .map_err(|e| SyncError::io(op, &replica, e))?;
            Ok(Some(Applied::new(
                SyncEvent::FileCopied { source, replica },
                bytes,
            )))
        }
        // Source kinds come from `EntryKind::of_source`, which never reports
        // a symlink
        EntryKind::Symlink | EntryKind::Other => {
            warn!("Skipping special file {}", source.display());
            Ok(None)
        }
    }
}

/// Overwrite the replica file unless its content already matches
fn update_file(source: PathBuf, replica: PathBuf) -> Result<Option<Applied>> {
    if compare_files(&source, &replica)?.is_identical() {
        return Ok(Some(Applied::new(
            SyncEvent::FileUpToDate { source, replica },
            0,
        )));
    }

    let bytes = fsops::copy_file(&source, &replica)
        .map_err(|e| SyncError::io(Operation::Update, &replica, e))?;
    Ok(Some(Applied::new(
        SyncEvent::FileUpdated { source, replica },
        bytes,
    )))
}

/// Remove a replica entry of `kind` that has no counterpart in the source
fn delete_entry(kind: EntryKind, source: PathBuf, replica: PathBuf) -> Result<Option<Applied>> {
    fsops::remove_entry(&replica, kind)
        .map_err(|e| SyncError::io(Operation::Delete, &replica, e))?;
    let event = if kind == EntryKind::Directory {
        SyncEvent::DirectoryDeleted { source, replica }
    } else {
        SyncEvent::FileDeleted { source, replica }
    };
    Ok(Some(Applied::new(event, 0)))
}

/// Remove a replica entry of the wrong type and copy the source entry in
fn replace_entry(
    source_kind: EntryKind,
    replica_kind: EntryKind,
    source: PathBuf,
    replica: PathBuf,
) -> Result<Option<Applied>> {
    fsops::remove_entry(&replica, replica_kind)
        .map_err(|e| SyncError::io(Operation::Replace, &replica, e))?;
    let copied = copy_entry(source_kind, source, replica, Operation::Replace)?;
    Ok(copied.map(|applied| Applied {
        event: SyncEvent::EntryReplaced {
            source: applied.event.source().to_path_buf(),
            replica: applied.event.replica().to_path_buf(),
        },
        ..applied
    }))
}
