//! Replica-side filesystem operations
//!
//! Single files are written through a staging file in the destination
//! directory and renamed into place, so a replica file is either the old
//! version or the complete new one. Whole directories are assembled in a
//! staging directory next to the destination before being renamed.

use std::fs::{self, File, FileType};
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use ignore::WalkBuilder;
use tracing::{debug, warn};

/// Name prefix of staging files and directories inside the replica
pub const STAGING_PREFIX: &str = ".treemirror-";

/// What an entry is, as far as mirroring cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Only reported for replica entries, which are never followed
    Symlink,
    /// Sockets, FIFOs, devices
    Other,
}

impl EntryKind {
    /// Probe a source entry, following symbolic links
    ///
    /// # Errors
    /// Returns an error if the entry (or a link target) does not exist
    pub fn of_source(path: &Path) -> io::Result<Self> {
        fs::metadata(path).map(|m| Self::from_file_type(m.file_type()))
    }

    /// Probe a replica entry without following symbolic links
    ///
    /// # Errors
    /// Returns an error if the entry does not exist
    pub fn of_replica(path: &Path) -> io::Result<Self> {
        fs::symlink_metadata(path).map(|m| Self::from_file_type(m.file_type()))
    }

    fn from_file_type(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }
}

/// Copy `source` to `dest`, replacing any existing file at `dest`.
///
/// Permission bits and access/modification times are carried over. Returns
/// the number of bytes copied.
///
/// # Errors
/// Returns an error if reading the source or writing the destination fails
pub fn copy_file(source: &Path, dest: &Path) -> io::Result<u64> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut input = File::open(source)?;
    let metadata = input.metadata()?;

    let mut staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(parent)?;
    let bytes = io::copy(&mut input, staged.as_file_mut())?;

    staged.as_file().set_permissions(metadata.permissions())?;
    filetime::set_file_handle_times(
        staged.as_file(),
        Some(FileTime::from_last_access_time(&metadata)),
        Some(FileTime::from_last_modification_time(&metadata)),
    )?;

    staged.persist(dest).map_err(|e| e.error)?;
    Ok(bytes)
}

/// Outcome of [`copy_tree`]: the tree was installed, possibly with holes
#[derive(Debug, Default)]
pub struct TreeCopy {
    /// File bytes copied
    pub bytes: u64,
    /// Source entries left out of the copy, with the reason
    pub failures: Vec<(PathBuf, io::Error)>,
}

/// Recursively copy the directory `source` to `dest`, which must not exist.
///
/// Symbolic links in the source are followed. Special files are skipped.
/// An entry that cannot be read or written is left out and reported in
/// [`TreeCopy::failures`]; everything else is still installed at `dest`.
///
/// # Errors
/// Returns an error if the staging directory cannot be created or renamed
/// into place; in that case nothing is left at `dest`
pub fn copy_tree(source: &Path, dest: &Path) -> io::Result<TreeCopy> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)?;

    let mut builder = WalkBuilder::new(source);
    builder
        .standard_filters(false) // Mirror everything, hidden and ignored files included
        .follow_links(true)
        .sort_by_file_name(|a, b| a.cmp(b));

    let mut copied = TreeCopy::default();
    // (staged dir, source dir) pairs whose permissions are applied last
    let mut directories: Vec<(PathBuf, PathBuf)> =
        vec![(staging.path().to_path_buf(), source.to_path_buf())];
    // Staged directories that could not be created
    let mut missing: Vec<PathBuf> = Vec::new();

    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                let path = walk_error_path(&err).unwrap_or_else(|| source.to_path_buf());
                copied.failures.push((path, walk_error(err)));
                continue;
            }
        };
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = staging.path().join(relative);
        if missing.iter().any(|dir| target.starts_with(dir)) {
            continue;
        }
        match entry.file_type() {
            Some(ft) if ft.is_dir() => match fs::create_dir(&target) {
                Ok(()) => directories.push((target, entry.into_path())),
                Err(e) => {
                    missing.push(target);
                    copied.failures.push((entry.into_path(), e));
                }
            },
            Some(ft) if ft.is_file() => match copy_file(entry.path(), &target) {
                Ok(bytes) => copied.bytes += bytes,
                Err(e) => copied.failures.push((entry.into_path(), e)),
            },
            _ => warn!("Skipping special file {}", entry.path().display()),
        }
    }

    // Deepest first, so read-only directories are locked only once filled
    for (staged, original) in directories.iter().rev() {
        let applied = fs::metadata(original)
            .and_then(|metadata| fs::set_permissions(staged, metadata.permissions()));
        if let Err(e) = applied {
            copied.failures.push((original.clone(), e));
        }
    }

    fs::rename(staging.path(), dest)?;
    debug!(
        "Copied tree {} -> {} ({} entries left out)",
        source.display(),
        dest.display(),
        copied.failures.len()
    );
    Ok(copied)
}

/// Remove a replica entry of the given kind; directories go recursively,
/// symbolic links are removed themselves and never followed.
///
/// # Errors
/// Returns an error if removal fails
pub fn remove_entry(path: &Path, kind: EntryKind) -> io::Result<()> {
    match kind {
        EntryKind::Directory => fs::remove_dir_all(path),
        EntryKind::File | EntryKind::Symlink | EntryKind::Other => fs::remove_file(path),
    }
}

/// The entry a walk error is about, when it names one
fn walk_error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        _ => None,
    }
}

fn walk_error(err: ignore::Error) -> io::Error {
    let message = err.to_string();
    err.into_io_error()
        .unwrap_or_else(|| io::Error::other(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn staging_leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(STAGING_PREFIX))
            .collect()
    }

    #[test]
    fn test_copy_file_preserves_mtime() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        let dest = dir.path().join("dest.txt");
        fs::write(&source, "hello").unwrap();

        // Jan 1, 2024
        let mtime = UNIX_EPOCH + Duration::from_secs(1_704_067_200);
        filetime::set_file_mtime(&source, FileTime::from_system_time(mtime)).unwrap();

        let bytes = copy_file(&source, &dest).unwrap();
        assert_eq!(bytes, 5);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "hello");
        assert_eq!(fs::metadata(&dest).unwrap().modified().unwrap(), mtime);
        assert!(staging_leftovers(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_file_preserves_mode() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("run.sh");
        let dest = dir.path().join("copy.sh");
        fs::write(&source, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&source, fs::Permissions::from_mode(0o750)).unwrap();

        copy_file(&source, &dest).unwrap();
        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_copy_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a");
        let dest = dir.path().join("b");
        fs::write(&source, "new").unwrap();
        fs::write(&dest, "old and longer").unwrap();

        copy_file(&source, &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
    }

    #[test]
    fn test_copy_tree_nested() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("a/b/c")).unwrap();
        fs::create_dir(src.path().join("empty")).unwrap();
        fs::write(src.path().join("root.txt"), "root").unwrap();
        fs::write(src.path().join(".hidden"), "hidden").unwrap();
        fs::write(src.path().join("a/b/c/deep.txt"), "deep").unwrap();

        let dest = dst.path().join("copy");
        let copied = copy_tree(src.path(), &dest).unwrap();

        assert_eq!(copied.bytes, 14);
        assert!(copied.failures.is_empty());
        assert_eq!(fs::read_to_string(dest.join("root.txt")).unwrap(), "root");
        assert_eq!(fs::read_to_string(dest.join(".hidden")).unwrap(), "hidden");
        assert_eq!(
            fs::read_to_string(dest.join("a/b/c/deep.txt")).unwrap(),
            "deep"
        );
        assert!(dest.join("empty").is_dir());
        assert!(staging_leftovers(dst.path()).is_empty());
    }

    #[test]
    fn test_copy_tree_ignores_gitignore() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir(src.path().join(".git")).unwrap();
        fs::write(src.path().join(".gitignore"), "*.log\n").unwrap();
        fs::write(src.path().join("build.log"), "log").unwrap();

        let dest = dst.path().join("copy");
        copy_tree(src.path(), &dest).unwrap();

        assert!(dest.join("build.log").exists());
        assert!(dest.join(".git").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_leaves_out_only_bad_entries() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("good.txt"), "good").unwrap();
        fs::write(src.path().join("sub/also_good.txt"), "fine").unwrap();
        std::os::unix::fs::symlink(src.path().join("nowhere"), src.path().join("broken"))
            .unwrap();

        let dest = dst.path().join("copy");
        let copied = copy_tree(src.path(), &dest).unwrap();

        assert_eq!(copied.failures.len(), 1);
        let (path, err) = &copied.failures[0];
        assert_eq!(path, &src.path().join("broken"));
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(fs::read_to_string(dest.join("good.txt")).unwrap(), "good");
        assert_eq!(
            fs::read_to_string(dest.join("sub/also_good.txt")).unwrap(),
            "fine"
        );
        assert!(!dest.join("broken").exists());
        assert!(staging_leftovers(dst.path()).is_empty());
    }

    #[test]
    fn test_remove_entry() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub/inner")).unwrap();
        fs::write(dir.path().join("sub/inner/f"), "x").unwrap();
        fs::write(dir.path().join("file"), "x").unwrap();

        remove_entry(&dir.path().join("sub"), EntryKind::Directory).unwrap();
        remove_entry(&dir.path().join("file"), EntryKind::File).unwrap();

        assert!(!dir.path().join("sub").exists());
        assert!(!dir.path().join("file").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_kinds() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("target")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("link")).unwrap();

        let link = dir.path().join("link");
        assert_eq!(EntryKind::of_source(&link).unwrap(), EntryKind::Directory);
        assert_eq!(EntryKind::of_replica(&link).unwrap(), EntryKind::Symlink);

        // Removing the link leaves its target alone
        remove_entry(&link, EntryKind::Symlink).unwrap();
        assert!(dir.path().join("target").is_dir());
    }
}
