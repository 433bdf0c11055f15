//! Content hashing and file equality using BLAKE3

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::trace;

use crate::error::{Operation, Result, SyncError};

/// A content hash using BLAKE3 (256-bit)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash arbitrary bytes
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash a file by path, streaming it through a 64KB buffer
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0u8; 64 * 1024];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({})", hex.get(..16).unwrap_or(&hex))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "{}", hex.get(..16).unwrap_or(&hex))
    }
}

/// Outcome of comparing two files by content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Byte sizes differ; neither file was read
    SizeDiffers,
    /// Sizes match but the digests do not
    DigestDiffers,
    /// Same size and same digest
    Identical,
}

impl Comparison {
    #[must_use]
    pub fn is_identical(self) -> bool {
        self == Self::Identical
    }
}

/// Compare two files by size first, then by whole-file BLAKE3 digest.
///
/// Modification times and permissions never take part in the decision.
///
/// # Errors
/// Returns an error naming whichever file could not be stat'ed or read
pub fn compare_files(a: &Path, b: &Path) -> Result<Comparison> {
    let size_a = std::fs::metadata(a).map_err(failed(a))?.len();
    let size_b = std::fs::metadata(b).map_err(failed(b))?.len();
    if size_a != size_b {
        return Ok(Comparison::SizeDiffers);
    }

    let hash_a = ContentHash::from_file(a).map_err(failed(a))?;
    let hash_b = ContentHash::from_file(b).map_err(failed(b))?;
    trace!("{}: {hash_a}, {}: {hash_b}", a.display(), b.display());

    if hash_a == hash_b {
        Ok(Comparison::Identical)
    } else {
        Ok(Comparison::DigestDiffers)
    }
}

fn failed(path: &Path) -> impl FnOnce(io::Error) -> SyncError + '_ {
    move |e| SyncError::io(Operation::Compare, path, e)
}

/// `true` iff both files have the same size and the same content digest
///
/// # Errors
/// Returns an error naming whichever file could not be stat'ed or read
pub fn files_equal(a: &Path, b: &Path) -> Result<bool> {
    compare_files(a, b).map(Comparison::is_identical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_deterministic() {
        let data = b"hello world";
        let h1 = ContentHash::from_bytes(data);
        let h2 = ContentHash::from_bytes(data);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_content_hash_different_data() {
        let h1 = ContentHash::from_bytes(b"hello");
        let h2 = ContentHash::from_bytes(b"world");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_file_hash_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let content = vec![7u8; 200 * 1024];
        fs::write(&path, &content).unwrap();

        assert_eq!(
            ContentHash::from_file(&path).unwrap(),
            ContentHash::from_bytes(&content)
        );
    }

    #[test]
    fn test_different_sizes_short_circuit() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "short").unwrap();
        fs::write(&b, "much longer").unwrap();

        assert_eq!(compare_files(&a, &b).unwrap(), Comparison::SizeDiffers);
        assert!(!files_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_same_size_different_content() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "v1").unwrap();
        fs::write(&b, "v2").unwrap();

        assert_eq!(compare_files(&a, &b).unwrap(), Comparison::DigestDiffers);
    }

    #[test]
    fn test_empty_files_are_equal() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();

        assert!(files_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        fs::write(&a, "x").unwrap();

        let missing = dir.path().join("missing");
        let err = compare_files(&a, &missing).unwrap_err();
        assert!(
            matches!(&err, SyncError::Precondition { path, .. } if *path == missing),
            "{err:?}"
        );
    }

    #[test]
    fn test_error_names_the_failing_side() {
        let dir = TempDir::new().unwrap();
        let b = dir.path().join("b");
        fs::write(&b, "x").unwrap();

        let missing = dir.path().join("gone");
        let err = compare_files(&missing, &b).unwrap_err();
        assert!(
            matches!(&err, SyncError::Precondition { path, .. } if *path == missing),
            "{err:?}"
        );
    }
}
