//! Cache Module
//!
//! Durable single-slot cache of the last known good document.
//!
//! ## Responsibilities
//! - Hold the raw bytes of the last document that was loaded or written
//! - Replace the whole record atomically (temp file + fsync + rename)
//! - Report "no record" on first run rather than an error
//!
//! The record is a bootstrap fallback only. Callers treat every cache error
//! as non-fatal.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::cache_path_for;
use crate::error::{Result, StoreError};

/// A cache record file for one namespace
#[derive(Debug, Clone)]
pub struct CacheFile {
    /// Final location of the record
    path: PathBuf,
}

impl CacheFile {
    /// Use `path` as the cache record
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache record for `namespace` inside `dir`
    pub fn for_namespace(dir: &Path, namespace: &str) -> Self {
        Self::new(cache_path_for(dir, namespace))
    }

    /// Read the record
    ///
    /// Returns:
    /// - `Ok(Some(bytes))`: record exists and is non-empty
    /// - `Ok(None)`: no record yet (or an empty file)
    pub fn read(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the record with `bytes`
    ///
    /// Steps:
    /// 1. Create the cache directory if needed
    /// 2. Write and fsync a uniquely named temp file next to the record
    /// 3. Rename it over the record
    /// 4. fsync the directory (best effort)
    ///
    /// Concurrent writers never share a temp file; the temp file is removed
    /// if any step before the rename fails.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        if let Err(e) = fsync_dir(&dir) {
            tracing::trace!("Cache dir fsync skipped for {}: {}", dir.display(), e);
        }
        Ok(())
    }

    /// Delete the record (no-op if absent)
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a record file is present
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Get the record path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
