//! Storage contract: atomic file I/O, namespacing, listing, existence,
//! removal. Grounded on `alexflow/adapters/storage/core.py` and
//! `local_storage.py`.

pub mod composite;
pub mod local;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::StorageError;

pub use composite::CompositeStorage;
pub use local::LocalStorage;

/// A file entry returned by `Storage::list`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct File {
    pub path: String,
}

impl File {
    pub fn new(path: impl Into<String>) -> Self {
        File { path: path.into() }
    }
}

/// Mode for a scoped `Storage::path` acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

/// A scoped filesystem path acquired from `Storage::path`.
///
/// In `Mode::Read`, the path already addresses the final artifact. In
/// `Mode::Write`, the path addresses a staging location; on `Drop`
/// (successful scope exit, i.e. not mid-panic) the storage implementation
/// must make the staged artifact visible atomically under the final key.
/// The commit happens in `Drop` rather than an explicit `close()` so a
/// caller who writes bytes into the path and lets the guard fall out of
/// scope always gets the atomicity guarantee, matching the source's
/// `@contextmanager`-based `path()`.
pub struct ScopedPath {
    path: PathBuf,
    commit: Option<Box<dyn FnOnce(&Path) -> std::io::Result<()> + Send>>,
}

impl ScopedPath {
    /// A read-mode path: no commit action on drop.
    pub fn read(path: PathBuf) -> Self {
        ScopedPath { path, commit: None }
    }

    /// A write-mode path: `commit` is invoked once, on drop, with the
    /// staged path, and must publish it atomically.
    pub fn write(path: PathBuf, commit: impl FnOnce(&Path) -> std::io::Result<()> + Send + 'static) -> Self {
        ScopedPath { path, commit: Some(Box::new(commit)) }
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for ScopedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedPath").field("path", &self.path).finish()
    }
}

impl Drop for ScopedPath {
    fn drop(&mut self) {
        if let Some(commit) = self.commit.take() {
            if let Err(e) = commit(&self.path) {
                tracing::error!(path = %self.path.display(), error = %e, "failed to publish staged write");
            }
        }
    }
}

/// The storage abstraction every output codec and the engine bind against.
///
/// Implementations must be safe under concurrent atomic-write operations
/// on disjoint keys; two tasks writing the same key concurrently is
/// undefined behavior and an identity bug on the caller's part (spec §5).
pub trait Storage: Send + Sync + fmt::Debug {
    /// Recursive enumeration relative to `path`. Order unspecified.
    fn list(&self, path: Option<&str>) -> Result<Vec<File>, StorageError>;

    /// Whether an artifact exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Remove the artifact at `path`. Idempotency not required.
    fn remove(&self, path: &str) -> Result<(), StorageError>;

    /// Create directories leading to `path`.
    fn makedirs(&self, path: &str, exist_ok: bool) -> Result<(), StorageError>;

    /// A storage whose operations are rooted at `path`.
    fn namespace(&self, path: &str) -> Arc<dyn Storage>;

    /// Acquire a scoped path to `path` in `mode`. In `Mode::Read`, fails
    /// with `StorageError::NotFound` if the artifact is absent.
    fn path(&self, path: &str, mode: Mode) -> Result<ScopedPath, StorageError>;

    /// Get the `File` handle for `path` without checking existence.
    fn get(&self, path: &str) -> File {
        File::new(path)
    }

    /// Copy an artifact from this storage to `target`. Default
    /// implementation: read via `self.path(path, Read)`, write via
    /// `target.path(path, Write)`.
    fn copy(&self, path: &str, target: &dyn Storage) -> Result<(), StorageError> {
        let src = self.path(path, Mode::Read)?;
        let dst = target.path(path, Mode::Write)?;
        std::fs::copy(src.as_path(), dst.as_path()).map_err(|source| StorageError::Io {
            path: PathBuf::from(path),
            source,
        })?;
        Ok(())
    }
}
