//! Local filesystem storage backend.
//!
//! Grounded on `alexflow/adapters/storage/local_storage.py`. Atomic write:
//! stage in a temp dir, rename onto `<final>.<uuid>` on the final volume,
//! then rename onto `<final>`. The two-step rename guards against
//! cross-filesystem moves (a direct temp-dir → final rename can silently
//! fall back to copy-then-delete on some platforms when they straddle
//! filesystems, which is not atomic).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::StorageError;
use crate::storage::{File, Mode, ScopedPath, Storage};

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        LocalStorage { base_path: base_path.into() }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn namespaced_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

impl Storage for LocalStorage {
    fn list(&self, path: Option<&str>) -> Result<Vec<File>, StorageError> {
        let root = match path {
            Some(p) => self.namespaced_path(p),
            None => self.base_path.clone(),
        };
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(&self.base_path) {
                    out.push(File::new(rel.to_string_lossy().replace('\\', "/")));
                }
            }
        }
        Ok(out)
    }

    fn exists(&self, path: &str) -> bool {
        let p = self.namespaced_path(path);
        p.is_file()
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        let p = self.namespaced_path(path);
        fs::remove_file(&p).map_err(|source| StorageError::Io { path: p, source })
    }

    fn makedirs(&self, path: &str, exist_ok: bool) -> Result<(), StorageError> {
        let p = self.namespaced_path(path);
        let result = fs::create_dir_all(&p);
        match result {
            Ok(()) => Ok(()),
            Err(e) if exist_ok && e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(source) => Err(StorageError::Io { path: p, source }),
        }
    }

    fn namespace(&self, path: &str) -> Arc<dyn Storage> {
        Arc::new(LocalStorage::new(self.namespaced_path(path)))
    }

    fn path(&self, path: &str, mode: Mode) -> Result<ScopedPath, StorageError> {
        let final_path = self.namespaced_path(path);

        match mode {
            Mode::Read => {
                if !final_path.is_file() {
                    return Err(StorageError::NotFound(final_path));
                }
                Ok(ScopedPath::read(final_path))
            }
            Mode::Write => {
                let dir = tempfile::tempdir().map_err(|source| StorageError::Io {
                    path: final_path.clone(),
                    source,
                })?;
                let fname = final_path
                    .file_name()
                    .map(|n| n.to_owned())
                    .unwrap_or_else(|| std::ffi::OsString::from("output"));
                let staging_path = dir.path().join(&fname);

                // Keep the TempDir alive until the commit closure runs on drop.
                let commit_dir = dir;
                Ok(ScopedPath::write(staging_path, move |staged| {
                    let _keep_alive = &commit_dir;
                    if !staged.exists() {
                        return Ok(());
                    }
                    if let Some(parent) = final_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let suffix_path = path_with_suffix(&final_path, &Uuid::new_v4().to_string());
                    fs::rename(staged, &suffix_path)?;
                    fs::rename(&suffix_path, &final_path)?;
                    Ok(())
                }))
            }
        }
    }

    fn get(&self, path: &str) -> File {
        File::new(path)
    }

    // Uses the trait's default `copy` (read via scoped path, write via
    // scoped path). `copy_local` below is the fast path for the common
    // case of two concrete `LocalStorage`s, where a symlink can stand in
    // for the source's `dyn Storage`-erased default copy.
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}

fn default_copy(src: &LocalStorage, path: &str, target: &dyn Storage) -> Result<(), StorageError> {
    let scoped_src = Storage::path(src, path, Mode::Read)?;
    let scoped_dst = target.path(path, Mode::Write)?;
    fs::copy(scoped_src.as_path(), scoped_dst.as_path())
        .map_err(|source| StorageError::Io { path: PathBuf::from(path), source })?;
    Ok(())
}

impl LocalStorage {
    /// Copy between two concrete `LocalStorage`s, preferring a symbolic
    /// link and falling back to a byte copy if the link fails (e.g. cross
    /// device, or the platform disallows it). This is the fast path the
    /// generic `Storage::copy`/`downcast_local` cannot take because
    /// `dyn Storage` doesn't support downcasting.
    pub fn copy_local(&self, path: &str, target: &LocalStorage) -> Result<(), StorageError> {
        let src = self.namespaced_path(path);
        let dst = target.namespaced_path(path);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        #[cfg(unix)]
        {
            if let Ok(real_src) = fs::canonicalize(&src) {
                if std::os::unix::fs::symlink(&real_src, &dst).is_ok() {
                    return Ok(());
                }
            }
        }
        default_copy(self, path, target)
    }
}
