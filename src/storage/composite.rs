//! Composite storage: overlays a read-only primary tier over a read-write
//! secondary tier. Grounded on
//! `alexflow/adapters/storage/composite_storage.py`.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::StorageError;
use crate::storage::{File, Mode, ScopedPath, Storage};

#[derive(Debug, Clone)]
pub struct CompositeStorage {
    pub read_only: Arc<dyn Storage>,
    pub read_write: Arc<dyn Storage>,
}

impl CompositeStorage {
    pub fn new(read_only: Arc<dyn Storage>, read_write: Arc<dyn Storage>) -> Self {
        CompositeStorage { read_only, read_write }
    }
}

impl Storage for CompositeStorage {
    fn list(&self, path: Option<&str>) -> Result<Vec<File>, StorageError> {
        let mut merged: BTreeSet<File> = BTreeSet::new();
        merged.extend(self.read_only.list(path)?);
        merged.extend(self.read_write.list(path)?);
        Ok(merged.into_iter().collect())
    }

    fn exists(&self, path: &str) -> bool {
        self.read_only.exists(path) || self.read_write.exists(path)
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        if self.read_write.exists(path) {
            self.read_write.remove(path)?;
        }
        if self.read_only.exists(path) {
            return Err(StorageError::ReadOnlyAccess(path.into()));
        }
        Ok(())
    }

    fn makedirs(&self, path: &str, exist_ok: bool) -> Result<(), StorageError> {
        if self.read_only.exists(path) || self.read_write.exists(path) {
            return Ok(());
        }
        self.read_write.makedirs(path, exist_ok)
    }

    fn namespace(&self, path: &str) -> Arc<dyn Storage> {
        Arc::new(CompositeStorage::new(
            self.read_only.namespace(path),
            self.read_write.namespace(path),
        ))
    }

    fn path(&self, path: &str, mode: Mode) -> Result<ScopedPath, StorageError> {
        match mode {
            Mode::Read => {
                if self.read_only.exists(path) {
                    return self.read_only.path(path, Mode::Read);
                }
                if self.read_write.exists(path) {
                    return self.read_write.path(path, Mode::Read);
                }
                Err(StorageError::NotFound(path.into()))
            }
            Mode::Write => {
                if self.read_only.exists(path) {
                    return Err(StorageError::ReadOnlyAccess(path.into()));
                }
                self.read_write.path(path, Mode::Write)
            }
        }
    }

    fn get(&self, path: &str) -> File {
        File::new(path)
    }
}
