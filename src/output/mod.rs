//! Outputs: immutable handles `(src_task, key, storage?)` bound to a
//! storage and a codec. Grounded on `alexflow/core.py`'s `Output`/
//! `BinaryOutput`/`JSONOutput`/`SerializableOutput`, and
//! `alexflow/adapters/output/h5store.py` for the tabular variant.
//!
//! `output_id` is defined here as `src_task_id + "." + key` where `key`
//! is the caller-supplied key (spec §3). This is also the literal storage
//! path used by `store`/`load`/`exists`/`remove`, so `output_id` doubles
//! as the one storage key — see DESIGN.md's `output` section for why
//! this single-prefix formula is used instead of the source's own
//! double-prefixed `build_output`/`output_id` composition.

pub mod codec;

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StorageError;
use crate::storage::{Mode, Storage};

/// Fields shared by every output variant. Carries the `ephemeral`
/// annotation (design-time, compared only for GC behavior, never for
/// identity — invariant I4) and an optional storage binding (also never
/// compared for identity).
#[derive(Debug, Clone)]
pub struct OutputMeta {
    src_task_id: String,
    key: String,
    ephemeral: bool,
    storage: Option<Arc<dyn Storage>>,
}

impl OutputMeta {
    pub fn new(src_task_id: String, key: String) -> Self {
        OutputMeta { src_task_id, key, ephemeral: false, storage: None }
    }

    pub fn output_id(&self) -> String {
        format!("{}.{}", self.src_task_id, self.key)
    }

    pub fn src_task_id(&self) -> &str {
        &self.src_task_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn as_ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }

    pub fn assign_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    fn require_storage(&self) -> Result<&Arc<dyn Storage>, StorageError> {
        self.storage
            .as_ref()
            .ok_or_else(|| StorageError::NotFound(self.output_id().into()))
    }

    pub fn exists(&self) -> Result<bool, StorageError> {
        let storage = self.require_storage()?;
        Ok(storage.exists(&self.output_id()))
    }

    pub fn remove(&self) -> Result<(), StorageError> {
        let storage = self.require_storage()?;
        let path = self.output_id();
        if storage.exists(&path) {
            storage.remove(&path)?;
        }
        Ok(())
    }
}

macro_rules! output_variant {
    ($name:ident) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            pub meta: OutputMeta,
        }

        impl $name {
            pub fn new(meta: OutputMeta) -> Self {
                $name { meta }
            }

            pub fn assign_storage(mut self, storage: Arc<dyn Storage>) -> Self {
                self.meta = self.meta.assign_storage(storage);
                self
            }

            pub fn as_ephemeral(mut self) -> Self {
                self.meta = self.meta.as_ephemeral();
                self
            }

            pub fn exists(&self) -> Result<bool, StorageError> {
                self.meta.exists()
            }

            pub fn remove(&self) -> Result<(), StorageError> {
                self.meta.remove()
            }
        }
    };
}

output_variant!(BinaryOutput);
output_variant!(JsonOutput);
output_variant!(TabularOutput);
output_variant!(ObjectOutput);

impl BinaryOutput {
    /// Native serialized object blob via `bincode` — stable for this
    /// implementation (spec §6).
    pub fn store<T: Serialize>(&self, data: &T) -> Result<(), StorageError> {
        codec::store_bytes(&self.meta, &codec::bincode_encode(data)?)
    }

    pub fn load<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        codec::bincode_decode(&codec::load_bytes(&self.meta)?)
    }
}

impl JsonOutput {
    /// gzip-compressed UTF-8 JSON (spec §6). `chrono` types serialize to
    /// ISO-8601/`YYYY-MM-DD` via their `serde` impls; all JSON numbers are
    /// natively widened to the target's numeric type on deserialize.
    pub fn store<T: Serialize>(&self, data: &T) -> Result<(), StorageError> {
        codec::store_bytes(&self.meta, &codec::gzip_json_encode(data)?)
    }

    pub fn load<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        codec::gzip_json_decode(&codec::load_bytes(&self.meta)?)
    }
}

impl ObjectOutput {
    /// Delegates to the same gzip+JSON codec as `JsonOutput` — the typed-
    /// object variant differs from `JsonOutput` only by convention (the
    /// caller always round-trips one declared type), matching the
    /// source's `SerializableOutput`.
    pub fn store<T: Serialize>(&self, data: &T) -> Result<(), StorageError> {
        codec::store_bytes(&self.meta, &codec::gzip_json_encode(data)?)
    }

    pub fn load<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        codec::gzip_json_decode(&codec::load_bytes(&self.meta)?)
    }
}

impl TabularOutput {
    /// Columnar table compressed with `zstd` (default level 1, the
    /// `blosc:zstd` default from spec §6). Rows are uniform string maps;
    /// a richer schema is left to callers via `ObjectOutput`/`JsonOutput`.
    pub fn store(&self, rows: &[std::collections::BTreeMap<String, String>]) -> Result<(), StorageError> {
        codec::store_bytes(&self.meta, &codec::tabular_encode(rows)?)
    }

    pub fn load(&self) -> Result<Vec<std::collections::BTreeMap<String, String>>, StorageError> {
        codec::tabular_decode(&codec::load_bytes(&self.meta)?)
    }
}

/// Any of the four codec variants, as stored in an `IoTree` leaf.
#[derive(Debug, Clone)]
pub enum Output {
    Binary(BinaryOutput),
    Json(JsonOutput),
    Tabular(TabularOutput),
    Object(ObjectOutput),
}

impl Output {
    pub fn meta(&self) -> &OutputMeta {
        match self {
            Output::Binary(o) => &o.meta,
            Output::Json(o) => &o.meta,
            Output::Tabular(o) => &o.meta,
            Output::Object(o) => &o.meta,
        }
    }

    pub fn output_id(&self) -> String {
        self.meta().output_id()
    }

    pub fn src_task_id(&self) -> &str {
        self.meta().src_task_id()
    }

    pub fn key(&self) -> &str {
        self.meta().key()
    }

    pub fn ephemeral(&self) -> bool {
        self.meta().ephemeral()
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.meta().storage()
    }

    pub fn assign_storage(self, storage: Arc<dyn Storage>) -> Output {
        match self {
            Output::Binary(o) => Output::Binary(o.assign_storage(storage)),
            Output::Json(o) => Output::Json(o.assign_storage(storage)),
            Output::Tabular(o) => Output::Tabular(o.assign_storage(storage)),
            Output::Object(o) => Output::Object(o.assign_storage(storage)),
        }
    }

    pub fn as_ephemeral(self) -> Output {
        match self {
            Output::Binary(o) => Output::Binary(o.as_ephemeral()),
            Output::Json(o) => Output::Json(o.as_ephemeral()),
            Output::Tabular(o) => Output::Tabular(o.as_ephemeral()),
            Output::Object(o) => Output::Object(o.as_ephemeral()),
        }
    }

    pub fn exists(&self) -> Result<bool, StorageError> {
        self.meta().exists()
    }

    pub fn remove(&self) -> Result<(), StorageError> {
        self.meta().remove()
    }
}
