//! Byte-level codecs backing each `Output` variant, plus the shared
//! storage read/write plumbing routed through `Storage::path` for
//! atomicity. Grounded on `alexflow/misc/gjson.py` (JSON codec) and
//! `alexflow/adapters/output/h5store.py` (tabular codec).

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StorageError;
use crate::storage::Mode;

use super::OutputMeta;

pub(super) fn store_bytes(meta: &OutputMeta, bytes: &[u8]) -> Result<(), StorageError> {
    let storage = meta
        .storage()
        .ok_or_else(|| StorageError::NotFound(meta.output_id().into()))?;
    let scoped = storage.path(&meta.output_id(), Mode::Write)?;
    std::fs::write(scoped.as_path(), bytes).map_err(|source| StorageError::Io {
        path: scoped.as_path().to_path_buf(),
        source,
    })
}

pub(super) fn load_bytes(meta: &OutputMeta) -> Result<Vec<u8>, StorageError> {
    let storage = meta
        .storage()
        .ok_or_else(|| StorageError::NotFound(meta.output_id().into()))?;
    let scoped = storage.path(&meta.output_id(), Mode::Read)?;
    std::fs::read(scoped.as_path()).map_err(|source| StorageError::Io {
        path: scoped.as_path().to_path_buf(),
        source,
    })
}

/// Native serialized object blob, no compression — matches the source's
/// `BinaryOutput`, which stores a raw pickle with no transform.
pub(super) fn bincode_encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(data).map_err(|e| StorageError::Codec(e.to_string()))
}

pub(super) fn bincode_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Codec(e.to_string()))
}

/// gzip-compressed JSON, matching `gjson.dump`/`gjson.load`.
pub(super) fn gzip_json_encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
    let json = serde_json::to_vec(data).map_err(|e| StorageError::Codec(e.to_string()))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).map_err(|e| StorageError::Codec(e.to_string()))?;
    encoder.finish().map_err(|e| StorageError::Codec(e.to_string()))
}

pub(super) fn gzip_json_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| StorageError::Codec(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| StorageError::Codec(e.to_string()))
}

/// Columnar table: CSV rows (sorted column order for determinism)
/// compressed with `zstd` at level 1, the Rust analogue of the source's
/// pandas `HDFStore` with `complib="blosc:zstd"`.
pub(super) fn tabular_encode(
    rows: &[std::collections::BTreeMap<String, String>],
) -> Result<Vec<u8>, StorageError> {
    let mut columns: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    for row in rows {
        columns.extend(row.keys().map(|k| k.as_str()));
    }
    let columns: Vec<&str> = columns.into_iter().collect();

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer
        .write_record(&columns)
        .map_err(|e| StorageError::Codec(e.to_string()))?;
    for row in rows {
        let record: Vec<&str> = columns.iter().map(|c| row.get(*c).map(String::as_str).unwrap_or("")).collect();
        writer
            .write_record(&record)
            .map_err(|e| StorageError::Codec(e.to_string()))?;
    }
    let csv_bytes = writer.into_inner().map_err(|e| StorageError::Codec(e.to_string()))?;

    zstd::stream::encode_all(&csv_bytes[..], 1).map_err(|e| StorageError::Codec(e.to_string()))
}

pub(super) fn tabular_decode(
    bytes: &[u8],
) -> Result<Vec<std::collections::BTreeMap<String, String>>, StorageError> {
    let csv_bytes = zstd::stream::decode_all(bytes).map_err(|e| StorageError::Codec(e.to_string()))?;
    let mut reader = csv::ReaderBuilder::new().from_reader(&csv_bytes[..]);
    let headers = reader.headers().map_err(|e| StorageError::Codec(e.to_string()))?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| StorageError::Codec(e.to_string()))?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
