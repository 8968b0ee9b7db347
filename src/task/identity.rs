//! The structural, version-aware task-identity hash. Grounded on
//! `_create_task_id`/`_serialize` in `alexflow/core.py`, generalized with
//! the v0/v1.0.0 elision split pinned by the digests in
//! `tests/test_core.py::test_task_id_for_no_default`.
//!
//! The hash input must match Python's `json.dumps(obj, sort_keys=True)`
//! byte-for-byte — including its `", "`/`": "` separators — since the
//! digests are pinned constants. `serde_json`'s compact formatter omits
//! those spaces, so we serialize through a formatter that restores them.

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};

use super::{ResourceSpec, Task, TaskSpecVersion};

/// One declared field of a task, as fed into the canonicalizer.
///
/// `declared_default_is_none` mirrors the dataclass field's *declared*
/// default (not its current value): under schema v0, a field only elides
/// when both the value and the declared default are "none". Most
/// `Option<T>` fields with a `None` default should pass `true` here; the
/// synthetic `resource_spec` field on `Task` has no declared default at
/// all (the Python base class sets it via `__init__`, not `field(default=...)`)
/// so it is handled separately rather than through this struct.
pub struct Field {
    pub name: &'static str,
    pub value: Value,
    pub declared_default_is_none: bool,
    pub comparable: bool,
}

impl Field {
    pub fn new(name: &'static str, value: Value) -> Self {
        Field { name, value, declared_default_is_none: true, comparable: true }
    }

    /// Marks this field as not carrying a `None` default, so schema v0's
    /// elision rule never fires for it even when the value is null.
    pub fn no_default(mut self) -> Self {
        self.declared_default_is_none = false;
        self
    }

    /// Marks this field as excluded from identity in every schema
    /// version (spec P4: "compare=false irrelevance").
    pub fn non_comparable(mut self) -> Self {
        self.comparable = false;
        self
    }
}

/// Canonicalization helpers for building `Field::value`s from task
/// parameters (rules 2, 3, 5 of the structural walk).
pub mod canon {
    use super::*;
    use crate::output::Output;

    pub fn scalar<T: Serialize>(value: &T) -> Value {
        serde_json::to_value(value).expect("scalar task field must be JSON-representable")
    }

    /// Rule 2: nested task fields substitute the inner `task_id`.
    pub fn task(task: &dyn Task) -> Value {
        Value::String(super::task_id(task))
    }

    pub fn opt_task(task: Option<&dyn Task>) -> Value {
        match task {
            Some(t) => self::task(t),
            None => Value::Null,
        }
    }

    /// Rule 3: nested output fields substitute `output_id`.
    pub fn output(output: &Output) -> Value {
        Value::String(output.output_id())
    }

    pub fn opt_output(output: Option<&Output>) -> Value {
        match output {
            Some(o) => self::output(o),
            None => Value::Null,
        }
    }

    pub fn seq_tasks(tasks: &[std::sync::Arc<dyn Task>]) -> Value {
        Value::Array(tasks.iter().map(|t| self::task(t.as_ref())).collect())
    }

    pub fn seq_outputs(outputs: &[Output]) -> Value {
        Value::Array(outputs.iter().map(self::output).collect())
    }
}

fn should_elide(field: &Field, version: TaskSpecVersion) -> bool {
    if !field.comparable {
        return true;
    }
    if !field.value.is_null() {
        return false;
    }
    match version {
        TaskSpecVersion::V0 => field.declared_default_is_none,
        TaskSpecVersion::V1 => true,
    }
}

fn canon_object(fields: &[Field], version: TaskSpecVersion) -> Value {
    let mut map = Map::new();
    for field in fields {
        if should_elide(field, version) {
            continue;
        }
        map.insert(field.name.to_string(), field.value.clone());
    }
    Value::Object(map)
}

/// Schema v0 always hashes `resource_spec`, recursed through the same
/// elision rule as any other field (rule in §4.3: "v0 always includes
/// `resource_spec` in the hash, regardless of its compare annotation").
/// Each of `ResourceSpec`'s own fields has a real `None` default, so
/// within this nested object a `None` value always elides even under v0.
fn resource_spec_value(spec: Option<&ResourceSpec>) -> Value {
    match spec {
        None => Value::Null,
        Some(rs) => {
            let fields = vec![
                Field::new("cpu_requests", canon::scalar(&rs.cpu_requests)),
                Field::new("cpu_limits", canon::scalar(&rs.cpu_limits)),
                Field::new("memory_requests", canon::scalar(&rs.memory_requests)),
                Field::new("memory_limits", canon::scalar(&rs.memory_limits)),
                Field::new("gpu", canon::scalar(&rs.gpu)),
            ];
            canon_object(&fields, TaskSpecVersion::V0)
        }
    }
}

/// Serializes like Python's `json.dumps(obj, sort_keys=True)`: keys in
/// sorted order (free, since `serde_json::Map` is `BTreeMap`-backed
/// without the `preserve_order` feature) and `", "`/`": "` separators.
struct PySeparatedFormatter;

impl Formatter for PySeparatedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn py_json_bytes(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PySeparatedFormatter);
    value.serialize(&mut ser).expect("canonical task value must serialize");
    buf
}

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// The task-identity hash (spec §4.3). Wrapper tasks forward to their
/// inner task unchanged (I2); everything else walks its declared fields.
pub fn task_id(task: &dyn Task) -> String {
    if let Some(inner) = task.inner() {
        return task_id(inner.as_ref());
    }

    let version = task.spec_version();
    let mut map = Map::new();
    for field in task.declared_fields() {
        if should_elide(&field, version) {
            continue;
        }
        map.insert(field.name.to_string(), field.value);
    }

    if let TaskSpecVersion::V0 = version {
        map.insert("resource_spec".to_string(), resource_spec_value(task.resource_spec().as_ref()));
    }

    let digest = sha1_hex(&py_json_bytes(&Value::Object(map)));
    format!("{}.{}", task.type_name(), digest)
}
