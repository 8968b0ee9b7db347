//! Graph-walk helpers that thread a `Storage` through a task's declared
//! IO: flattening, storage binding, the completion predicate, and the
//! dispatch-time `run`/`generate` wrappers. Grounded on `alexflow/helper.py`
//! (`assign_storage_to_output`, `flatten`, `is_completed`, `run_task`,
//! `generate_task`, `load_output`/`exists_output`/`remove_output`).

use std::sync::Arc;

use crate::error::{FlowError, StorageError};
use crate::io_tree::IoTree;
use crate::output::Output;
use crate::storage::Storage;
use crate::task::{resolve, Task, TaskKind};

/// Recursively bind `storage` to every leaf `Output` in `tree`.
pub fn assign_storage(tree: &IoTree, storage: &Arc<dyn Storage>) -> IoTree {
    tree.assign_storage(storage)
}

/// Flatten an IO tree to its leaf outputs, depth-first.
pub fn flatten(tree: &IoTree) -> Vec<Output> {
    tree.flatten()
}

/// The completion predicate (spec §4.5).
///
/// Static tasks with no declared outputs never complete (they always
/// run). Dynamic tasks with no declared outputs expand via `generate`
/// and recurse into the generated subgraph. Otherwise completion is
/// existence of every declared output.
///
/// Open question, preserved verbatim: when a dynamic task *does* declare
/// outputs, those outputs alone gate completion — the generated subgraph
/// is trusted to have written them and is never itself checked. A task
/// author who declares outputs on a dynamic task is responsible for the
/// generated subgraph actually producing them.
///
/// A `NotFound` from storage is swallowed to `false`; any other storage
/// error propagates.
pub fn is_completed(task: &Arc<dyn Task>, storage: &Arc<dyn Storage>) -> Result<bool, FlowError> {
    let resolved = resolve(task.clone());
    let declared_outputs = resolved.output();

    if declared_outputs.is_none() {
        return match resolved.kind() {
            TaskKind::Dynamic => {
                let bound_input = resolved.input().assign_storage(storage);
                let generated = match resolved.generate(bound_input, IoTree::None) {
                    Ok(tasks) => tasks,
                    Err(FlowError::Storage(StorageError::NotFound(_))) => return Ok(false),
                    Err(e) => return Err(e),
                };
                for child in &generated {
                    if !is_completed(child, storage)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            // Static or Wrapper task with no declared outputs: always reruns.
            TaskKind::Static | TaskKind::Wrapper => Ok(false),
        };
    }

    let bound = declared_outputs.assign_storage(storage);
    for output in bound.flatten() {
        match output.exists() {
            Ok(true) => continue,
            Ok(false) => return Ok(false),
            Err(StorageError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(FlowError::Storage(e)),
        }
    }
    Ok(true)
}

/// Binds storage to `task`'s declared IO and invokes `run` (static tasks).
pub fn run_task(task: &Arc<dyn Task>, storage: &Arc<dyn Storage>) -> Result<(), FlowError> {
    let resolved = resolve(task.clone());
    let input = resolved.input().assign_storage(storage);
    let output = resolved.output().assign_storage(storage);
    resolved.run(input, output)
}

/// Binds storage to `task`'s declared IO and invokes `generate` (dynamic
/// tasks), returning the subgraph it expands to.
pub fn generate_task(
    task: &Arc<dyn Task>,
    storage: &Arc<dyn Storage>,
) -> Result<Vec<Arc<dyn Task>>, FlowError> {
    let resolved = resolve(task.clone());
    let input = resolved.input().assign_storage(storage);
    let output = resolved.output().assign_storage(storage);
    resolved.generate(input, output)
}

/// Storage-bound helper matching the public `remove_output` operation.
pub fn remove_output(output: &Output, storage: &Arc<dyn Storage>) -> Result<(), FlowError> {
    output.clone().assign_storage(storage.clone()).remove().map_err(FlowError::from)
}

/// Storage-bound helper matching the public `exists_output` operation.
pub fn exists_output(output: &Output, storage: &Arc<dyn Storage>) -> Result<bool, FlowError> {
    output.clone().assign_storage(storage.clone()).exists().map_err(FlowError::from)
}
