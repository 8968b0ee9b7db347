//! Public entry points: `run_workflow`/`run_job` and the storage-bound
//! output helpers (spec §6). Grounded on `alexflow/core.py::Workflow`
//! and `run_job`/`run_workflow` in
//! `alexflow/adapters/executor/alexflow.py`.

use std::sync::Arc;

use crate::engine::{parallel, sequential};
use crate::error::FlowError;
use crate::helper;
use crate::output::Output;
use crate::resource::ResourceBudget;
use crate::storage::Storage;
use crate::task::Task;

/// A named root task set bound to a storage (spec §3: "Workflow (root
/// tasks + storage)").
#[derive(Clone)]
pub struct Workflow {
    tasks: Vec<Arc<dyn Task>>,
    storage: Arc<dyn Storage>,
}

impl Workflow {
    pub fn new(tasks: impl IntoIterator<Item = Arc<dyn Task>>, storage: Arc<dyn Storage>) -> Self {
        Workflow { tasks: tasks.into_iter().collect(), storage }
    }

    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        &self.tasks
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

/// Executes `workflow`. `n_jobs == 1` selects the sequential engine;
/// any larger value selects the parallel engine under `resources`
/// (unused tags in the graph are simply never constrained).
pub fn run_workflow(
    workflow: Workflow,
    n_jobs: usize,
    resources: Option<ResourceBudget>,
) -> Result<(), FlowError> {
    if n_jobs == 1 {
        sequential::run(workflow.tasks, workflow.storage)
    } else {
        parallel::run(workflow.tasks, workflow.storage, n_jobs, resources.unwrap_or_else(ResourceBudget::empty))
    }
}

/// Convenience wrapper constructing a single-use `Workflow` from one or
/// more root tasks.
pub fn run_job(
    tasks: impl IntoIterator<Item = Arc<dyn Task>>,
    storage: Arc<dyn Storage>,
    n_jobs: usize,
    resources: Option<ResourceBudget>,
) -> Result<(), FlowError> {
    run_workflow(Workflow::new(tasks, storage), n_jobs, resources)
}

/// Storage-bound helper: does the artifact behind `output` exist?
pub fn exists_output(output: &Output, storage: &Arc<dyn Storage>) -> Result<bool, FlowError> {
    helper::exists_output(output, storage)
}

/// Storage-bound helper: delete the artifact behind `output`, if present.
pub fn remove_output(output: &Output, storage: &Arc<dyn Storage>) -> Result<(), FlowError> {
    helper::remove_output(output, storage)
}

/// Storage-bound helper: load the artifact behind a `BinaryOutput`. The
/// `JsonOutput`/`ObjectOutput`/`TabularOutput` variants expose their own
/// typed `load()` directly since each has a distinct payload shape; this
/// wrapper exists for the common binary case the CLI/tests reach for.
pub fn load_binary_output<T: serde::de::DeserializeOwned>(
    output: &Output,
    storage: &Arc<dyn Storage>,
) -> Result<T, FlowError> {
    match output.clone().assign_storage(storage.clone()) {
        Output::Binary(b) => b.load().map_err(FlowError::from),
        _ => Err(FlowError::other("load_binary_output called on a non-binary output")),
    }
}
