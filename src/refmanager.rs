//! Reference-counted ephemeral-output collector. Grounded line-for-line
//! on `alexflow/adapters/executor/_reference_manager.py`'s
//! `ReferenceManager`/`_to_ref_map`/`_recursive_purge_if_ephemeral`.
//!
//! The source walks `Output.src_task` directly, since Python's `Output`
//! carries the real producing object. This crate's `Output` deliberately
//! carries only `src_task_id` (a `String`) to avoid an owning `Arc<dyn
//! Task>` cycle back from output to producer (see the design note on
//! cyclic-looking reference graphs in `task::Task::dependencies`'s doc
//! comment). The walk here instead discovers producers through each
//! task's declared `dependencies()` and keeps them in an id-indexed
//! arena, so a purge can still look a producer up by `output.src_task_id()`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::output::Output;
use crate::storage::Storage;
use crate::task::{arena, identity, resolve, Task};

pub struct ReferenceManager {
    refcount: HashMap<String, HashSet<String>>,
    ephemeral_all: HashMap<String, bool>,
    arena: HashMap<String, Arc<dyn Task>>,
    storage: Arc<dyn Storage>,
}

impl ReferenceManager {
    /// Initializes by walking the dependency graph from `roots` (spec
    /// §4.6 Initialization).
    pub fn new(roots: impl IntoIterator<Item = Arc<dyn Task>>, storage: Arc<dyn Storage>) -> Self {
        let (refcount, ephemeral_all, arena) = to_ref_map(roots);
        ReferenceManager { refcount, ephemeral_all, arena, storage }
    }

    /// Re-runs the initialization walk rooted at `task`, folding its
    /// results into the existing state by union/conjunction (used when a
    /// dynamic task generates new children).
    pub fn add(&mut self, task: Arc<dyn Task>) {
        let (refcount, ephemeral_all, arena) = to_ref_map([task]);

        for (key, ids) in refcount {
            self.refcount.entry(key).or_default().extend(ids);
        }
        for (key, ephemeral) in ephemeral_all {
            let entry = self.ephemeral_all.entry(key).or_insert(true);
            *entry = *entry && ephemeral;
        }
        for (task_id, task) in arena {
            self.arena.entry(task_id).or_insert(task);
        }
    }

    /// Decrements refcount for all of `task`'s inputs first, then purges
    /// each that just hit zero (spec §4.6: ordering matters when two
    /// sibling inputs share a subtree that would otherwise be
    /// prematurely collected).
    pub fn remove(&mut self, task: &Arc<dyn Task>) {
        let resolved = resolve(task.clone());
        let task_id = identity::task_id(resolved.as_ref());
        let inputs = uniq(resolved.input().flatten());

        for input in &inputs {
            if let Some(consumers) = self.refcount.get_mut(&input.output_id()) {
                consumers.remove(&task_id);
            }
        }
        for input in &inputs {
            self.recursive_purge(input);
        }
    }

    fn recursive_purge(&mut self, output: &Output) {
        let key = output.output_id();

        let referrers_remain = self.refcount.get(&key).map(|s| !s.is_empty()).unwrap_or(false);
        if referrers_remain {
            return;
        }

        let bound = output.clone().assign_storage(self.storage.clone());
        let exists = match bound.exists() {
            Ok(v) => v,
            Err(_) => return, // RC3: purge never raises, absence is fine.
        };
        if !exists {
            return;
        }

        if *self.ephemeral_all.get(&key).unwrap_or(&true) {
            debug!(output_id = %key, "purging ephemeral output");
            let _ = bound.remove();
        }

        if let Some(producer) = self.arena.get(output.src_task_id()).cloned() {
            for item in producer.input().flatten() {
                self.recursive_purge(&item);
            }
        }
    }
}

fn uniq(outputs: Vec<Output>) -> Vec<Output> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for output in outputs {
        if seen.insert(output.output_id()) {
            out.push(output);
        }
    }
    out
}

type RefMap = (HashMap<String, HashSet<String>>, HashMap<String, bool>, HashMap<String, Arc<dyn Task>>);

/// Walks the dependency graph from `roots` (via `task::arena`), registering
/// every (consumer, input-output) pair and conjoining each output's
/// ephemeral flag (spec §4.6 Initialization / source's `_to_ref_map`).
fn to_ref_map(roots: impl IntoIterator<Item = Arc<dyn Task>>) -> RefMap {
    let arena = arena::build(roots);

    let mut refcount: HashMap<String, HashSet<String>> = HashMap::new();
    let mut ephemeral_all: HashMap<String, bool> = HashMap::new();

    for (task_id, task) in &arena {
        for input in task.input().flatten() {
            refcount.entry(input.output_id()).or_default().insert(task_id.clone());
            let entry = ephemeral_all.entry(input.output_id()).or_insert(true);
            *entry = *entry && input.ephemeral();
        }
    }

    (refcount, ephemeral_all, arena)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use crate::io_tree::IoTree;
    use crate::storage::local::LocalStorage;
    use crate::task::identity::{canon, Field};
    use crate::task::{build_binary_output, TaskKind, TaskSpecVersion};

    #[derive(Debug)]
    struct Base {
        name: String,
    }

    impl Task for Base {
        fn type_name(&self) -> &'static str {
            "refmanager_tests.Base"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Static
        }

        fn spec_version(&self) -> TaskSpecVersion {
            TaskSpecVersion::V1
        }

        fn declared_fields(&self) -> Vec<Field> {
            vec![Field::new("name", canon::scalar(&self.name))]
        }

        fn output(&self) -> IoTree {
            build_binary_output(self, "output.bin").into()
        }

        fn run(&self, _input: IoTree, output: IoTree) -> Result<(), FlowError> {
            if let Output::Binary(b) = &output.flatten()[0] {
                b.store(&self.name)?;
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Consumer {
        parent: Arc<dyn Task>,
        name: String,
        ephemeral_input: bool,
    }

    impl Task for Consumer {
        fn type_name(&self) -> &'static str {
            "refmanager_tests.Consumer"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Static
        }

        fn spec_version(&self) -> TaskSpecVersion {
            TaskSpecVersion::V1
        }

        fn declared_fields(&self) -> Vec<Field> {
            vec![
                Field::new("parent", canon::task(self.parent.as_ref())),
                Field::new("name", canon::scalar(&self.name)),
            ]
        }

        fn dependencies(&self) -> Vec<Arc<dyn Task>> {
            vec![self.parent.clone()]
        }

        fn input(&self) -> IoTree {
            let mut tree = self.parent.output();
            if self.ephemeral_input {
                tree = match tree {
                    IoTree::Leaf(o) => IoTree::Leaf(o.as_ephemeral()),
                    other => other,
                };
            }
            tree
        }

        fn output(&self) -> IoTree {
            build_binary_output(self, "output.bin").into()
        }

        fn run(&self, _input: IoTree, output: IoTree) -> Result<(), FlowError> {
            if let Output::Binary(b) = &output.flatten()[0] {
                b.store(&self.name)?;
            }
            Ok(())
        }
    }

    fn storage() -> Arc<dyn Storage> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_owned();
        std::mem::forget(dir);
        Arc::new(LocalStorage::new(path))
    }

    #[test]
    fn mixed_ephemeral_consumers_keep_output_non_ephemeral() {
        let storage = storage();
        let base: Arc<dyn Task> = Arc::new(Base { name: "base".into() });

        let variant1: Arc<dyn Task> = Arc::new(Consumer {
            parent: base.clone(),
            name: "v1".into(),
            ephemeral_input: false,
        });
        let variant2: Arc<dyn Task> = Arc::new(Consumer {
            parent: base.clone(),
            name: "v2".into(),
            ephemeral_input: true,
        });

        let mut manager = ReferenceManager::new([variant1.clone(), variant2.clone()], storage.clone());

        crate::helper::run_task(&base, &storage).unwrap();
        assert!(crate::helper::exists_output(
            &base.output().flatten()[0],
            &storage
        )
        .unwrap());

        manager.remove(&base);
        manager.remove(&variant1);
        manager.remove(&variant2);

        assert!(crate::helper::exists_output(&base.output().flatten()[0], &storage).unwrap());
    }

    #[test]
    fn fully_ephemeral_single_consumer_purges_on_last_remove() {
        let storage = storage();
        let base: Arc<dyn Task> = Arc::new(Base { name: "base".into() });
        let consumer: Arc<dyn Task> = Arc::new(Consumer {
            parent: base.clone(),
            name: "c".into(),
            ephemeral_input: true,
        });

        let mut manager = ReferenceManager::new([consumer.clone()], storage.clone());

        crate::helper::run_task(&base, &storage).unwrap();
        manager.remove(&consumer);

        assert!(!crate::helper::exists_output(&base.output().flatten()[0], &storage).unwrap());
    }

    #[test]
    fn purge_is_idempotent_when_artifact_already_absent() {
        let storage = storage();
        let base: Arc<dyn Task> = Arc::new(Base { name: "base".into() });
        let consumer: Arc<dyn Task> = Arc::new(Consumer {
            parent: base.clone(),
            name: "c".into(),
            ephemeral_input: true,
        });

        let mut manager = ReferenceManager::new([consumer.clone()], storage.clone());
        manager.remove(&consumer);
        manager.remove(&consumer);
    }
}
