//! Sequential engine: inline dispatch, no queues, no resource manager.
//! Grounded on `_sequential_execute` in
//! `alexflow/adapters/executor/alexflow.py`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::FlowError;
use crate::helper;
use crate::refmanager::ReferenceManager;
use crate::resource::any_tagged;
use crate::storage::Storage;
use crate::task::{arena, identity, resolve, Task, TaskKind};

use super::{fold_generated, plan_tick};

/// Runs `roots` to completion against `storage`, one task at a time.
///
/// Rejects up front when any task in the transitive closure declares a
/// resource tag (spec §9 open question: the source silently ignores
/// tags in sequential mode; this surfaces it as a configuration error
/// instead, since `n_jobs == 1` makes every tag meaningless).
pub fn run(roots: Vec<Arc<dyn Task>>, storage: Arc<dyn Storage>) -> Result<(), FlowError> {
    let mut task_arena = arena::build(roots.clone());

    let all_tasks: Vec<Arc<dyn Task>> = task_arena.values().cloned().collect();
    if any_tagged(&all_tasks) {
        return Err(FlowError::config(
            "resource tags were declared but n_jobs == 1; resource tags only apply in parallel mode",
        ));
    }

    let mut refmanager = ReferenceManager::new(roots.clone(), storage.clone());
    let running: HashSet<String> = HashSet::new();

    let mut frontier: HashMap<String, Arc<dyn Task>> = HashMap::new();
    for task in roots {
        let resolved = resolve(task);
        frontier.insert(identity::task_id(resolved.as_ref()), resolved);
    }

    while !frontier.is_empty() {
        let plan = plan_tick(&frontier, &running, &task_arena, &storage)?;
        frontier = plan.next_frontier;

        for task in plan.dispatchable {
            let task_id = identity::task_id(task.as_ref());
            debug!(task_id = %task_id, "run");

            match task.kind() {
                TaskKind::Dynamic => {
                    let children = helper::generate_task(&task, &storage)?;
                    for child in &children {
                        refmanager.add(child.clone());
                    }
                    task_arena.extend(arena::build(children.clone()));
                    refmanager.remove(&task);
                    fold_generated(&mut frontier, &running, children);
                }
                TaskKind::Static | TaskKind::Wrapper => {
                    helper::run_task(&task, &storage)?;
                    refmanager.remove(&task);
                }
            }

            debug!(task_id = %task_id, "ack");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_tree::IoTree;
    use crate::output::Output;
    use crate::storage::local::LocalStorage;
    use crate::task::identity::{canon, Field};
    use crate::task::TaskSpecVersion;

    #[derive(Debug)]
    struct WriteName {
        name: String,
        parent: Option<Arc<dyn Task>>,
    }

    impl Task for WriteName {
        fn type_name(&self) -> &'static str {
            "sequential_tests.WriteName"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Static
        }

        fn spec_version(&self) -> TaskSpecVersion {
            TaskSpecVersion::V1
        }

        fn declared_fields(&self) -> Vec<Field> {
            vec![
                Field::new("name", canon::scalar(&self.name)),
                Field::new("parent", canon::opt_task(self.parent.as_deref())),
            ]
        }

        fn dependencies(&self) -> Vec<Arc<dyn Task>> {
            self.parent.iter().cloned().collect()
        }

        fn input(&self) -> IoTree {
            match &self.parent {
                Some(p) => p.output(),
                None => IoTree::None,
            }
        }

        fn output(&self) -> IoTree {
            crate::task::build_binary_output(self, "out.bin").into()
        }

        fn run(&self, _input: IoTree, output: IoTree) -> Result<(), FlowError> {
            if let Output::Binary(b) = &output.flatten()[0] {
                b.store(&self.name)?;
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Tagged;

    impl Task for Tagged {
        fn type_name(&self) -> &'static str {
            "sequential_tests.Tagged"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Static
        }

        fn tags(&self) -> Vec<String> {
            vec!["gpu".into()]
        }

        fn output(&self) -> IoTree {
            crate::task::build_binary_output(self, "out.bin").into()
        }
    }

    fn storage() -> Arc<dyn Storage> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_owned();
        std::mem::forget(dir);
        Arc::new(LocalStorage::new(path))
    }

    #[test]
    fn linear_pipeline_runs_all_three_in_dependency_order() {
        let storage = storage();
        let a: Arc<dyn Task> = Arc::new(WriteName { name: "a".into(), parent: None });
        let b: Arc<dyn Task> = Arc::new(WriteName { name: "b".into(), parent: Some(a.clone()) });
        let c: Arc<dyn Task> = Arc::new(WriteName { name: "c".into(), parent: Some(b.clone()) });

        run(vec![c.clone()], storage.clone()).unwrap();

        for task in [&a, &b, &c] {
            assert!(helper::is_completed(task, &storage).unwrap());
        }
    }

    #[test]
    fn rerunning_a_completed_workflow_is_a_no_op() {
        let storage = storage();
        let a: Arc<dyn Task> = Arc::new(WriteName { name: "a".into(), parent: None });
        run(vec![a.clone()], storage.clone()).unwrap();
        run(vec![a.clone()], storage.clone()).unwrap();
        assert!(helper::is_completed(&a, &storage).unwrap());
    }

    #[derive(Debug)]
    struct FreshProducer {
        name: String,
    }

    impl Task for FreshProducer {
        fn type_name(&self) -> &'static str {
            "sequential_tests.FreshProducer"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Static
        }

        fn declared_fields(&self) -> Vec<Field> {
            vec![Field::new("name", canon::scalar(&self.name))]
        }

        fn output(&self) -> IoTree {
            crate::task::build_binary_output(self, "out.bin").into()
        }

        fn run(&self, _input: IoTree, output: IoTree) -> Result<(), FlowError> {
            if let Output::Binary(b) = &output.flatten()[0] {
                b.store(&self.name)?;
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FreshChild {
        parent: Arc<dyn Task>,
    }

    impl Task for FreshChild {
        fn type_name(&self) -> &'static str {
            "sequential_tests.FreshChild"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Static
        }

        fn declared_fields(&self) -> Vec<Field> {
            vec![Field::new("parent", canon::task(self.parent.as_ref()))]
        }

        fn dependencies(&self) -> Vec<Arc<dyn Task>> {
            vec![self.parent.clone()]
        }

        fn input(&self) -> IoTree {
            self.parent.output()
        }

        fn output(&self) -> IoTree {
            crate::task::build_binary_output(self, "out.bin").into()
        }

        fn run(&self, _input: IoTree, output: IoTree) -> Result<(), FlowError> {
            if let Output::Binary(b) = &output.flatten()[0] {
                b.store(&"child".to_string())?;
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct GeneratesTailOnly;

    impl Task for GeneratesTailOnly {
        fn type_name(&self) -> &'static str {
            "sequential_tests.GeneratesTailOnly"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Dynamic
        }

        fn generate(&self, _input: IoTree, _output: IoTree) -> Result<Vec<Arc<dyn Task>>, FlowError> {
            let producer: Arc<dyn Task> = Arc::new(FreshProducer { name: "p".into() });
            let child: Arc<dyn Task> = Arc::new(FreshChild { parent: producer });
            // Only the tail of the locally-built subgraph is returned, same
            // as the source's own adapters — the producer is discoverable
            // solely through `child.dependencies()`.
            Ok(vec![child])
        }
    }

    #[test]
    fn generated_child_can_reference_a_producer_built_in_the_same_generate_call() {
        let storage = storage();
        let root: Arc<dyn Task> = Arc::new(GeneratesTailOnly);

        run(vec![root], storage.clone()).unwrap();
    }

    #[test]
    fn resource_tags_are_rejected_under_sequential_mode() {
        let storage = storage();
        let task: Arc<dyn Task> = Arc::new(Tagged);
        let err = run(vec![task], storage).unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }
}
