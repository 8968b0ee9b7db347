//! Identity-indexed task arena: resolves a bare `task_id` string back to
//! its `Arc<dyn Task>` handle by walking `Task::dependencies()`.
//!
//! Exists to solve the "cyclic-looking reference graph" problem (spec
//! §9 Design Notes): outputs carry their producer's `task_id` as a
//! string, not an owning reference, so any graph walk that needs to go
//! from an output back to the task that made it — the scheduler's
//! prerequisite discovery, the reference manager's recursive purge —
//! needs this arena to resolve the id.

use std::collections::HashMap;
use std::sync::Arc;

use super::{identity, resolve, Task};

/// BFS over `dependencies()` starting from `roots`, keyed by resolved
/// `task_id` (wrapper chains collapse to their inner task, matching
/// `task_id`'s own forwarding).
pub fn build(roots: impl IntoIterator<Item = Arc<dyn Task>>) -> HashMap<String, Arc<dyn Task>> {
    let mut arena = HashMap::new();
    let mut frontier: HashMap<String, Arc<dyn Task>> = HashMap::new();

    for task in roots {
        let resolved = resolve(task);
        let task_id = identity::task_id(resolved.as_ref());
        frontier.insert(task_id, resolved);
    }

    while !frontier.is_empty() {
        let mut next = HashMap::new();

        for (task_id, task) in frontier.drain() {
            for dependency in task.dependencies() {
                let dep = resolve(dependency);
                let dep_id = identity::task_id(dep.as_ref());
                if !arena.contains_key(&dep_id) {
                    next.insert(dep_id, dep);
                }
            }
            arena.insert(task_id, task);
        }

        frontier = next;
    }

    arena
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_tree::IoTree;
    use crate::task::identity::{canon, Field};
    use crate::task::TaskKind;

    #[derive(Debug)]
    struct Leaf;

    impl Task for Leaf {
        fn type_name(&self) -> &'static str {
            "arena_tests.Leaf"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Static
        }
    }

    #[derive(Debug)]
    struct Consumer {
        parent: Arc<dyn Task>,
    }

    impl Task for Consumer {
        fn type_name(&self) -> &'static str {
            "arena_tests.Consumer"
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
            IoTree::None
        }
    }

    #[test]
    fn arena_includes_roots_and_transitive_dependencies() {
        let leaf: Arc<dyn Task> = Arc::new(Leaf);
        let consumer: Arc<dyn Task> = Arc::new(Consumer { parent: leaf.clone() });

        let arena = build([consumer.clone()]);

        assert_eq!(arena.len(), 2);
        assert!(arena.contains_key(&identity::task_id(leaf.as_ref())));
        assert!(arena.contains_key(&identity::task_id(consumer.as_ref())));
    }
}
