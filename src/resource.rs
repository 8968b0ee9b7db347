//! Resource manager: bounds concurrency per opaque tag, independent of
//! worker count. Grounded on `ResourceManager` in
//! `alexflow/adapters/executor/alexflow.py`. Parallel-mode only (spec
//! §4.7/§9 — sequential mode doesn't honor tags by design).

use std::collections::HashMap;
use std::sync::Arc;

use crate::task::Task;

/// `tag -> max concurrency`. Tags absent from the budget are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct ResourceBudget {
    limits: HashMap<String, usize>,
}

impl ResourceBudget {
    pub fn new(limits: impl IntoIterator<Item = (String, usize)>) -> Self {
        ResourceBudget { limits: limits.into_iter().collect() }
    }

    pub fn empty() -> Self {
        ResourceBudget { limits: HashMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    pub fn limit_for(&self, tag: &str) -> Option<usize> {
        self.limits.get(tag).copied()
    }
}

/// Live-count tracker consulted by the scheduler before dispatch.
#[derive(Debug, Default)]
pub struct ResourceManager {
    budget: ResourceBudget,
    running: HashMap<String, usize>,
}

impl ResourceManager {
    pub fn new(budget: ResourceBudget) -> Self {
        ResourceManager { budget, running: HashMap::new() }
    }

    /// True iff dispatching `task` would not push any of its tagged
    /// budgets over their declared maximum. Tags with no declared budget
    /// never block.
    pub fn is_runnable(&self, task: &dyn Task) -> bool {
        task.tags().iter().all(|tag| match self.budget.limit_for(tag) {
            None => true,
            Some(max) => self.running.get(tag).copied().unwrap_or(0) + 1 <= max,
        })
    }

    /// Charge `task`'s tags on dispatch.
    pub fn add(&mut self, task: &dyn Task) {
        for tag in task.tags() {
            *self.running.entry(tag).or_insert(0) += 1;
        }
    }

    /// Release `task`'s tags on completion. Panics on underflow (RC1-style
    /// invariant: a tag can never go negative — a bug in the scheduler's
    /// dispatch/completion pairing, not a runtime condition to recover from).
    pub fn remove(&mut self, task: &dyn Task) {
        for tag in task.tags() {
            let count = self.running.get_mut(&tag).expect("removing untracked resource tag");
            assert!(*count > 0, "resource tag {tag} underflowed");
            *count -= 1;
        }
    }

    pub fn live_count(&self, tag: &str) -> usize {
        self.running.get(tag).copied().unwrap_or(0)
    }
}

/// Tags across a task and its declared prerequisites that carry no
/// budget entry but would be meaningless outside parallel mode (spec
/// Design Notes: sequential mode ignoring tags silently is replaced here
/// with an up-front rejection when tags are actually declared).
pub fn any_tagged(tasks: &[Arc<dyn Task>]) -> bool {
    tasks.iter().any(|t| !t.tags().is_empty())
}
