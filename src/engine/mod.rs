//! Shared scheduler core: the frontier walk common to both execution
//! modes (spec §4.7 steps 1-4). Grounded on the `tasks`/`next_tasks`
//! walk shared by `_execute`/`_sequential_execute` in
//! `alexflow/adapters/executor/alexflow.py`.

pub mod parallel;
pub mod sequential;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::FlowError;
use crate::helper;
use crate::storage::Storage;
use crate::task::{identity, resolve, Task};

pub(crate) struct TickPlan {
    pub dispatchable: Vec<Arc<dyn Task>>,
    pub next_frontier: HashMap<String, Arc<dyn Task>>,
}

/// One scheduling tick. For every non-running task in `frontier`: skip if
/// already complete; otherwise flatten its declared inputs and check each
/// against storage. Any input whose producing task is incomplete makes
/// `task` (and that producer) land in `next_frontier` instead of being
/// dispatched. Everything else is returned as dispatchable.
///
/// Tasks already in `running` are dropped from consideration for this
/// tick entirely (they fall back into the frontier only through
/// completion/generation messages) — mirrors the source's
/// `if task.task_id in running: continue`.
///
/// `arena` must resolve every producer a task in `frontier` can possibly
/// reference, including producers that only came into existence inside a
/// prior tick's `generate()` call. Callers extend it with
/// `arena::build(children)` every time they fold freshly generated
/// children into the frontier — a producer missing from `arena` is
/// silently dropped from `next_frontier` at line below, which stalls the
/// blocked task forever with no error (see `refmanager::ReferenceManager::add`
/// for the same refresh applied to its own local arena).
pub(crate) fn plan_tick(
    frontier: &HashMap<String, Arc<dyn Task>>,
    running: &HashSet<String>,
    arena: &HashMap<String, Arc<dyn Task>>,
    storage: &Arc<dyn Storage>,
) -> Result<TickPlan, FlowError> {
    let mut next_frontier: HashMap<String, Arc<dyn Task>> = HashMap::new();
    let mut dispatchable = Vec::new();

    for (task_id, task) in frontier {
        if running.contains(task_id) {
            continue;
        }

        if helper::is_completed(task, storage)? {
            continue;
        }

        let mut blocked = false;
        for input in task.input().flatten() {
            if !helper::exists_output(&input, storage)? {
                blocked = true;
                if let Some(producer) = arena.get(input.src_task_id()) {
                    next_frontier.insert(input.src_task_id().to_string(), producer.clone());
                }
            }
        }

        if blocked {
            next_frontier.insert(task_id.clone(), task.clone());
            continue;
        }

        dispatchable.push(task.clone());
    }

    Ok(TickPlan { dispatchable, next_frontier })
}

/// Folds newly generated child tasks into `frontier`, skipping any
/// already in flight (spec §4.7 step 3: "fold produced children into the
/// frontier unless already running").
pub(crate) fn fold_generated(
    frontier: &mut HashMap<String, Arc<dyn Task>>,
    running: &HashSet<String>,
    children: Vec<Arc<dyn Task>>,
) {
    for child in children {
        let resolved = resolve(child);
        let task_id = identity::task_id(resolved.as_ref());
        if !running.contains(&task_id) {
            frontier.entry(task_id).or_insert(resolved);
        }
    }
}
