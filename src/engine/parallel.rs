//! Parallel engine: a worker pool dispatching over channels modeling the
//! source's three IPC queues (in/out/err). Grounded on `_execute`,
//! `jobfunc`, `procgen`, and `Worker` in
//! `alexflow/adapters/executor/alexflow.py`.
//!
//! The source isolates each job in its own OS process, since user code
//! (shell commands, native libraries) isn't assumed thread-safe, and
//! because a process can be hard-reset to bound memory growth. This port
//! substitutes OS threads (spec §9 Design Notes: "a systems-language
//! implementation may substitute true threads if user code is known
//! safe"), retaining the periodic-recycle pattern: each worker thread
//! processes up to `JOBS_PER_RECYCLE` jobs before its supervisor respawns
//! it. A job panicking inside `run`/`generate` is caught with
//! `catch_unwind` and reported on the error queue exactly like the
//! source's per-job exception handling; a supervised thread panicking
//! *outside* job handling (a bug, not user code) escalates to fatal
//! `Termination`, mirroring the source's non-zero subprocess exit check.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error};

use crate::error::{FlowError, Termination};
use crate::helper;
use crate::refmanager::ReferenceManager;
use crate::resource::{ResourceBudget, ResourceManager};
use crate::storage::Storage;
use crate::task::{arena, identity, resolve, Task, TaskKind};

use super::{fold_generated, plan_tick};

/// Jobs a worker processes before its supervisor respawns it (matches
/// `jobfunc`'s `range(30)`).
const JOBS_PER_RECYCLE: usize = 30;

/// In-flight dispatch bound before the scheduler's send blocks (matches
/// `buffer = 100` / `time.sleep(0.2)` back-pressure in the source — here
/// a bounded channel gives the same effect without a polling loop).
const IN_QUEUE_BOUND: usize = 100;

const TICK_DELAY: Duration = Duration::from_millis(200);

enum OutMsg {
    Done(Arc<dyn Task>),
    Generated(Arc<dyn Task>, Vec<Arc<dyn Task>>),
}

struct ErrMsg {
    task_id: String,
    trace: String,
}

enum WorkerExit {
    Recycled,
    ChannelClosed,
}

fn process_job(task: Arc<dyn Task>, storage: &Arc<dyn Storage>) -> Result<OutMsg, FlowError> {
    match task.kind() {
        TaskKind::Dynamic => {
            let children = helper::generate_task(&task, storage)?;
            Ok(OutMsg::Generated(task, children))
        }
        TaskKind::Static | TaskKind::Wrapper => {
            helper::run_task(&task, storage)?;
            Ok(OutMsg::Done(task))
        }
    }
}

fn jobfunc(
    q_in: &Mutex<Receiver<Arc<dyn Task>>>,
    q_out: &Sender<OutMsg>,
    q_err: &Sender<ErrMsg>,
    storage: &Arc<dyn Storage>,
) -> WorkerExit {
    for _ in 0..JOBS_PER_RECYCLE {
        let task = {
            let rx = q_in.lock().expect("in-queue mutex poisoned");
            match rx.recv() {
                Ok(task) => task,
                Err(_) => return WorkerExit::ChannelClosed,
            }
        };

        let task_id = identity::task_id(resolve(task.clone()).as_ref());
        debug!(task_id = %task_id, "run");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| process_job(task.clone(), storage)));
        match outcome {
            Ok(Ok(msg)) => {
                debug!(task_id = %task_id, "ack");
                let _ = q_out.send(msg);
            }
            Ok(Err(e)) => {
                let _ = q_err.send(ErrMsg { task_id, trace: e.to_string() });
            }
            Err(payload) => {
                let trace = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "worker job panicked with a non-string payload".to_string());
                let _ = q_err.send(ErrMsg { task_id, trace });
            }
        }
    }
    WorkerExit::Recycled
}

fn supervisor(
    q_in: Arc<Mutex<Receiver<Arc<dyn Task>>>>,
    q_out: Sender<OutMsg>,
    q_err: Sender<ErrMsg>,
    storage: Arc<dyn Storage>,
) {
    loop {
        let q_in = q_in.clone();
        let q_out = q_out.clone();
        let q_err = q_err.clone();
        let storage = storage.clone();

        let handle = thread::spawn(move || jobfunc(&q_in, &q_out, &q_err, &storage));
        match handle.join() {
            Ok(WorkerExit::Recycled) => continue,
            Ok(WorkerExit::ChannelClosed) => return,
            Err(_) => {
                let _ = q_err.send(ErrMsg {
                    task_id: "<worker>".to_string(),
                    trace: "a worker thread exited unexpectedly outside job handling".to_string(),
                });
                return;
            }
        }
    }
}

/// Runs `roots` to completion against `storage` using `n_jobs` worker
/// threads, honoring `budget` (spec §4.7/§4.8).
pub fn run(
    roots: Vec<Arc<dyn Task>>,
    storage: Arc<dyn Storage>,
    n_jobs: usize,
    budget: ResourceBudget,
) -> Result<(), FlowError> {
    let mut task_arena = arena::build(roots.clone());
    let mut resource_manager = ResourceManager::new(budget);
    let mut refmanager = ReferenceManager::new(roots.clone(), storage.clone());

    let (in_tx, in_rx): (SyncSender<Arc<dyn Task>>, Receiver<Arc<dyn Task>>) =
        mpsc::sync_channel(IN_QUEUE_BOUND);
    let in_rx = Arc::new(Mutex::new(in_rx));
    let (out_tx, out_rx) = mpsc::channel::<OutMsg>();
    let (err_tx, err_rx) = mpsc::channel::<ErrMsg>();

    let workers: Vec<_> = (0..n_jobs)
        .map(|_| {
            let in_rx = in_rx.clone();
            let out_tx = out_tx.clone();
            let err_tx = err_tx.clone();
            let storage = storage.clone();
            thread::spawn(move || supervisor(in_rx, out_tx, err_tx, storage))
        })
        .collect();
    drop(out_tx);
    drop(err_tx);

    let mut frontier: HashMap<String, Arc<dyn Task>> = HashMap::new();
    for task in roots {
        let resolved = resolve(task);
        frontier.insert(identity::task_id(resolved.as_ref()), resolved);
    }
    let mut running: HashSet<String> = HashSet::new();

    let result = (|| -> Result<(), FlowError> {
        while !frontier.is_empty() || !running.is_empty() {
            if let Ok(err_msg) = err_rx.try_recv() {
                error!(task_id = %err_msg.task_id, trace = %err_msg.trace, "raise");
                return Err(FlowError::Termination(Termination {
                    task_id: err_msg.task_id,
                    cause: err_msg.trace,
                }));
            }

            while let Ok(msg) = out_rx.try_recv() {
                match msg {
                    OutMsg::Done(task) => {
                        let task_id = identity::task_id(resolve(task.clone()).as_ref());
                        running.remove(&task_id);
                        resource_manager.remove(task.as_ref());
                        refmanager.remove(&task);
                    }
                    OutMsg::Generated(task, children) => {
                        let task_id = identity::task_id(resolve(task.clone()).as_ref());
                        running.remove(&task_id);
                        resource_manager.remove(task.as_ref());
                        for child in &children {
                            refmanager.add(child.clone());
                        }
                        task_arena.extend(arena::build(children.clone()));
                        refmanager.remove(&task);
                        fold_generated(&mut frontier, &running, children);
                    }
                }
            }

            let plan = plan_tick(&frontier, &running, &task_arena, &storage)?;
            frontier = plan.next_frontier;

            for task in plan.dispatchable {
                let task_id = identity::task_id(task.as_ref());

                if !resource_manager.is_runnable(task.as_ref()) {
                    frontier.insert(task_id, task);
                    continue;
                }

                resource_manager.add(task.as_ref());
                running.insert(task_id);

                if in_tx.send(task).is_err() {
                    return Err(FlowError::Termination(Termination {
                        task_id: "<scheduler>".to_string(),
                        cause: "worker pool disconnected unexpectedly".to_string(),
                    }));
                }
            }

            thread::sleep(TICK_DELAY);
        }

        Ok(())
    })();

    drop(in_tx);
    for worker in workers {
        let _ = worker.join();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_tree::IoTree;
    use crate::output::Output;
    use crate::storage::local::LocalStorage;
    use crate::task::identity::{canon, Field};
    use crate::task::TaskSpecVersion;
    use std::time::Instant;

    #[derive(Debug)]
    struct SleepAndWrite {
        name: String,
        millis: u64,
        tag: Option<String>,
    }

    impl Task for SleepAndWrite {
        fn type_name(&self) -> &'static str {
            "parallel_tests.SleepAndWrite"
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

        fn tags(&self) -> Vec<String> {
            self.tag.iter().cloned().collect()
        }

        fn output(&self) -> IoTree {
            crate::task::build_binary_output(self, "out.bin").into()
        }

        fn run(&self, _input: IoTree, output: IoTree) -> Result<(), FlowError> {
            thread::sleep(Duration::from_millis(self.millis));
            if let Output::Binary(b) = &output.flatten()[0] {
                b.store(&self.name)?;
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Boom;

    impl Task for Boom {
        fn type_name(&self) -> &'static str {
            "parallel_tests.Boom"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Static
        }

        fn output(&self) -> IoTree {
            crate::task::build_binary_output(self, "out.bin").into()
        }

        fn run(&self, _input: IoTree, _output: IoTree) -> Result<(), FlowError> {
            panic!("boom");
        }
    }

    fn storage() -> Arc<dyn Storage> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_owned();
        std::mem::forget(dir);
        Arc::new(LocalStorage::new(path))
    }

    #[test]
    fn independent_tasks_all_complete() {
        let storage = storage();
        let tasks: Vec<Arc<dyn Task>> = (0..4)
            .map(|i| Arc::new(SleepAndWrite { name: format!("t{i}"), millis: 10, tag: None }) as Arc<dyn Task>)
            .collect();

        run(tasks.clone(), storage.clone(), 4, ResourceBudget::empty()).unwrap();

        for task in &tasks {
            assert!(helper::is_completed(task, &storage).unwrap());
        }
    }

    #[test]
    fn tight_resource_budget_serializes_tagged_tasks() {
        let storage = storage();
        let tasks: Vec<Arc<dyn Task>> = (0..3)
            .map(|i| {
                Arc::new(SleepAndWrite { name: format!("r{i}"), millis: 150, tag: Some("r".into()) })
                    as Arc<dyn Task>
            })
            .collect();

        let start = Instant::now();
        run(tasks, storage, 3, ResourceBudget::new([("r".to_string(), 1)])).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[derive(Debug)]
    struct FreshProducer {
        name: String,
    }

    impl Task for FreshProducer {
        fn type_name(&self) -> &'static str {
            "parallel_tests.FreshProducer"
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
            "parallel_tests.FreshChild"
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
            "parallel_tests.GeneratesTailOnly"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Dynamic
        }

        fn generate(&self, _input: IoTree, _output: IoTree) -> Result<Vec<Arc<dyn Task>>, FlowError> {
            let producer: Arc<dyn Task> = Arc::new(FreshProducer { name: "p".into() });
            let child: Arc<dyn Task> = Arc::new(FreshChild { parent: producer });
            // Only the tail of the locally-built subgraph is returned; the
            // producer is discoverable solely through `child.dependencies()`.
            Ok(vec![child])
        }
    }

    #[test]
    fn generated_child_can_reference_a_producer_built_in_the_same_generate_call() {
        let storage = storage();
        let root: Arc<dyn Task> = Arc::new(GeneratesTailOnly);

        run(vec![root], storage.clone(), 2, ResourceBudget::empty()).unwrap();
    }

    #[test]
    fn a_panicking_task_terminates_the_run() {
        let storage = storage();
        let task: Arc<dyn Task> = Arc::new(Boom);
        let err = run(vec![task], storage, 2, ResourceBudget::empty()).unwrap_err();
        assert!(matches!(err, FlowError::Termination(_)));
    }
}
