//! The task model: immutable, polymorphic work descriptions with a
//! structural identity hash. Grounded on `alexflow/core.py`'s
//! `AbstractTask`/`Task`/`DynamicTask`/`WrapperTask`/`ResourceSpec`.

pub mod arena;
pub mod identity;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::io_tree::IoTree;
use crate::output::{BinaryOutput, JsonOutput, ObjectOutput, Output, OutputMeta, TabularOutput};

/// `null` task-spec (legacy) vs `"1.0.0"` (current); see spec §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSpecVersion {
    V0,
    V1,
}

/// Which capability a task exposes to the engine (§3, §9: "model a task
/// as a variant Static{run} | Dynamic{generate} | Wrapper{inner}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Static,
    Dynamic,
    Wrapper,
}

/// Advisory machine-resource hints. Never part of identity under schema
/// v1 (P3); always hashed under schema v0 regardless (spec §4.3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpu_requests: Option<String>,
    pub cpu_limits: Option<String>,
    pub memory_requests: Option<String>,
    pub memory_limits: Option<String>,
    pub gpu: Option<i64>,
}

/// An immutable unit of work. Implementors declare their own parameters
/// through `declared_fields` for identity hashing; `input`/`output`
/// declare the IO tree; exactly one of `run`/`generate` applies,
/// selected by `kind`.
pub trait Task: std::fmt::Debug + Send + Sync {
    /// `"<module>.<type>"` used as the `task_id` prefix.
    fn type_name(&self) -> &'static str;

    fn kind(&self) -> TaskKind;

    fn spec_version(&self) -> TaskSpecVersion {
        TaskSpecVersion::V1
    }

    fn resource_spec(&self) -> Option<ResourceSpec> {
        None
    }

    /// Opaque concurrency-grouping tags (parallel mode only, §4.8).
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// This task's own parameters, in declaration order, already
    /// canonicalized via `identity::canon::*`. The reserved version field
    /// and `resource_spec` are never declared here — they're handled by
    /// the identity hasher directly.
    fn declared_fields(&self) -> Vec<identity::Field> {
        Vec::new()
    }

    /// Default forwards to the inner task when this is a wrapper, and to
    /// `IoTree::None` otherwise — matching `AbstractTask.input`'s no-op
    /// default and `WrapperTask.input`'s forwarding in one definition.
    fn input(&self) -> IoTree {
        self.inner().map(|t| t.input()).unwrap_or(IoTree::None)
    }

    fn output(&self) -> IoTree {
        self.inner().map(|t| t.output()).unwrap_or(IoTree::None)
    }

    /// Wrapper tasks only: the task whose identity and IO this one
    /// forwards to (I2). `kind()` must return `TaskKind::Wrapper` when
    /// this returns `Some`.
    fn inner(&self) -> Option<Arc<dyn Task>> {
        None
    }

    /// The tasks this one reads outputs from, as concrete handles.
    ///
    /// `input()` only describes *which outputs* are needed (for existence
    /// checks and storage binding); it can't also answer *which task
    /// produces them*, because `Output` deliberately carries only its
    /// producer's `task_id` string rather than an owning `Arc<dyn Task>`
    /// (see the crate-level design note on cyclic-looking reference
    /// graphs). A task that reads another task's output holds that
    /// producer as an `Arc<dyn Task>` field and declares it here so the
    /// engine and reference manager can walk the graph without needing to
    /// resolve a task from a bare id. Forwards to the inner task for
    /// wrappers, matching `input`/`output`.
    fn dependencies(&self) -> Vec<Arc<dyn Task>> {
        self.inner().map(|t| t.dependencies()).unwrap_or_default()
    }

    /// Static tasks: executes the unit of work against storage-bound IO.
    fn run(&self, _input: IoTree, _output: IoTree) -> Result<(), FlowError> {
        Ok(())
    }

    /// Dynamic tasks: returns the subgraph this task expands to.
    fn generate(&self, _input: IoTree, _output: IoTree) -> Result<Vec<Arc<dyn Task>>, FlowError> {
        Ok(Vec::new())
    }
}

/// Walks a `Wrapper` chain down to the innermost non-wrapper task. The
/// engine dispatches `run`/`generate` against this resolved task, while
/// identity and IO continue to forward lazily through `Task::input`/
/// `Task::output`/`identity::task_id`.
pub fn resolve(task: Arc<dyn Task>) -> Arc<dyn Task> {
    let mut current = task;
    while let Some(inner) = current.inner() {
        current = inner;
    }
    current
}

/// Builds an output whose `src_task_id` is this task's identity and
/// whose key is the caller-supplied `key` (spec §3: "constructed lazily
/// by tasks via a factory that prefixes keys with task_id").
pub fn build_binary_output(task: &dyn Task, key: &str) -> Output {
    Output::Binary(BinaryOutput::new(OutputMeta::new(identity::task_id(task), key.to_string())))
}

pub fn build_json_output(task: &dyn Task, key: &str) -> Output {
    Output::Json(JsonOutput::new(OutputMeta::new(identity::task_id(task), key.to_string())))
}

pub fn build_tabular_output(task: &dyn Task, key: &str) -> Output {
    Output::Tabular(TabularOutput::new(OutputMeta::new(identity::task_id(task), key.to_string())))
}

pub fn build_object_output(task: &dyn Task, key: &str) -> Output {
    Output::Object(ObjectOutput::new(OutputMeta::new(identity::task_id(task), key.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity::{canon, Field};

    #[derive(Debug)]
    struct MyTask {
        arg: Option<String>,
    }

    impl Task for MyTask {
        fn type_name(&self) -> &'static str {
            "test_core.MyTask"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Static
        }

        fn spec_version(&self) -> TaskSpecVersion {
            TaskSpecVersion::V1
        }

        fn declared_fields(&self) -> Vec<Field> {
            vec![Field::new("arg", canon::scalar(&self.arg))]
        }
    }

    #[derive(Debug)]
    struct MyTaskV0 {
        arg: Option<String>,
    }

    impl Task for MyTaskV0 {
        fn type_name(&self) -> &'static str {
            "test_core.MyTask"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Static
        }

        fn spec_version(&self) -> TaskSpecVersion {
            TaskSpecVersion::V0
        }

        fn declared_fields(&self) -> Vec<Field> {
            vec![Field::new("arg", canon::scalar(&self.arg)).no_default()]
        }
    }

    #[derive(Debug)]
    struct Wrapper {
        inner: Arc<dyn Task>,
    }

    impl Task for Wrapper {
        fn type_name(&self) -> &'static str {
            "flowforge::task::tests::Wrapper"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Wrapper
        }

        fn inner(&self) -> Option<Arc<dyn Task>> {
            Some(self.inner.clone())
        }
    }

    #[test]
    fn v0_pinned_digest_with_null_arg() {
        let task = MyTaskV0 { arg: None };
        assert_eq!(
            identity::task_id(&task),
            "test_core.MyTask.0871e69fa5e3a73f77e3ea440a8726bd66646b14"
        );
    }

    #[test]
    fn v1_pinned_digest_with_null_arg() {
        let task = MyTask { arg: None };
        assert_eq!(
            identity::task_id(&task),
            "test_core.MyTask.bf21a9e8fbc5a3846fb05b4fa0859e0917b2202f"
        );
    }

    #[test]
    fn v1_pinned_digest_with_string_arg() {
        let task = MyTask { arg: Some("test".to_string()) };
        assert_eq!(
            identity::task_id(&task),
            "test_core.MyTask.ce12fb848e4a73c2a1f34a24c58f27cf307e123e"
        );
    }

    #[test]
    fn wrapper_task_id_equals_inner_task_id() {
        let inner: Arc<dyn Task> = Arc::new(MyTask { arg: Some("x".into()) });
        let wrapper = Wrapper { inner: inner.clone() };
        assert_eq!(identity::task_id(&wrapper), identity::task_id(inner.as_ref()));
    }

    #[test]
    fn determinism_across_repeated_calls() {
        let task = MyTask { arg: Some("repeat".into()) };
        assert_eq!(identity::task_id(&task), identity::task_id(&task));
    }

    #[test]
    fn resolve_walks_through_wrapper_chain() {
        let inner: Arc<dyn Task> = Arc::new(MyTask { arg: None });
        let wrapper: Arc<dyn Task> = Arc::new(Wrapper { inner: inner.clone() });
        let double_wrapper: Arc<dyn Task> = Arc::new(Wrapper { inner: wrapper });
        let resolved = resolve(double_wrapper);
        assert_eq!(identity::task_id(resolved.as_ref()), identity::task_id(inner.as_ref()));
    }
}
