//! Fixture tasks exposed behind the `test-support` feature, for use from
//! integration tests and the CLI's demo surface. Grounded on
//! `alexflow/testing/tasks.py` (`Task1`, `Task2`, `WriteValue`,
//! `DynamicTask1`).

use std::sync::Arc;

use crate::error::FlowError;
use crate::io_tree::IoTree;
use crate::output::Output;
use crate::task::identity::{canon, Field};
use crate::task::{build_binary_output, Task, TaskKind, TaskSpecVersion};

/// A root task with no dependencies. Writes `{"name": name}`-equivalent
/// data (here just the name itself, since the binary codec round-trips
/// any `Serialize` type) to a single declared output.
#[derive(Debug)]
pub struct Task1 {
    pub name: String,
}

impl Task1 {
    pub fn new(name: impl Into<String>) -> Self {
        Task1 { name: name.into() }
    }
}

impl Task for Task1 {
    fn type_name(&self) -> &'static str {
        "testing.Task1"
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
        build_binary_output(self, "output.pkl").into()
    }

    fn run(&self, _input: IoTree, output: IoTree) -> Result<(), FlowError> {
        if let Output::Binary(b) = &output.flatten()[0] {
            b.store(&self.name)?;
        }
        Ok(())
    }
}

/// A task with a single upstream dependency, otherwise identical to
/// `Task1`.
#[derive(Debug)]
pub struct Task2 {
    pub parent: Arc<dyn Task>,
    pub name: String,
}

impl Task2 {
    pub fn new(parent: Arc<dyn Task>, name: impl Into<String>) -> Self {
        Task2 { parent, name: name.into() }
    }
}

impl Task for Task2 {
    fn type_name(&self) -> &'static str {
        "testing.Task2"
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
        self.parent.output()
    }

    fn output(&self) -> IoTree {
        build_binary_output(self, "output.pkl").into()
    }

    fn run(&self, _input: IoTree, output: IoTree) -> Result<(), FlowError> {
        if let Output::Binary(b) = &output.flatten()[0] {
            b.store(&self.name)?;
        }
        Ok(())
    }
}

/// Writes an explicitly-supplied value to a caller-supplied target
/// output, rather than one it declares itself. Used as the tail of a
/// dynamic task's generated subgraph (`DynamicTask1::generate` below).
#[derive(Debug)]
pub struct WriteValue {
    pub value: String,
    pub target: Output,
}

impl Task for WriteValue {
    fn type_name(&self) -> &'static str {
        "testing.WriteValue"
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Static
    }

    fn spec_version(&self) -> TaskSpecVersion {
        TaskSpecVersion::V1
    }

    fn declared_fields(&self) -> Vec<Field> {
        vec![
            Field::new("value", canon::scalar(&self.value)),
            Field::new("target", canon::output(&self.target)),
        ]
    }

    fn output(&self) -> IoTree {
        IoTree::Leaf(self.target.clone())
    }

    fn run(&self, _input: IoTree, output: IoTree) -> Result<(), FlowError> {
        if let Output::Binary(b) = &output.flatten()[0] {
            b.store(&self.value)?;
        }
        Ok(())
    }
}

/// Reads its parent's written name and returns a single `WriteValue`
/// task that copies it into this task's own declared output — the
/// minimal dynamic-task expansion scenario (spec §8 scenario 4).
#[derive(Debug)]
pub struct DynamicTask1 {
    pub parent: Arc<dyn Task>,
}

impl DynamicTask1 {
    pub fn new(parent: Arc<dyn Task>) -> Self {
        DynamicTask1 { parent }
    }
}

impl Task for DynamicTask1 {
    fn type_name(&self) -> &'static str {
        "testing.DynamicTask1"
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Dynamic
    }

    fn spec_version(&self) -> TaskSpecVersion {
        TaskSpecVersion::V1
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
        build_binary_output(self, "output.pkl").into()
    }

    fn generate(&self, input: IoTree, output: IoTree) -> Result<Vec<Arc<dyn Task>>, FlowError> {
        let value: String = match &input.flatten()[0] {
            Output::Binary(b) => b.load()?,
            _ => return Err(FlowError::other("DynamicTask1 expects a binary parent output")),
        };
        let target = output.flatten().remove(0);
        Ok(vec![Arc::new(WriteValue { value, target })])
    }
}
