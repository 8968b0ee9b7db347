//! Tagged tree for `Task::input()`/`Task::output()` declarations.
//!
//! The source models these as arbitrary nestings of `None`/single/list/
//! tuple/map of `Output`. We re-architect that duck typing as a tagged
//! tree so `flatten`, `assign_storage`, and the identity canonicalizer can
//! all be plain recursive walks over one type instead of runtime type
//! dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::output::Output;
use crate::storage::Storage;

/// `None | Leaf(Output) | Seq[IoTree] | Map[String, IoTree]`.
///
/// `Map` uses `BTreeMap` rather than `HashMap` so the identity hash's
/// canonicalization needs no separate sort pass over map keys.
#[derive(Debug, Clone)]
pub enum IoTree {
    None,
    Leaf(Output),
    Seq(Vec<IoTree>),
    Map(BTreeMap<String, IoTree>),
}

impl IoTree {
    pub fn leaf(output: Output) -> Self {
        IoTree::Leaf(output)
    }

    pub fn seq(items: impl IntoIterator<Item = IoTree>) -> Self {
        IoTree::Seq(items.into_iter().collect())
    }

    pub fn map(items: impl IntoIterator<Item = (String, IoTree)>) -> Self {
        IoTree::Map(items.into_iter().collect())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, IoTree::None)
    }

    /// Flatten to the list of leaf outputs, depth-first, left-to-right.
    pub fn flatten(&self) -> Vec<Output> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Output>) {
        match self {
            IoTree::None => {}
            IoTree::Leaf(output) => out.push(output.clone()),
            IoTree::Seq(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            IoTree::Map(items) => {
                for item in items.values() {
                    item.flatten_into(out);
                }
            }
        }
    }

    /// Recursively bind `storage` to every leaf `Output` in the tree,
    /// returning a new tree (outputs are immutable values; this mirrors
    /// `assign_storage_to_output` in the source).
    pub fn assign_storage(&self, storage: &Arc<dyn Storage>) -> IoTree {
        match self {
            IoTree::None => IoTree::None,
            IoTree::Leaf(output) => IoTree::Leaf(output.clone().assign_storage(storage.clone())),
            IoTree::Seq(items) => {
                IoTree::Seq(items.iter().map(|item| item.assign_storage(storage)).collect())
            }
            IoTree::Map(items) => IoTree::Map(
                items
                    .iter()
                    .map(|(key, item)| (key.clone(), item.assign_storage(storage)))
                    .collect(),
            ),
        }
    }
}

impl From<Output> for IoTree {
    fn from(output: Output) -> Self {
        IoTree::Leaf(output)
    }
}

impl From<Option<Output>> for IoTree {
    fn from(output: Option<Output>) -> Self {
        match output {
            Some(o) => IoTree::Leaf(o),
            None => IoTree::None,
        }
    }
}
