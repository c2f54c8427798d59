//! Tree algebra
//!
//! Merge, difference and revert operations between two trees. The receiver
//! is the destination `A`; the argument is the source `B`. Together they let a
//! caller diff two trees and turn that diff back into an applicable patch:
//!
//! ```text
//! C = clone(A); C.unique_nodes(B)     // what A has that B lacks
//! D = clone(B); D.unique_values(A)    // what B has that differs from A
//! A.unique_nodes(C); A.merge(D)       // A now equals B
//! ```

use crate::error::StorageError;
use crate::tree::node::{Node, NodeExt};
use crate::tree::volatile::VolatileNode;
use std::sync::Arc;

/// Tree algebra over any node type.
pub trait TreeAlgebra: Node {
    /// Overlay `that` onto this tree. A defined value in `that` replaces ours;
    /// children are created as needed and merged recursively. Branches only
    /// present here are left alone.
    fn merge(&self, that: &dyn Node) -> Result<(), StorageError> {
        if let Some(value) = that.value() {
            self.set_value(Some(&value))?;
        }
        for key in that.keys() {
            let Some(source) = that.get_child(&key) else {
                continue;
            };
            let child = self.create_child(&key)?;
            child.merge(source.as_ref())?;
        }
        Ok(())
    }

    /// Fill gaps from `that` without overwriting any defined value or
    /// existing subtree content.
    fn merge_under(&self, that: &dyn Node) -> Result<(), StorageError> {
        if self.value().is_none() {
            if let Some(value) = that.value() {
                self.set_value(Some(&value))?;
            }
        }
        for key in that.keys() {
            let Some(source) = that.get_child(&key) else {
                continue;
            };
            match self.get_child(&key) {
                Some(child) => child.merge_under(source.as_ref())?,
                None => self.create_child(&key)?.merge(source.as_ref())?,
            }
        }
        Ok(())
    }

    /// Reduce this tree to the paths `that` does not define. Values defined
    /// in `that` are undefined here; nodes left vacant are pruned.
    fn unique_nodes(&self, that: &dyn Node) -> Result<(), StorageError> {
        if that.value().is_some() {
            self.set_value(None)?;
        }
        for key in self.keys() {
            let (Some(child), Some(other)) = (self.get_child(&key), that.get_child(&key)) else {
                continue;
            };
            child.unique_nodes(other.as_ref())?;
            if child.value().is_none() && child.len() == 0 {
                self.remove_child(&key)?;
            }
        }
        Ok(())
    }

    /// Like [`TreeAlgebra::unique_nodes`], but a value is only undefined when
    /// both trees define it with identical text. The result is the forward
    /// delta from `that` to this tree.
    fn unique_values(&self, that: &dyn Node) -> Result<(), StorageError> {
        if let (Some(ours), Some(theirs)) = (self.value(), that.value()) {
            if ours == theirs {
                self.set_value(None)?;
            }
        }
        for key in self.keys() {
            let (Some(child), Some(other)) = (self.get_child(&key), that.get_child(&key)) else {
                continue;
            };
            child.unique_values(other.as_ref())?;
            if child.value().is_none() && child.len() == 0 {
                self.remove_child(&key)?;
            }
        }
        Ok(())
    }

    /// Treat this tree as a patch about to be merged into `that`, and turn it
    /// into the record needed to undo that merge afterwards.
    ///
    /// Values that already agree are dropped. Values `that` lacks become
    /// undefined placeholders, meaning "delete" on revert. Every other value
    /// is replaced by the current value in `that`, so merging the result back
    /// restores it.
    fn changes(&self, that: &dyn Node) -> Result<(), StorageError> {
        record_changes(self, Some(that))?;
        Ok(())
    }

    /// Same value and same children, recursively. Keys are not compared at
    /// the top level.
    fn equals_recursive(&self, that: &dyn Node) -> bool {
        if self.value() != that.value() {
            return false;
        }
        let keys = self.keys();
        if keys != that.keys() {
            return false;
        }
        keys.iter().all(|key| match (self.get_child(key), that.get_child(key)) {
            (Some(a), Some(b)) => a.equals_recursive(b.as_ref()),
            _ => false,
        })
    }

    /// Detached in-memory copy of this subtree.
    fn deep_copy(&self) -> Arc<VolatileNode> {
        let copy = VolatileNode::with_key(&self.key());
        copy_into(copy.as_ref(), self);
        copy
    }
}

impl<T: Node + ?Sized> TreeAlgebra for T {}

fn copy_into<S: Node + ?Sized>(target: &VolatileNode, source: &S) {
    if let Some(value) = source.value() {
        let _ = target.set_value(Some(&value));
    }
    for key in source.keys() {
        if let Some(child) = source.get_child(&key) {
            if let Ok(copy) = target.create_child(&key) {
                let _ = copy.merge(child.as_ref());
            }
        }
    }
}

/// Returns whether `node` must stay in the result.
fn record_changes<N: Node + ?Sized>(node: &N, that: Option<&dyn Node>) -> Result<bool, StorageError> {
    let mut delete_marker = that.is_none();
    if let Some(ours) = node.value() {
        match that.and_then(|t| t.value()) {
            Some(theirs) if theirs == ours => node.set_value(None)?,
            Some(theirs) => node.set_value(Some(&theirs))?,
            None => {
                node.set_value(None)?;
                delete_marker = true;
            }
        }
    }
    for key in node.keys() {
        let Some(child) = node.get_child(&key) else {
            continue;
        };
        let other = that.and_then(|t| t.get_child(&key));
        let keep = record_changes(child.as_ref(), other.as_deref())?;
        if !keep {
            node.remove_child(&key)?;
        }
    }
    Ok(delete_marker || node.value().is_some() || !node.is_empty())
}
