//! Nodes that track unsaved changes.

use crate::error::StorageError;
use crate::tree::branch::Branch;
use crate::tree::collate::CollatedKey;
use crate::tree::listener::NodeListener;
use crate::tree::node::{Node, NodeRef};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Mutable node with a dirty flag.
///
/// Every mutation calls [`Node::mark_changed`]. The first mark on a clean
/// node is forwarded to the parent, so an edit anywhere inside a document
/// reaches the document root in one pass. Propagation stops at the first
/// ancestor that is already dirty, or at a parent that does not track
/// changes.
///
/// Write permission is fixed when the node is built and inherited by every
/// child it creates. A read-only node rejects all mutations.
pub struct PersistentNode {
    this: Weak<PersistentNode>,
    branch: Branch,
    writable: bool,
    dirty: AtomicBool,
}

impl PersistentNode {
    pub(crate) fn child_of(parent: Weak<dyn Node>, key: &str, writable: bool) -> Arc<Self> {
        Arc::new_cyclic(|this| PersistentNode {
            this: this.clone(),
            branch: Branch::new(parent, key),
            writable,
            dirty: AtomicBool::new(false),
        })
    }

    /// Deep copy of `source` under `parent`, built clean (no dirty flags and
    /// no events).
    pub(crate) fn copy_of(parent: Weak<dyn Node>, source: &dyn Node, writable: bool) -> Arc<Self> {
        let node = Self::child_of(parent, &source.key(), writable);
        let children = Self::copy_children(node.weak(), source, writable);
        node.branch.replace(source.value(), children);
        node
    }

    /// Clean deep copies of every child of `source`, keyed for a branch.
    pub(crate) fn copy_children(
        parent: Weak<dyn Node>,
        source: &dyn Node,
        writable: bool,
    ) -> BTreeMap<CollatedKey, NodeRef> {
        let mut children = BTreeMap::new();
        for key in source.keys() {
            if let Some(child) = source.get_child(&key) {
                let copy: NodeRef = Self::copy_of(parent.clone(), child.as_ref(), writable);
                children.insert(CollatedKey::from(key), copy);
            }
        }
        children
    }

    fn weak(&self) -> Weak<dyn Node> {
        self.this.clone()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.writable {
            Ok(())
        } else {
            Err(StorageError::ReadOnly(self.key()))
        }
    }
}

impl Node for PersistentNode {
    fn key(&self) -> String {
        self.branch.key()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.branch.parent()
    }

    fn value(&self) -> Option<String> {
        self.branch.value()
    }

    fn set_value(&self, value: Option<&str>) -> Result<(), StorageError> {
        self.check_writable()?;
        if self.branch.set_value(value) {
            self.mark_changed();
        }
        Ok(())
    }

    fn get_child(&self, key: &str) -> Option<NodeRef> {
        self.branch.child(key)
    }

    fn has_child(&self, key: &str) -> bool {
        self.branch.has_child(key)
    }

    fn create_child(&self, key: &str) -> Result<NodeRef, StorageError> {
        self.check_writable()?;
        let (child, created) = self.branch.child_or_insert_with(key, || {
            let child: NodeRef = PersistentNode::child_of(self.weak(), key, true);
            child
        });
        if created {
            self.mark_changed();
        }
        Ok(child)
    }

    fn remove_child(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        if self.branch.remove(key).is_some() {
            self.mark_changed();
        }
        Ok(())
    }

    fn remove_all(&self) -> Result<(), StorageError> {
        self.check_writable()?;
        if self.branch.remove_all() > 0 {
            self.mark_changed();
        }
        Ok(())
    }

    fn move_child(&self, from: &str, to: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        if from != to && self.branch.rename(from, to).is_some() {
            self.mark_changed();
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.branch.keys()
    }

    fn len(&self) -> usize {
        self.branch.len()
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn add_listener(&self, listener: Arc<dyn NodeListener>) {
        self.branch.listeners().add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn NodeListener>) {
        self.branch.listeners().remove(listener);
    }

    fn mark_changed(&self) {
        if !self.dirty.swap(true, Ordering::SeqCst) {
            if let Some(parent) = self.branch.parent() {
                parent.mark_changed();
            }
        }
    }

    fn clear_changed(&self) {
        self.dirty.store(false, Ordering::SeqCst);
        for child in self.branch.children() {
            child.clear_changed();
        }
    }

    fn is_changed(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn prune(&self) {
        self.branch.prune(self);
    }

    fn detach_child(&self, key: &str, child: &dyn Node) -> bool {
        let detached = self.branch.detach(key, child);
        if detached {
            self.mark_changed();
        }
        detached
    }

    fn assign_key(&self, key: &str) {
        self.branch.assign_key(key);
    }
}

impl std::fmt::Debug for PersistentNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentNode")
            .field("key", &self.branch.key())
            .field("value", &self.branch.value())
            .field("dirty", &self.is_changed())
            .field("children", &self.branch.keys())
            .finish()
    }
}
