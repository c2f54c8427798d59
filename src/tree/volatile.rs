//! In-memory tree nodes.

use crate::error::StorageError;
use crate::tree::branch::Branch;
use crate::tree::listener::NodeListener;
use crate::tree::node::{Node, NodeRef};
use std::sync::{Arc, Weak};

/// Plain mutable node held entirely in memory.
///
/// Children created through this node are also volatile. [`VolatileNode::link`]
/// can present an existing node of any kind as a child without re-parenting it.
pub struct VolatileNode {
    this: Weak<VolatileNode>,
    branch: Branch,
}

impl VolatileNode {
    /// New root with an empty key.
    pub fn new() -> Arc<Self> {
        Self::with_key("")
    }

    /// New root with the given key.
    pub fn with_key(key: &str) -> Arc<Self> {
        Self::child_of(Weak::<VolatileNode>::new(), key)
    }

    /// New root with a key and a defined value.
    pub fn with_value(key: &str, value: &str) -> Arc<Self> {
        let node = Self::with_key(key);
        node.branch.set_value(Some(value));
        node
    }

    pub(crate) fn child_of(parent: Weak<dyn Node>, key: &str) -> Arc<Self> {
        Arc::new_cyclic(|this| VolatileNode {
            this: this.clone(),
            branch: Branch::new(parent, key),
        })
    }

    fn weak(&self) -> Weak<dyn Node> {
        self.this.clone()
    }

    /// Present `node` as a child under its own key. The node keeps its
    /// original parent, so the same object may appear under several
    /// logical parents.
    pub fn link(&self, node: NodeRef) {
        let key = node.key();
        self.branch.insert(&key, node);
    }

    /// Like [`VolatileNode::link`], under an explicit key.
    pub fn link_as(&self, key: &str, node: NodeRef) {
        self.branch.insert(key, node);
    }
}

impl Node for VolatileNode {
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
        self.branch.set_value(value);
        Ok(())
    }

    fn get_child(&self, key: &str) -> Option<NodeRef> {
        self.branch.child(key)
    }

    fn has_child(&self, key: &str) -> bool {
        self.branch.has_child(key)
    }

    fn create_child(&self, key: &str) -> Result<NodeRef, StorageError> {
        let (child, _) = self.branch.child_or_insert_with(key, || {
            let child: NodeRef = VolatileNode::child_of(self.weak(), key);
            child
        });
        Ok(child)
    }

    fn remove_child(&self, key: &str) -> Result<(), StorageError> {
        self.branch.remove(key);
        Ok(())
    }

    fn remove_all(&self) -> Result<(), StorageError> {
        self.branch.remove_all();
        Ok(())
    }

    fn move_child(&self, from: &str, to: &str) -> Result<(), StorageError> {
        if from != to {
            self.branch.rename(from, to);
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
        true
    }

    fn add_listener(&self, listener: Arc<dyn NodeListener>) {
        self.branch.listeners().add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn NodeListener>) {
        self.branch.listeners().remove(listener);
    }

    fn prune(&self) {
        self.branch.prune(self);
    }

    fn detach_child(&self, key: &str, child: &dyn Node) -> bool {
        self.branch.detach(key, child)
    }

    fn assign_key(&self, key: &str) {
        self.branch.assign_key(key);
    }
}

impl std::fmt::Debug for VolatileNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatileNode")
            .field("key", &self.branch.key())
            .field("value", &self.branch.value())
            .field("children", &self.branch.keys())
            .finish()
    }
}
