//! Value and children storage shared by every mutable node variant.
//!
//! The branch owns the node's own lock. No method here calls into a child
//! while that lock is held, and listener events are fired only after it has
//! been released.

use crate::tree::collate::CollatedKey;
use crate::tree::listener::ListenerSet;
use crate::tree::node::{same_node, Node, NodeRef};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Weak;

#[derive(Default)]
pub(crate) struct BranchState {
    pub value: Option<String>,
    pub children: BTreeMap<CollatedKey, NodeRef>,
}

pub(crate) struct Branch {
    key: RwLock<String>,
    parent: Weak<dyn Node>,
    state: RwLock<BranchState>,
    listeners: ListenerSet,
}

impl Branch {
    pub fn new(parent: Weak<dyn Node>, key: &str) -> Self {
        Self {
            key: RwLock::new(key.to_string()),
            parent,
            state: RwLock::new(BranchState::default()),
            listeners: ListenerSet::new(),
        }
    }

    pub fn key(&self) -> String {
        self.key.read().clone()
    }

    pub fn assign_key(&self, key: &str) {
        *self.key.write() = key.to_string();
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.upgrade()
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    pub fn value(&self) -> Option<String> {
        self.state.read().value.clone()
    }

    /// Returns true when the stored value actually changed.
    pub fn set_value(&self, value: Option<&str>) -> bool {
        let changed = {
            let mut state = self.state.write();
            if state.value.as_deref() == value {
                false
            } else {
                state.value = value.map(str::to_string);
                true
            }
        };
        if changed {
            self.listeners.changed();
        }
        changed
    }

    pub fn child(&self, key: &str) -> Option<NodeRef> {
        self.state.read().children.get(key).cloned()
    }

    pub fn has_child(&self, key: &str) -> bool {
        self.state.read().children.contains_key(key)
    }

    /// Existing child under `key`, or a new one built by `make`. The flag is
    /// true when the child was created.
    pub fn child_or_insert_with(
        &self,
        key: &str,
        make: impl FnOnce() -> NodeRef,
    ) -> (NodeRef, bool) {
        let (child, created) = {
            let mut state = self.state.write();
            match state.children.get(key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let child = make();
                    state.children.insert(CollatedKey::from(key), child.clone());
                    (child, true)
                }
            }
        };
        if created {
            self.listeners.child_added(key);
        }
        (child, created)
    }

    /// Attach `node` under `key`, replacing any previous child.
    pub fn insert(&self, key: &str, node: NodeRef) -> Option<NodeRef> {
        let previous = self
            .state
            .write()
            .children
            .insert(CollatedKey::from(key), node);
        match previous {
            Some(_) => self.listeners.child_changed(key, key),
            None => self.listeners.child_added(key),
        }
        previous
    }

    pub fn remove(&self, key: &str) -> Option<NodeRef> {
        let removed = self.state.write().children.remove(key);
        if removed.is_some() {
            self.listeners.child_deleted(key);
        }
        removed
    }

    /// Remove every child; returns how many were removed.
    pub fn remove_all(&self) -> usize {
        let removed = std::mem::take(&mut self.state.write().children);
        if !removed.is_empty() {
            self.listeners.changed();
        }
        removed.len()
    }

    /// Move the child at `from` to `to`, dropping whatever was at `to`.
    /// The caller updates the moved node's own key.
    pub fn rename(&self, from: &str, to: &str) -> Option<NodeRef> {
        let moved = {
            let mut state = self.state.write();
            let node = state.children.remove(from)?;
            state.children.insert(CollatedKey::from(to), node.clone());
            node
        };
        moved.assign_key(to);
        self.listeners.child_changed(from, to);
        Some(moved)
    }

    pub fn detach(&self, key: &str, child: &dyn Node) -> bool {
        let detached = {
            let mut state = self.state.write();
            match state.children.get(key) {
                Some(existing) if same_node(existing.as_ref(), child) => {
                    state.children.remove(key);
                    true
                }
                _ => false,
            }
        };
        if detached {
            self.listeners.child_deleted(key);
        }
        detached
    }

    /// Ask the parent to drop this node when it holds nothing, then give the
    /// parent the same chance. A write that lands between the check and the
    /// detach is lost with the node.
    pub fn prune(&self, this: &dyn Node) -> bool {
        let vacant = {
            let state = self.state.read();
            state.value.is_none() && state.children.is_empty()
        };
        if !vacant {
            return false;
        }
        let Some(parent) = self.parent.upgrade() else {
            return false;
        };
        let detached = parent.detach_child(&self.key(), this);
        if detached {
            parent.prune();
        }
        detached
    }

    pub fn keys(&self) -> Vec<String> {
        self.state
            .read()
            .children
            .keys()
            .map(|k| k.as_str().to_string())
            .collect()
    }

    pub fn children(&self) -> Vec<NodeRef> {
        self.state.read().children.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().children.len()
    }

    /// Replace value and children wholesale without firing events.
    pub fn replace(&self, value: Option<String>, children: BTreeMap<CollatedKey, NodeRef>) {
        let mut state = self.state.write();
        state.value = value;
        state.children = children;
    }
}
