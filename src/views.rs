//! Overlay Views
//!
//! A [`ComboView`] stacks several containers into one namespace. Each key is
//! supplied by the highest-precedence member that has it; the same key in
//! lower members is hidden, not merged field by field. Writes land in the
//! supplying member when it is writable, and otherwise in the primary member,
//! which then outranks the read-only copy.

use crate::error::StorageError;
use crate::tree::{ChangeEvent, CollatedKey, ListenerSet, Node, NodeListener, NodeRef, TreeAlgebra};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

struct Member {
    id: u64,
    node: NodeRef,
    writable: bool,
    relay: Arc<dyn NodeListener>,
}

#[derive(Default)]
struct ComboState {
    members: Vec<Member>,
    /// Key to index of the supplying member. Built on first use.
    resolved: Option<BTreeMap<CollatedKey, usize>>,
    /// Bumped whenever a map being built may already be stale.
    generation: u64,
}

/// How one key's visibility changed after a member event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyChange {
    Added,
    Deleted,
    Changed,
}

impl KeyChange {
    fn event(self, key: &str) -> ChangeEvent {
        match self {
            KeyChange::Added => ChangeEvent::ChildAdded(key.to_string()),
            KeyChange::Deleted => ChangeEvent::ChildDeleted(key.to_string()),
            KeyChange::Changed => ChangeEvent::ChildChanged {
                old_key: key.to_string(),
                new_key: key.to_string(),
            },
        }
    }
}

/// Read-through union of ordered containers.
pub struct ComboView {
    this: Weak<ComboView>,
    key: String,
    next_id: AtomicU64,
    state: RwLock<ComboState>,
    listeners: ListenerSet,
}

/// Forwards member events to the view that registered it.
struct MemberRelay {
    view: Weak<ComboView>,
    member: u64,
}

impl MemberRelay {
    fn forward(&self, event: ChangeEvent) {
        if let Some(view) = self.view.upgrade() {
            view.on_member_event(self.member, event);
        }
    }
}

impl NodeListener for MemberRelay {
    fn changed(&self) {
        self.forward(ChangeEvent::Changed);
    }

    fn child_added(&self, key: &str) {
        self.forward(ChangeEvent::ChildAdded(key.to_string()));
    }

    fn child_deleted(&self, key: &str) {
        self.forward(ChangeEvent::ChildDeleted(key.to_string()));
    }

    fn child_changed(&self, old_key: &str, new_key: &str) {
        self.forward(ChangeEvent::ChildChanged {
            old_key: old_key.to_string(),
            new_key: new_key.to_string(),
        });
    }
}

impl ComboView {
    /// View over `members` in precedence order. Only the first member is
    /// writable, and only if it accepts writes itself.
    pub fn new(key: &str, members: Vec<NodeRef>) -> Arc<Self> {
        let members = members
            .into_iter()
            .enumerate()
            .map(|(i, node)| {
                let writable = i == 0 && node.is_writable();
                (node, writable)
            })
            .collect();
        Self::with_members(key, members)
    }

    /// View with explicit per-member write permission.
    pub fn with_members(key: &str, members: Vec<(NodeRef, bool)>) -> Arc<Self> {
        let view = Arc::new_cyclic(|this| ComboView {
            this: this.clone(),
            key: key.to_string(),
            next_id: AtomicU64::new(0),
            state: RwLock::new(ComboState::default()),
            listeners: ListenerSet::new(),
        });
        view.install(members);
        view
    }

    fn install(&self, members: Vec<(NodeRef, bool)>) {
        let members: Vec<Member> = members
            .into_iter()
            .map(|(node, writable)| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let relay: Arc<dyn NodeListener> = Arc::new(MemberRelay {
                    view: self.this.clone(),
                    member: id,
                });
                node.add_listener(relay.clone());
                Member {
                    id,
                    node,
                    writable,
                    relay,
                }
            })
            .collect();
        let previous = {
            let mut state = self.state.write();
            state.resolved = None;
            state.generation += 1;
            std::mem::replace(&mut state.members, members)
        };
        for member in previous {
            member.node.remove_listener(&member.relay);
        }
    }

    /// Replace the member stack and notify listeners.
    pub fn set_members(&self, members: Vec<(NodeRef, bool)>) {
        self.install(members);
        debug!(view = %self.key, "Replaced overlay members");
        if !self.listeners.is_empty() {
            self.ensure_resolved();
        }
        self.listeners.changed();
    }

    /// Members in precedence order.
    pub fn members(&self) -> Vec<NodeRef> {
        self.state.read().members.iter().map(|m| m.node.clone()).collect()
    }

    fn snapshot(&self) -> Vec<(NodeRef, bool)> {
        self.state
            .read()
            .members
            .iter()
            .map(|m| (m.node.clone(), m.writable))
            .collect()
    }

    /// The default write target: the first member, when writable.
    pub fn primary(&self) -> Option<NodeRef> {
        let state = self.state.read();
        state
            .members
            .first()
            .filter(|m| m.writable)
            .map(|m| m.node.clone())
    }

    fn build(members: &[(NodeRef, bool)]) -> BTreeMap<CollatedKey, usize> {
        let mut map = BTreeMap::new();
        for (index, (node, _)) in members.iter().enumerate().rev() {
            for key in node.keys() {
                map.insert(CollatedKey::from(key), index);
            }
        }
        map
    }

    /// Build the supplier map outside the lock. A member event that lands
    /// during the build bumps the generation, and the build starts over.
    fn ensure_resolved(&self) {
        loop {
            let (members, generation) = {
                let state = self.state.read();
                if state.resolved.is_some() {
                    return;
                }
                let members: Vec<(NodeRef, bool)> = state
                    .members
                    .iter()
                    .map(|m| (m.node.clone(), m.writable))
                    .collect();
                (members, state.generation)
            };
            let map = Self::build(&members);
            let mut state = self.state.write();
            if state.resolved.is_some() {
                return;
            }
            if state.generation == generation {
                state.resolved = Some(map);
                return;
            }
            debug!(view = %self.key, "Member changed while resolving, listing again");
        }
    }

    fn supplier_index(&self, key: &str) -> Option<usize> {
        self.ensure_resolved();
        self.state
            .read()
            .resolved
            .as_ref()
            .and_then(|map| map.get(key).copied())
    }

    /// Member that currently supplies `key`.
    pub fn container_for(&self, key: &str) -> Option<NodeRef> {
        let index = self.supplier_index(key)?;
        self.state.read().members.get(index).map(|m| m.node.clone())
    }

    /// Whether `member` has `key` but a higher member supplies it.
    pub fn is_hidden(&self, key: &str, member: &dyn Node) -> bool {
        if !member.has_child(key) {
            return false;
        }
        match self.container_for(key) {
            Some(supplier) => !crate::tree::same_node(supplier.as_ref(), member),
            None => false,
        }
    }

    /// Recompute which member supplies `key` and report the visible effect.
    fn reresolve(&self, members: &[(NodeRef, bool)], key: &str, firing: usize) -> Option<KeyChange> {
        let after = members.iter().position(|(node, _)| node.has_child(key));
        let before = {
            let mut state = self.state.write();
            let map = state.resolved.as_mut()?;
            let before = map.get(key).copied();
            match after {
                Some(index) => {
                    map.insert(CollatedKey::from(key), index);
                }
                None => {
                    map.remove(key);
                }
            }
            before
        };
        match (before, after) {
            (None, None) => None,
            (None, Some(_)) => Some(KeyChange::Added),
            (Some(_), None) => Some(KeyChange::Deleted),
            (Some(b), Some(a)) if a == firing || b == firing => Some(KeyChange::Changed),
            _ => None,
        }
    }

    fn on_member_event(&self, member_id: u64, event: ChangeEvent) {
        let (members, firing) = {
            let mut state = self.state.write();
            if state.resolved.is_none() {
                // Nothing observed yet, but a build in progress is stale.
                state.generation += 1;
                return;
            }
            (
                state
                    .members
                    .iter()
                    .map(|m| (m.node.clone(), m.writable))
                    .collect::<Vec<_>>(),
                state.members.iter().position(|m| m.id == member_id),
            )
        };
        let Some(firing) = firing else {
            return;
        };

        let events: Vec<ChangeEvent> = match event {
            ChangeEvent::Changed => {
                let map = Self::build(&members);
                self.state.write().resolved = Some(map);
                vec![ChangeEvent::Changed]
            }
            ChangeEvent::ChildAdded(key) | ChangeEvent::ChildDeleted(key) => self
                .reresolve(&members, &key, firing)
                .map(|change| change.event(&key))
                .into_iter()
                .collect(),
            ChangeEvent::ChildChanged { old_key, new_key } if old_key == new_key => {
                if self.supplier_index(&old_key) == Some(firing) {
                    vec![KeyChange::Changed.event(&old_key)]
                } else {
                    Vec::new()
                }
            }
            ChangeEvent::ChildChanged { old_key, new_key } => {
                let old_change = self.reresolve(&members, &old_key, firing);
                let new_change = self.reresolve(&members, &new_key, firing);
                match (old_change, new_change) {
                    (Some(KeyChange::Deleted), Some(KeyChange::Added | KeyChange::Changed)) => {
                        vec![ChangeEvent::ChildChanged { old_key, new_key }]
                    }
                    (old_change, new_change) => old_change
                        .map(|c| c.event(&old_key))
                        .into_iter()
                        .chain(new_change.map(|c| c.event(&new_key)))
                        .collect(),
                }
            }
        };
        for event in &events {
            self.listeners.fire(event);
        }
    }
}

impl Drop for ComboView {
    fn drop(&mut self) {
        for member in &self.state.get_mut().members {
            member.node.remove_listener(&member.relay);
        }
    }
}

impl Node for ComboView {
    fn key(&self) -> String {
        self.key.clone()
    }

    /// First defined value among the members.
    fn value(&self) -> Option<String> {
        self.snapshot().iter().find_map(|(node, _)| node.value())
    }

    fn set_value(&self, value: Option<&str>) -> Result<(), StorageError> {
        match self.primary() {
            Some(primary) => primary.set_value(value),
            None => Err(StorageError::ReadOnly(self.key.clone())),
        }
    }

    fn get_child(&self, key: &str) -> Option<NodeRef> {
        let members = self.snapshot();
        if let Some(index) = self.supplier_index(key) {
            if let Some(child) = members.get(index).and_then(|(node, _)| node.get_child(key)) {
                return Some(child);
            }
        }
        members.iter().find_map(|(node, _)| node.get_child(key))
    }

    fn has_child(&self, key: &str) -> bool {
        self.supplier_index(key).is_some()
    }

    /// Existing child from a writable supplier, or a copy in the primary
    /// seeded with the hidden content.
    fn create_child(&self, key: &str) -> Result<NodeRef, StorageError> {
        let members = self.snapshot();
        let supplier = self.supplier_index(key);
        if let Some((node, true)) = supplier.and_then(|i| members.get(i)) {
            return node.create_child(key);
        }
        let Some((primary, true)) = members.first() else {
            return Err(StorageError::ReadOnly(self.key.clone()));
        };
        let created = primary.create_child(key)?;
        if let Some((source, _)) = supplier.and_then(|i| members.get(i)) {
            if let Some(hidden) = source.get_child(key) {
                created.merge_under(hidden.as_ref())?;
                debug!(view = %self.key, key, "Copied read-only entry into primary");
            }
        }
        Ok(created)
    }

    /// Remove `key` from every writable member. A read-only copy, if any,
    /// becomes visible again.
    fn remove_child(&self, key: &str) -> Result<(), StorageError> {
        for (node, writable) in self.snapshot() {
            if writable && node.has_child(key) {
                node.remove_child(key)?;
            }
        }
        Ok(())
    }

    fn remove_all(&self) -> Result<(), StorageError> {
        for key in self.keys() {
            self.remove_child(&key)?;
        }
        Ok(())
    }

    fn move_child(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let members = self.snapshot();
        match self.supplier_index(from).and_then(|i| members.get(i)) {
            Some((node, true)) => node.move_child(from, to),
            Some(_) => Err(StorageError::ReadOnly(from.to_string())),
            None => Err(StorageError::NotFound(from.to_string())),
        }
    }

    fn keys(&self) -> Vec<String> {
        self.ensure_resolved();
        self.state
            .read()
            .resolved
            .as_ref()
            .map(|map| map.keys().map(|k| k.as_str().to_string()).collect())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.ensure_resolved();
        self.state
            .read()
            .resolved
            .as_ref()
            .map_or(0, BTreeMap::len)
    }

    fn is_writable(&self) -> bool {
        self.primary().is_some()
    }

    fn add_listener(&self, listener: Arc<dyn NodeListener>) {
        self.ensure_resolved();
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn NodeListener>) {
        self.listeners.remove(listener);
    }

    fn is_changed(&self) -> bool {
        self.snapshot().iter().any(|(node, _)| node.is_changed())
    }
}
