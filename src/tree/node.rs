//! Node contract
//!
//! A node is one addressable element of a tree. It may hold a value, children,
//! or both. The [`Node`] trait carries the per-key primitives each storage
//! variant implements; [`NodeExt`] layers path navigation, typed accessors
//! and traversal on top of them for every node type.
//!
//! The default implementations describe an empty, read-only node.
//!
//! Locking rule: an implementation may lock its own state and then call into
//! its parent (dirty propagation, pruning), but it never calls into a child
//! while holding its own lock. Locks are therefore only ever nested
//! child before ancestor.

use crate::error::StorageError;
use crate::tree::listener::NodeListener;
use std::fmt::Display;
use std::sync::Arc;

/// Shared handle to any node.
pub type NodeRef = Arc<dyn Node>;

/// Per-key primitives of a tree node.
pub trait Node: Send + Sync {
    /// Key of this node relative to its parent.
    fn key(&self) -> String;

    /// Owning parent, if still alive. Roots have none.
    fn parent(&self) -> Option<NodeRef> {
        None
    }

    /// Value held by this node. `None` means undefined, which is distinct
    /// from a defined empty string.
    fn value(&self) -> Option<String> {
        None
    }

    /// Define (`Some`) or undefine (`None`) the value of this node.
    fn set_value(&self, _value: Option<&str>) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly(self.key()))
    }

    /// Direct child under `key`.
    fn get_child(&self, _key: &str) -> Option<NodeRef> {
        None
    }

    /// Whether a direct child exists under `key`. Containers answer this
    /// without loading the child.
    fn has_child(&self, key: &str) -> bool {
        self.get_child(key).is_some()
    }

    /// Direct child under `key`, created empty if absent.
    fn create_child(&self, _key: &str) -> Result<NodeRef, StorageError> {
        Err(StorageError::ReadOnly(self.key()))
    }

    /// Remove the direct child under `key`. Removing a missing key is not an
    /// error.
    fn remove_child(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly(self.key()))
    }

    /// Remove every child.
    fn remove_all(&self) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly(self.key()))
    }

    /// Rename the child `from` to `to`, replacing anything already at `to`.
    fn move_child(&self, _from: &str, _to: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly(self.key()))
    }

    /// Child keys in collation order.
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Number of direct children.
    fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether writes to this node are accepted.
    fn is_writable(&self) -> bool {
        false
    }

    fn add_listener(&self, _listener: Arc<dyn NodeListener>) {}

    fn remove_listener(&self, _listener: &Arc<dyn NodeListener>) {}

    /// Record that this node's content differs from its persisted form.
    /// Persistent variants propagate the flag toward their document.
    fn mark_changed(&self) {}

    /// Reset the dirty flag of this node and everything below it.
    fn clear_changed(&self) {}

    /// Whether this node carries unsaved changes.
    fn is_changed(&self) -> bool {
        false
    }

    /// Remove this node from its parent if it holds neither a value nor
    /// children.
    fn prune(&self) {}

    /// Remove `child` from under `key`, but only if that exact object is
    /// still the child there.
    fn detach_child(&self, _key: &str, _child: &dyn Node) -> bool {
        false
    }

    /// Update the key after the parent renamed this node.
    fn assign_key(&self, _key: &str) {}
}

/// Whether two node handles refer to the same object.
pub fn same_node(a: &dyn Node, b: &dyn Node) -> bool {
    std::ptr::eq(
        a as *const dyn Node as *const u8,
        b as *const dyn Node as *const u8,
    )
}

/// Interpret a stored value as a boolean: "1" or "true" (any case).
pub fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Interpret a stored value as an integer, accepting float-like spellings.
pub fn parse_long(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(v) = value.parse::<i64>() {
        return Some(v);
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v.round() as i64),
        _ => None,
    }
}

/// Interpret a stored value as a float.
pub fn parse_double(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

/// Path navigation, typed accessors and traversal for every node type.
///
/// Paths are slices of keys, each naming one level below the receiver.
pub trait NodeExt: Node {
    /// Node at `path`, or `None` if any segment is missing. An empty path
    /// names no child.
    fn child(&self, path: &[&str]) -> Option<NodeRef> {
        let (first, rest) = path.split_first()?;
        let mut current = self.get_child(first)?;
        for key in rest {
            let next = current.get_child(key)?;
            current = next;
        }
        Some(current)
    }

    /// Node at `path`, creating every missing segment.
    fn child_or_create(&self, path: &[&str]) -> Result<NodeRef, StorageError> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| StorageError::InvalidKey("empty path".to_string()))?;
        let mut current = self.create_child(first)?;
        for key in rest {
            let next = current.create_child(key)?;
            current = next;
        }
        Ok(current)
    }

    /// Value at `path`; an empty path reads this node.
    fn get(&self, path: &[&str]) -> Option<String> {
        if path.is_empty() {
            return self.value();
        }
        self.child(path)?.value()
    }

    fn get_or_default(&self, default: &str, path: &[&str]) -> String {
        self.get(path).unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, path: &[&str]) -> bool {
        self.get(path).map(|v| parse_bool(&v)).unwrap_or(false)
    }

    fn get_int(&self, default: i32, path: &[&str]) -> i32 {
        self.get(path)
            .and_then(|v| parse_long(&v))
            .map(|v| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .unwrap_or(default)
    }

    fn get_long(&self, default: i64, path: &[&str]) -> i64 {
        self.get(path)
            .and_then(|v| parse_long(&v))
            .unwrap_or(default)
    }

    fn get_double(&self, default: f64, path: &[&str]) -> f64 {
        self.get(path)
            .and_then(|v| parse_double(&v))
            .unwrap_or(default)
    }

    /// Define the value at `path`, creating intermediate nodes as needed.
    fn set<V: Display>(&self, value: V, path: &[&str]) -> Result<(), StorageError> {
        self.set_opt(Some(&value.to_string()), path)
    }

    /// Define or undefine the value at `path`. Undefining never creates
    /// nodes, and a node left without value or children is pruned.
    fn set_opt(&self, value: Option<&str>, path: &[&str]) -> Result<(), StorageError> {
        match value {
            Some(v) => {
                if path.is_empty() {
                    self.set_value(Some(v))
                } else {
                    self.child_or_create(path)?.set_value(Some(v))
                }
            }
            None => {
                if path.is_empty() {
                    self.set_value(None)?;
                    self.prune();
                } else if let Some(node) = self.child(path) {
                    node.set_value(None)?;
                    node.prune();
                }
                Ok(())
            }
        }
    }

    fn set_undefined(&self, path: &[&str]) -> Result<(), StorageError> {
        self.set_opt(None, path)
    }

    /// With an empty path, remove every child of this node. Otherwise remove
    /// the node at `path`. Either way, ancestors left vacant are pruned.
    fn clear(&self, path: &[&str]) -> Result<(), StorageError> {
        match path.split_last() {
            None => {
                self.remove_all()?;
                self.prune();
            }
            Some((last, [])) => {
                self.remove_child(last)?;
                self.prune();
            }
            Some((last, parents)) => {
                if let Some(parent) = self.child(parents) {
                    parent.remove_child(last)?;
                    parent.prune();
                }
            }
        }
        Ok(())
    }

    /// Whether this node has a defined value.
    fn data(&self) -> bool {
        self.value().is_some()
    }

    /// Whether this node has no children. Independent of [`NodeExt::data`].
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn size(&self) -> usize {
        self.len()
    }

    /// Children in collation order, over a snapshot of the key list.
    fn iter(&self) -> std::vec::IntoIter<NodeRef> {
        self.keys()
            .iter()
            .filter_map(|key| self.get_child(key))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Depth-first pre-order traversal. Returning `false` from the visitor
    /// skips the descendants of the node just visited.
    fn visit(&self, visitor: &mut dyn FnMut(&dyn Node) -> bool)
    where
        Self: Sized,
    {
        visit_node(self, visitor);
    }
}

impl<T: Node + ?Sized> NodeExt for T {}

impl dyn Node {
    /// Depth-first pre-order traversal of a trait object.
    pub fn visit(&self, visitor: &mut dyn FnMut(&dyn Node) -> bool) {
        visit_node(self, visitor);
    }
}

/// Depth-first pre-order traversal over a trait object.
pub fn visit_node(node: &dyn Node, visitor: &mut dyn FnMut(&dyn Node) -> bool) {
    if !visitor(node) {
        return;
    }
    for child in node.iter() {
        visit_node(child.as_ref(), visitor);
    }
}
