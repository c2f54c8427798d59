//! Change notification
//!
//! Observers register a [`NodeListener`] on a container and receive four kinds
//! of events. `child_changed` with equal keys is an in-place content change;
//! with different keys it is a rename where the destination may have been
//! overwritten.
//!
//! Events are always delivered after the firing node has released its locks,
//! over a snapshot of the registered listeners. A listener must not call back
//! into the node that is firing; work that needs to mutate the tree should be
//! queued and performed later.

use parking_lot::RwLock;
use std::sync::Arc;

/// Observer of structural and content changes on a container.
pub trait NodeListener: Send + Sync {
    /// The content changed too much to describe incrementally; rebuild.
    fn changed(&self);

    /// A child appeared under `key`.
    fn child_added(&self, key: &str);

    /// The child under `key` is gone.
    fn child_deleted(&self, key: &str);

    /// A child was edited in place (`old_key == new_key`) or renamed.
    fn child_changed(&self, old_key: &str, new_key: &str);
}

/// One event, captured so it can be replayed or queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Changed,
    ChildAdded(String),
    ChildDeleted(String),
    ChildChanged { old_key: String, new_key: String },
}

impl ChangeEvent {
    /// Deliver this event to a listener.
    pub fn dispatch(&self, listener: &dyn NodeListener) {
        match self {
            ChangeEvent::Changed => listener.changed(),
            ChangeEvent::ChildAdded(key) => listener.child_added(key),
            ChangeEvent::ChildDeleted(key) => listener.child_deleted(key),
            ChangeEvent::ChildChanged { old_key, new_key } => {
                listener.child_changed(old_key, new_key)
            }
        }
    }
}

/// Registered listeners for one node.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn NodeListener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn NodeListener>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove(&self, listener: &Arc<dyn NodeListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Fire an event to every listener registered at the time of the call.
    pub fn fire(&self, event: &ChangeEvent) {
        let snapshot: Vec<Arc<dyn NodeListener>> = self.listeners.read().clone();
        for listener in snapshot {
            event.dispatch(listener.as_ref());
        }
    }

    pub fn changed(&self) {
        self.fire(&ChangeEvent::Changed);
    }

    pub fn child_added(&self, key: &str) {
        self.fire(&ChangeEvent::ChildAdded(key.to_string()));
    }

    pub fn child_deleted(&self, key: &str) {
        self.fire(&ChangeEvent::ChildDeleted(key.to_string()));
    }

    pub fn child_changed(&self, old_key: &str, new_key: &str) {
        self.fire(&ChangeEvent::ChildChanged {
            old_key: old_key.to_string(),
            new_key: new_key.to_string(),
        });
    }
}

/// Listener that records every event it receives. Useful for observers that
/// process events later, and for tests.
#[derive(Default)]
pub struct EventRecorder {
    events: parking_lot::Mutex<Vec<ChangeEvent>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl NodeListener for EventRecorder {
    fn changed(&self) {
        self.events.lock().push(ChangeEvent::Changed);
    }

    fn child_added(&self, key: &str) {
        self.events.lock().push(ChangeEvent::ChildAdded(key.to_string()));
    }

    fn child_deleted(&self, key: &str) {
        self.events
            .lock()
            .push(ChangeEvent::ChildDeleted(key.to_string()));
    }

    fn child_changed(&self, old_key: &str, new_key: &str) {
        self.events.lock().push(ChangeEvent::ChildChanged {
            old_key: old_key.to_string(),
            new_key: new_key.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_reaches_every_listener_once() {
        let set = ListenerSet::new();
        let a = EventRecorder::new();
        let b = EventRecorder::new();
        let a_dyn: Arc<dyn NodeListener> = a.clone();
        set.add(a_dyn.clone());
        set.add(a_dyn.clone());
        set.add(b.clone());
        assert_eq!(set.len(), 2);

        set.child_added("x");
        set.child_changed("x", "y");
        assert_eq!(
            a.take(),
            vec![
                ChangeEvent::ChildAdded("x".into()),
                ChangeEvent::ChildChanged {
                    old_key: "x".into(),
                    new_key: "y".into()
                }
            ]
        );
        assert_eq!(b.len(), 2);

        set.remove(&a_dyn);
        set.changed();
        assert!(a.is_empty());
        assert_eq!(b.take().last(), Some(&ChangeEvent::Changed));
    }
}
