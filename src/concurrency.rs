//! Structural locking for document containers
//!
//! Each container owns one [`ContainerLock`] that serializes file-level
//! operations (create, delete, rename) against it. Moving a document between
//! two containers needs both locks; [`lock_pair`] always takes the source
//! before the destination.

use parking_lot::{Mutex, MutexGuard};

/// Per-container lock for file-level operations.
#[derive(Default)]
pub struct ContainerLock {
    inner: Mutex<()>,
}

impl ContainerLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.lock()
    }
}

/// Guards held for the duration of a cross-container move.
pub struct PairGuard<'a> {
    _source: MutexGuard<'a, ()>,
    _destination: Option<MutexGuard<'a, ()>>,
}

/// Lock `source`, then `destination`. Passing the same lock twice takes it
/// once.
///
/// Two threads moving documents in opposite directions between the same pair
/// of containers can deadlock under this rule; callers serialize such moves.
pub fn lock_pair<'a>(source: &'a ContainerLock, destination: &'a ContainerLock) -> PairGuard<'a> {
    let source_guard = source.lock();
    let destination_guard = if std::ptr::eq(source, destination) {
        None
    } else {
        Some(destination.lock())
    };
    PairGuard {
        _source: source_guard,
        _destination: destination_guard,
    }
}
