//! Document bookkeeping shared by every file-backed container.
//!
//! Entries map a document key to a weak handle. A dead handle means "exists
//! on disk, not in memory". Recently fetched documents are also held by a
//! bounded LRU so that a working set stays resident, and dirty documents are
//! held by the write queue until a save succeeds. Dropping out of both makes
//! a document reclaimable; the next fetch builds a new instance.

use crate::store::document::Document;
use crate::tree::{CollatedKey, ListenerSet, Node};
use hashlink::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Outcome of flushing a write queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub saved: usize,
    pub failed: usize,
}

impl SaveSummary {
    pub fn merge(&mut self, other: SaveSummary) {
        self.saved += other.saved;
        self.failed += other.failed;
    }
}

pub(crate) struct DocumentGroup {
    entries: RwLock<BTreeMap<CollatedKey, Weak<Document>>>,
    retained: Option<Mutex<LruCache<String, Arc<Document>>>>,
    queue: Mutex<Vec<Arc<Document>>>,
    listeners: ListenerSet,
}

impl DocumentGroup {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            retained: (cache_capacity > 0).then(|| Mutex::new(LruCache::new(cache_capacity))),
            queue: Mutex::new(Vec::new()),
            listeners: ListenerSet::new(),
        }
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    fn retain(&self, key: &str, document: &Arc<Document>) {
        if let Some(cache) = &self.retained {
            cache.lock().insert(key.to_string(), document.clone());
        }
    }

    fn release(&self, key: &str) {
        if let Some(cache) = &self.retained {
            cache.lock().remove(key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .keys()
            .map(|k| k.as_str().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Live instance for `key`, rebuilding it with `make` when the previous
    /// one was reclaimed. A key whose file has disappeared is forgotten.
    pub fn fetch(
        &self,
        key: &str,
        path: &Path,
        make: impl FnOnce() -> Arc<Document>,
    ) -> Option<Arc<Document>> {
        let document = {
            let mut entries = self.entries.write();
            let entry = entries.get(key)?;
            match entry.upgrade() {
                Some(document) => document,
                None if !path.is_file() => {
                    entries.remove(key);
                    debug!(key, path = %path.display(), "Document file vanished");
                    return None;
                }
                None => {
                    let document = make();
                    entries.insert(CollatedKey::from(key), Arc::downgrade(&document));
                    debug!(key, path = %path.display(), "Instantiated document");
                    document
                }
            }
        };
        self.retain(key, &document);
        Some(document)
    }

    /// Live instance for `key` without touching the disk.
    pub fn live(&self, key: &str) -> Option<Arc<Document>> {
        self.entries.read().get(key).and_then(Weak::upgrade)
    }

    /// Register a new document. Returns false when the key already existed.
    pub fn insert(&self, key: &str, document: &Arc<Document>) -> bool {
        let previous = self
            .entries
            .write()
            .insert(CollatedKey::from(key), Arc::downgrade(document));
        self.retain(key, document);
        previous.is_none()
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Document>> {
        let removed = self.entries.write().remove(key);
        self.release(key);
        let document = removed.as_ref().and_then(Weak::upgrade);
        if let Some(document) = &document {
            self.queue
                .lock()
                .retain(|queued| !Arc::ptr_eq(queued, document));
        }
        document
    }

    /// Move the entry at `from` to `to`. The caller has already dropped
    /// whatever lived at `to`.
    pub fn rename(&self, from: &str, to: &str) -> Option<Arc<Document>> {
        let entry = {
            let mut entries = self.entries.write();
            let entry = entries.remove(from)?;
            entries.insert(CollatedKey::from(to), entry.clone());
            entry
        };
        self.release(from);
        let document = entry.upgrade();
        if let Some(document) = &document {
            self.retain(to, document);
        }
        document
    }

    /// Add every key in `listing` that is not known yet.
    pub fn merge_listing(&self, listing: &BTreeSet<String>) {
        let mut entries = self.entries.write();
        for name in listing {
            if !entries.contains_key(name.as_str()) {
                entries.insert(CollatedKey::from(name.as_str()), Weak::new());
            }
        }
    }

    /// Make the entries match `listing`. Documents still waiting in the
    /// write queue survive even when their file is missing. Returns the live
    /// documents whose files are still present and that have nothing left to
    /// save, so a reset cannot discard edits.
    pub fn sync_with_listing(&self, listing: &BTreeSet<String>) -> Vec<Arc<Document>> {
        let queued: BTreeSet<String> = self.queue.lock().iter().map(|d| d.key()).collect();
        let mut dropped = Vec::new();
        let mut present = Vec::new();
        {
            let mut entries = self.entries.write();
            entries.retain(|key, entry| {
                let keep = listing.contains(key.as_str()) || queued.contains(key.as_str());
                if !keep {
                    dropped.push(key.as_str().to_string());
                } else if listing.contains(key.as_str()) && !queued.contains(key.as_str()) {
                    if let Some(document) = entry.upgrade() {
                        present.push(document);
                    }
                }
                keep
            });
            for name in listing {
                if !entries.contains_key(name.as_str()) {
                    entries.insert(CollatedKey::from(name.as_str()), Weak::new());
                }
            }
        }
        for key in &dropped {
            self.release(key);
        }
        debug!(
            dropped = dropped.len(),
            present = present.len(),
            "Synchronized documents with listing"
        );
        present
    }

    /// Add `document` to the write queue. Returns true when it was not
    /// queued already.
    pub fn queue(&self, document: Arc<Document>) -> bool {
        let mut queue = self.queue.lock();
        if queue.iter().any(|queued| Arc::ptr_eq(queued, &document)) {
            return false;
        }
        queue.push(document);
        true
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Save every queued document. Failed documents stay queued.
    pub fn save(&self) -> SaveSummary {
        let pending: Vec<Arc<Document>> = self.queue.lock().clone();
        let mut summary = SaveSummary::default();
        for document in &pending {
            match document.save() {
                Ok(()) => summary.saved += 1,
                Err(_) => summary.failed += 1,
            }
        }
        self.queue.lock().retain(|document| document.is_changed());
        summary
    }

    /// Drop every retained strong reference. Dirty documents stay queued.
    pub fn release_all(&self) {
        if let Some(cache) = &self.retained {
            cache.lock().clear();
        }
    }
}
