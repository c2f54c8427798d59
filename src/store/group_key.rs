//! Ad hoc document containers keyed by absolute path.

use crate::concurrency::ContainerLock;
use crate::error::StorageError;
use crate::schema::Schema;
use crate::store::directory::DEFAULT_CACHE_CAPACITY;
use crate::store::document::{Document, DocumentOwner, DocumentSpec};
use crate::store::group::{DocumentGroup, SaveSummary};
use crate::tree::{Node, NodeListener, NodeRef};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Container whose document keys are absolute file paths.
///
/// Files are added explicitly, either one at a time or by enumerating a
/// folder, which makes it possible to present a search path of unrelated
/// files as one container.
pub struct DocumentGroupKey {
    this: Weak<DocumentGroupKey>,
    key: String,
    schema: Schema,
    writable: bool,
    lock: ContainerLock,
    group: DocumentGroup,
}

impl DocumentGroupKey {
    pub fn new(key: &str) -> Arc<Self> {
        Self::with_options(key, Schema::default(), true, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_options(key: &str, schema: Schema, writable: bool, cache_capacity: usize) -> Arc<Self> {
        Arc::new_cyclic(|this| DocumentGroupKey {
            this: this.clone(),
            key: key.to_string(),
            schema,
            writable,
            lock: ContainerLock::new(),
            group: DocumentGroup::new(cache_capacity),
        })
    }

    /// Canonical key for `path`. Files that do not exist yet are resolved
    /// through their parent folder.
    pub fn key_for(path: &Path) -> Result<String, StorageError> {
        let canonical = match dunce::canonicalize(path) {
            Ok(canonical) => canonical,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
                    return Err(StorageError::InvalidKey(path.display().to_string()));
                };
                let parent = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
                dunce::canonicalize(parent)
                    .map_err(|e| StorageError::io(parent, e))?
                    .join(name)
            }
            Err(err) => return Err(StorageError::io(path, err)),
        };
        canonical
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| StorageError::InvalidKey(canonical.display().to_string()))
    }

    fn spec(&self, key: &str) -> DocumentSpec {
        let parent: Weak<dyn Node> = self.this.clone();
        let owner: Weak<dyn DocumentOwner> = self.this.clone();
        DocumentSpec {
            key: key.to_string(),
            path: PathBuf::from(key),
            schema: self.schema,
            writable: self.writable,
            parent,
            owner: Some(owner),
        }
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.writable {
            Ok(())
        } else {
            Err(StorageError::ReadOnly(self.key.clone()))
        }
    }

    /// Add a file, or every file below a folder. Returns the keys added.
    pub fn add(&self, path: &Path) -> Result<Vec<String>, StorageError> {
        let mut found = BTreeSet::new();
        if path.is_dir() {
            for entry in WalkDir::new(path).min_depth(1) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!("Failed to enumerate {}: {}", path.display(), err);
                        continue;
                    }
                };
                let hidden = entry.file_name().to_string_lossy().starts_with('.');
                if entry.file_type().is_file() && !hidden {
                    found.insert(Self::key_for(entry.path())?);
                }
            }
        } else if path.is_file() {
            found.insert(Self::key_for(path)?);
        } else {
            return Err(StorageError::NotFound(path.display().to_string()));
        }

        let added: Vec<String> = found
            .into_iter()
            .filter(|key| !self.group.contains(key))
            .collect();
        self.group
            .merge_listing(&added.iter().cloned().collect::<BTreeSet<_>>());
        debug!(path = %path.display(), added = added.len(), "Added documents to group");
        for key in &added {
            self.group.listeners().child_added(key);
        }
        Ok(added)
    }

    /// Forget `key` without touching its file.
    pub fn forget(&self, key: &str) {
        if self.group.contains(key) {
            self.group.remove(key);
            self.group.listeners().child_deleted(key);
        }
    }

    pub fn document(&self, key: &str) -> Option<Arc<Document>> {
        self.group
            .fetch(key, Path::new(key), || Document::on_disk(self.spec(key)))
    }

    pub fn create_document(&self, key: &str) -> Result<Arc<Document>, StorageError> {
        if let Some(existing) = self.document(key) {
            return Ok(existing);
        }
        self.check_writable()?;
        if !Path::new(key).is_absolute() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let (document, added) = {
            let _guard = self.lock.lock();
            if let Some(existing) = self.group.live(key) {
                return Ok(existing);
            }
            let document = Document::created(self.spec(key));
            let added = self.group.insert(key, &document);
            self.group.queue(document.clone());
            (document, added)
        };
        if added {
            self.group.listeners().child_added(key);
        } else {
            self.group.listeners().child_changed(key, key);
        }
        Ok(document)
    }

    pub fn save(&self) -> SaveSummary {
        let summary = self.group.save();
        if summary.saved > 0 || summary.failed > 0 {
            info!(
                group = %self.key,
                saved = summary.saved,
                failed = summary.failed,
                "Saved document group"
            );
        }
        summary
    }

    pub fn pending_writes(&self) -> usize {
        self.group.pending()
    }

    /// Re-check every known file. Documents whose file still exists are
    /// reset in place; vanished ones are dropped.
    pub fn reload(&self) {
        let listing: BTreeSet<String> = self
            .group
            .keys()
            .into_iter()
            .filter(|key| Path::new(key).is_file())
            .collect();
        let present = self.group.sync_with_listing(&listing);
        for document in &present {
            document.reset();
        }
        info!(group = %self.key, documents = listing.len(), "Reloaded document group");
        self.group.listeners().changed();
    }
}

impl DocumentOwner for DocumentGroupKey {
    fn queue_write(&self, document: Arc<Document>) {
        let key = document.key();
        if self.group.queue(document) {
            self.group.listeners().child_changed(&key, &key);
        }
    }
}

impl Node for DocumentGroupKey {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn get_child(&self, key: &str) -> Option<NodeRef> {
        let document: NodeRef = self.document(key)?;
        Some(document)
    }

    fn has_child(&self, key: &str) -> bool {
        self.group.contains(key)
    }

    fn create_child(&self, key: &str) -> Result<NodeRef, StorageError> {
        let document: NodeRef = self.create_document(key)?;
        Ok(document)
    }

    fn remove_child(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        let existed = {
            let _guard = self.lock.lock();
            let existed = self.group.contains(key);
            if existed {
                match fs::remove_file(key) {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => return Err(StorageError::io(key, err)),
                }
                if let Some(document) = self.group.remove(key) {
                    document.discard();
                }
            }
            existed
        };
        if existed {
            self.group.listeners().child_deleted(key);
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
        self.check_writable()?;
        if from == to {
            return Ok(());
        }
        if !Path::new(to).is_absolute() {
            return Err(StorageError::InvalidKey(to.to_string()));
        }
        {
            let _guard = self.lock.lock();
            if !self.group.contains(from) {
                return Err(StorageError::NotFound(from.to_string()));
            }
            if let Some(document) = self.group.remove(to) {
                document.discard();
            }
            if Path::new(from).exists() {
                if let Some(parent) = Path::new(to).parent() {
                    fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
                }
                fs::rename(from, to).map_err(|e| StorageError::io(from, e))?;
            }
            if let Some(document) = self.group.rename(from, to) {
                document.assign_key(to);
                document.relocate(PathBuf::from(to));
            }
        }
        self.group.listeners().child_changed(from, to);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.group.keys()
    }

    fn len(&self) -> usize {
        self.group.len()
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn add_listener(&self, listener: Arc<dyn NodeListener>) {
        self.group.listeners().add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn NodeListener>) {
        self.group.listeners().remove(listener);
    }

    fn is_changed(&self) -> bool {
        self.group.pending() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeExt;
    use tempfile::TempDir;

    #[test]
    fn test_add_file_and_folder() {
        let tmp = TempDir::new().unwrap();
        let lib = tmp.path().join("lib");
        fs::create_dir_all(lib.join("nested")).unwrap();
        fs::write(lib.join("one"), "STRATA.schema=2\nv: 1\n").unwrap();
        fs::write(lib.join("nested").join("two"), "STRATA.schema=2\nv: 2\n").unwrap();
        fs::write(lib.join(".skip"), "").unwrap();
        let single = tmp.path().join("single");
        fs::write(&single, "STRATA.schema=2\nv: 3\n").unwrap();

        let group = DocumentGroupKey::new("search");
        assert_eq!(group.add(&lib).unwrap().len(), 2);
        assert_eq!(group.add(&single).unwrap().len(), 1);
        assert!(group.add(&single).unwrap().is_empty());
        assert_eq!(group.size(), 3);

        let key = DocumentGroupKey::key_for(&lib.join("nested").join("two")).unwrap();
        assert!(Path::new(&key).is_absolute());
        assert_eq!(group.get(&[key.as_str(), "v"]), Some("2".to_string()));
    }

    #[test]
    fn test_create_and_move_by_path() {
        let tmp = TempDir::new().unwrap();
        let group = DocumentGroupKey::new("adhoc");
        let from = DocumentGroupKey::key_for(&tmp.path().join("a")).unwrap();
        let to = DocumentGroupKey::key_for(&tmp.path().join("b")).unwrap();

        group.set("x", &[from.as_str(), "field"]).unwrap();
        group.save();
        assert!(Path::new(&from).is_file());

        group.move_child(&from, &to).unwrap();
        assert!(!Path::new(&from).exists());
        assert_eq!(group.get(&[to.as_str(), "field"]), Some("x".to_string()));
        assert!(group.create_child("relative").is_err());
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let group = DocumentGroupKey::new("adhoc");
        assert!(matches!(
            group.add(&tmp.path().join("nothing")),
            Err(StorageError::NotFound(_))
        ));
    }
}
