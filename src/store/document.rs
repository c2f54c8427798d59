//! Documents: trees backed by one file.

use crate::error::StorageError;
use crate::schema::Schema;
use crate::tree::{Branch, Node, NodeListener, NodeRef, PersistentNode, VolatileNode};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Container that keeps dirty documents alive until they are saved.
pub(crate) trait DocumentOwner: Send + Sync {
    fn queue_write(&self, document: Arc<Document>);
}

/// Persistent tree rooted at one file.
///
/// The file is read the first time anything below the root is touched, and
/// written only by [`Document::save`]. The value of the root node is kept in
/// memory and is not part of the file.
pub struct Document {
    this: Weak<Document>,
    branch: Branch,
    owner: Option<Weak<dyn DocumentOwner>>,
    path: RwLock<PathBuf>,
    doc_type: RwLock<Option<String>>,
    schema: Schema,
    writable: bool,
    dirty: AtomicBool,
    loaded: Mutex<bool>,
}

pub(crate) struct DocumentSpec {
    pub key: String,
    pub path: PathBuf,
    pub schema: Schema,
    pub writable: bool,
    pub parent: Weak<dyn Node>,
    pub owner: Option<Weak<dyn DocumentOwner>>,
}

impl Document {
    /// Standalone writable document at `path`, not attached to any container.
    pub fn open(path: impl Into<PathBuf>) -> Arc<Self> {
        Self::open_with(path, Schema::default())
    }

    pub fn open_with(path: impl Into<PathBuf>, schema: Schema) -> Arc<Self> {
        let path = path.into();
        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::build(
            DocumentSpec {
                key,
                path,
                schema,
                writable: true,
                parent: Weak::<VolatileNode>::new(),
                owner: None,
            },
            false,
        )
    }

    /// Document that loads lazily from its file.
    pub(crate) fn on_disk(spec: DocumentSpec) -> Arc<Self> {
        Self::build(spec, false)
    }

    /// Document that has no file yet. It starts loaded, empty and dirty.
    pub(crate) fn created(spec: DocumentSpec) -> Arc<Self> {
        Self::build(spec, true)
    }

    fn build(spec: DocumentSpec, fresh: bool) -> Arc<Self> {
        Arc::new_cyclic(|this| Document {
            this: this.clone(),
            branch: Branch::new(spec.parent, &spec.key),
            owner: spec.owner,
            path: RwLock::new(spec.path),
            doc_type: RwLock::new(None),
            schema: spec.schema,
            writable: spec.writable,
            dirty: AtomicBool::new(fresh),
            loaded: Mutex::new(fresh),
        })
    }

    fn weak(&self) -> Weak<dyn Node> {
        self.this.clone()
    }

    pub fn path(&self) -> PathBuf {
        self.path.read().clone()
    }

    pub(crate) fn relocate(&self, path: PathBuf) {
        *self.path.write() = path;
    }

    /// Type tag carried in the header line.
    pub fn doc_type(&self) -> Option<String> {
        self.ensure_loaded();
        self.doc_type.read().clone()
    }

    pub fn set_doc_type(&self, doc_type: Option<&str>) {
        self.ensure_loaded();
        *self.doc_type.write() = doc_type.map(str::to_string);
        self.mark_changed();
    }

    /// Whether the file has been read since creation or the last reset.
    pub fn is_loaded(&self) -> bool {
        *self.loaded.lock()
    }

    fn ensure_loaded(&self) {
        let mut loaded = self.loaded.lock();
        if *loaded {
            return;
        }
        let path = self.path();
        let scratch = VolatileNode::new();
        let mut doc_type = None;
        match fs::read_to_string(&path) {
            Ok(text) => match self.schema.read_str(&text, scratch.as_ref()) {
                Ok(header) => doc_type = header.doc_type,
                Err(err) => warn!(
                    path = %path.display(),
                    error = %err,
                    "Failed to parse document, keeping what was read"
                ),
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Document file does not exist yet");
            }
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "Failed to read document"
            ),
        }
        let children = PersistentNode::copy_children(self.weak(), scratch.as_ref(), self.writable);
        let count = children.len();
        self.branch.replace(self.branch.value(), children);
        *self.doc_type.write() = doc_type;
        self.dirty.store(false, Ordering::SeqCst);
        *loaded = true;
        debug!(path = %path.display(), children = count, "Loaded document");
    }

    /// Write the document if it has unsaved changes.
    ///
    /// On failure the document stays dirty, so the next save retries.
    pub fn save(&self) -> Result<(), StorageError> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        match self.write_file() {
            Ok(path) => {
                info!(path = %path.display(), "Saved document");
                Ok(())
            }
            Err(err) => {
                self.dirty.store(true, Ordering::SeqCst);
                warn!(error = %err, "Failed to save document, will retry");
                Err(err)
            }
        }
    }

    fn write_file(&self) -> Result<PathBuf, StorageError> {
        for child in self.branch.children() {
            child.clear_changed();
        }
        let path = self.path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        }
        let doc_type = self.doc_type.read().clone();
        let mut out = Vec::new();
        self.schema
            .write_document(&mut out, self, doc_type.as_deref())
            .map_err(|e| StorageError::io(&path, e))?;
        fs::write(&path, out).map_err(|e| StorageError::io(&path, e))?;
        Ok(path)
    }

    /// Forget the loaded content and dirty flag. The next access reads the
    /// file again.
    pub fn reset(&self) {
        {
            let mut loaded = self.loaded.lock();
            *loaded = false;
            self.branch.replace(None, BTreeMap::new());
            *self.doc_type.write() = None;
            self.dirty.store(false, Ordering::SeqCst);
        }
        debug!(path = %self.path().display(), "Reset document");
        self.branch.listeners().changed();
    }

    /// Empty, loaded and clean: the state after the backing file is deleted.
    pub(crate) fn discard(&self) {
        {
            let mut loaded = self.loaded.lock();
            *loaded = true;
            self.branch.replace(None, BTreeMap::new());
            self.dirty.store(false, Ordering::SeqCst);
        }
        self.branch.listeners().changed();
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.writable {
            Ok(())
        } else {
            Err(StorageError::ReadOnly(self.path().display().to_string()))
        }
    }
}

impl Node for Document {
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
        self.branch.set_value(value);
        Ok(())
    }

    fn get_child(&self, key: &str) -> Option<NodeRef> {
        self.ensure_loaded();
        self.branch.child(key)
    }

    fn has_child(&self, key: &str) -> bool {
        self.ensure_loaded();
        self.branch.has_child(key)
    }

    fn create_child(&self, key: &str) -> Result<NodeRef, StorageError> {
        self.ensure_loaded();
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
        self.ensure_loaded();
        self.check_writable()?;
        if self.branch.remove(key).is_some() {
            self.mark_changed();
        }
        Ok(())
    }

    fn remove_all(&self) -> Result<(), StorageError> {
        self.ensure_loaded();
        self.check_writable()?;
        if self.branch.remove_all() > 0 {
            self.mark_changed();
        }
        Ok(())
    }

    fn move_child(&self, from: &str, to: &str) -> Result<(), StorageError> {
        self.ensure_loaded();
        self.check_writable()?;
        if from != to && self.branch.rename(from, to).is_some() {
            self.mark_changed();
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.ensure_loaded();
        self.branch.keys()
    }

    fn len(&self) -> usize {
        self.ensure_loaded();
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

    /// Mark the document dirty. The first mark after a save hands the
    /// document to its owner's write queue.
    fn mark_changed(&self) {
        if self.dirty.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.writable {
            debug!(path = %self.path().display(), "Change to read-only document will not be saved");
            return;
        }
        let owner = self.owner.as_ref().and_then(Weak::upgrade);
        if let (Some(owner), Some(this)) = (owner, self.this.upgrade()) {
            owner.queue_write(this);
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

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("key", &self.branch.key())
            .field("path", &self.path())
            .field("loaded", &self.is_loaded())
            .field("dirty", &self.is_changed())
            .finish()
    }
}

/// Whether `path` names an existing regular file.
pub(crate) fn file_exists(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeExt;
    use tempfile::TempDir;

    #[test]
    fn test_lazy_load_and_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc");
        fs::write(&path, "STRATA.schema=2,model\nname: amp\nparts\n r1: 10k\n").unwrap();

        let doc = Document::open(&path);
        assert!(!doc.is_loaded());
        assert_eq!(doc.get(&["parts", "r1"]), Some("10k".to_string()));
        assert!(doc.is_loaded());
        assert!(!doc.is_changed());
        assert_eq!(doc.doc_type().as_deref(), Some("model"));

        doc.set("22k", &["parts", "r1"]).unwrap();
        assert!(doc.is_changed());
        doc.save().unwrap();
        assert!(!doc.is_changed());
        assert!(!doc.child(&["parts"]).unwrap().is_changed());

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "STRATA.schema=2,model\nname: amp\nparts\n r1: 22k\n");
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let doc = Document::open(dir.path().join("absent"));
        assert_eq!(doc.size(), 0);
        assert!(!doc.is_changed());
        doc.save().unwrap();
        assert!(!dir.path().join("absent").exists());
    }

    #[test]
    fn test_parse_failure_keeps_partial_content_clean() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken");
        fs::write(&path, "STRATA.schema=2\ngood: 1\n\"open: 2\nlater: 3\n").unwrap();
        let doc = Document::open(&path);
        assert_eq!(doc.get(&["good"]), Some("1".to_string()));
        assert!(doc.child(&["later"]).is_none());
        assert!(!doc.is_changed());
    }

    #[test]
    fn test_reset_rereads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc");
        fs::write(&path, "STRATA.schema=2\na: 1\n").unwrap();
        let doc = Document::open(&path);
        doc.set("local", &["a"]).unwrap();

        fs::write(&path, "STRATA.schema=2\na: 2\n").unwrap();
        doc.reset();
        assert!(!doc.is_changed());
        assert_eq!(doc.get(&["a"]), Some("2".to_string()));
    }

    #[test]
    fn test_failed_save_stays_dirty() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let doc = Document::open(blocker.join("doc"));
        doc.set("1", &["a"]).unwrap();

        assert!(doc.save().is_err());
        assert!(doc.is_changed());

        fs::remove_file(&blocker).unwrap();
        doc.set("2", &["a"]).unwrap();
        doc.save().unwrap();
        assert!(!doc.is_changed());
        let text = fs::read_to_string(blocker.join("doc")).unwrap();
        assert_eq!(text, "STRATA.schema=2\na: 2\n");
    }

    #[test]
    fn test_root_value_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let doc = Document::open(dir.path().join("doc"));
        doc.set("label", &[]).unwrap();
        assert_eq!(doc.get(&[]), Some("label".to_string()));
        assert!(!doc.is_changed());
    }
}
