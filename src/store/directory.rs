//! Directories: one document per file under a root folder.

use crate::concurrency::{lock_pair, ContainerLock};
use crate::error::StorageError;
use crate::schema::Schema;
use crate::store::document::{Document, DocumentOwner, DocumentSpec};
use crate::store::group::{DocumentGroup, SaveSummary};
use crate::tree::{Node, NodeListener, NodeRef};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Documents kept resident per container unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// How a [`Directory`] maps names to files and what it allows.
#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    /// Key of the directory node. Defaults to the root folder's name.
    pub key: Option<String>,
    /// Fixed file name inside a per-document folder: `root/<name>/<suffix>`.
    pub suffix: Option<String>,
    pub writable: bool,
    pub schema: Schema,
    pub cache_capacity: usize,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            key: None,
            suffix: None,
            writable: true,
            schema: Schema::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl DirectoryOptions {
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

/// Container of documents stored as files in one folder.
///
/// The folder is listed once, on first access, and again only on
/// [`Directory::reload`]. Documents created in memory are listed alongside
/// the files found on disk until they are saved.
pub struct Directory {
    this: Weak<Directory>,
    key: String,
    root: PathBuf,
    options: DirectoryOptions,
    scanned: Mutex<bool>,
    lock: ContainerLock,
    group: DocumentGroup,
}

impl Directory {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Self::with_options(root, DirectoryOptions::default())
    }

    pub fn with_options(root: impl Into<PathBuf>, options: DirectoryOptions) -> Arc<Self> {
        let root = root.into();
        let key = options.key.clone().unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        Arc::new_cyclic(|this| Directory {
            this: this.clone(),
            key,
            root,
            group: DocumentGroup::new(options.cache_capacity),
            options,
            scanned: Mutex::new(false),
            lock: ContainerLock::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn suffix(&self) -> Option<&str> {
        self.options.suffix.as_deref()
    }

    /// File backing the document `name`.
    pub fn file_for(&self, name: &str) -> PathBuf {
        match &self.options.suffix {
            Some(suffix) => self.root.join(name).join(suffix),
            None => self.root.join(name),
        }
    }

    fn spec(&self, name: &str) -> DocumentSpec {
        let parent: Weak<dyn Node> = self.this.clone();
        let owner: Weak<dyn DocumentOwner> = self.this.clone();
        DocumentSpec {
            key: name.to_string(),
            path: self.file_for(name),
            schema: self.options.schema,
            writable: self.options.writable,
            parent,
            owner: Some(owner),
        }
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.options.writable {
            Ok(())
        } else {
            Err(StorageError::ReadOnly(self.root.display().to_string()))
        }
    }

    /// Names of the documents present on disk. Listing failures are logged
    /// and treated as an empty folder.
    fn list_files(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "Directory does not exist yet");
                return names;
            }
            Err(err) => {
                warn!(
                    root = %self.root.display(),
                    error = %err,
                    "Failed to list directory, treating it as empty"
                );
                return names;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(
                        "Failed to read directory entry in {}: {}",
                        self.root.display(),
                        err
                    );
                    continue;
                }
            };
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("Skipping non UTF-8 file name: {:?}", entry.path());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let backing = match &self.options.suffix {
                Some(suffix) => entry.path().join(suffix),
                None => entry.path(),
            };
            if backing.is_file() {
                names.insert(name);
            }
        }
        names
    }

    fn ensure_scanned(&self) {
        let mut scanned = self.scanned.lock();
        if *scanned {
            return;
        }
        let listing = self.list_files();
        debug!(root = %self.root.display(), documents = listing.len(), "Scanned directory");
        self.group.merge_listing(&listing);
        *scanned = true;
    }

    /// Typed lookup of the document `name`.
    pub fn document(&self, name: &str) -> Option<Arc<Document>> {
        self.ensure_scanned();
        let path = self.file_for(name);
        self.group
            .fetch(name, &path, || Document::on_disk(self.spec(name)))
    }

    /// Existing document `name`, or a new empty one queued for its first
    /// save.
    pub fn create_document(&self, name: &str) -> Result<Arc<Document>, StorageError> {
        if let Some(existing) = self.document(name) {
            return Ok(existing);
        }
        self.check_writable()?;
        validate_name(name)?;
        let (document, added) = {
            let _guard = self.lock.lock();
            if let Some(existing) = self.group.live(name) {
                return Ok(existing);
            }
            let document = Document::created(self.spec(name));
            let added = self.group.insert(name, &document);
            self.group.queue(document.clone());
            (document, added)
        };
        debug!(root = %self.root.display(), name, "Created document");
        if added {
            self.group.listeners().child_added(name);
        } else {
            self.group.listeners().child_changed(name, name);
        }
        Ok(document)
    }

    /// Save every dirty document. Failures are logged and retried on the
    /// next call.
    pub fn save(&self) -> SaveSummary {
        let summary = self.group.save();
        if summary.saved > 0 || summary.failed > 0 {
            info!(
                root = %self.root.display(),
                saved = summary.saved,
                failed = summary.failed,
                "Saved directory"
            );
        }
        summary
    }

    /// Number of documents waiting to be written.
    pub fn pending_writes(&self) -> usize {
        self.group.pending()
    }

    /// List the folder again. Documents whose file still exists keep their
    /// identity and are reset, vanished ones are dropped, new files appear.
    pub fn reload(&self) {
        let listing = self.list_files();
        let present = {
            let mut scanned = self.scanned.lock();
            *scanned = true;
            self.group.sync_with_listing(&listing)
        };
        for document in &present {
            document.reset();
        }
        info!(
            root = %self.root.display(),
            documents = listing.len(),
            reset = present.len(),
            "Reloaded directory"
        );
        self.group.listeners().changed();
    }

    /// Drop the retention cache. Only documents referenced elsewhere, or
    /// waiting to be saved, stay in memory.
    pub fn release_cache(&self) {
        self.group.release_all();
    }

    fn remove_path(path: &Path) -> Result<(), StorageError> {
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io(path, err)),
        }
    }

    /// Path renamed when moving `name`: the document folder with a suffix,
    /// the file itself without.
    fn entry_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn drop_document(&self, name: &str) {
        if let Some(document) = self.group.remove(name) {
            document.discard();
        }
    }

    /// Move document `name` out of `source` into this directory. Pending
    /// edits are saved at the old location first; the source instance is
    /// emptied and a fresh instance is returned.
    pub fn take(&self, source: &Directory, name: &str) -> Result<Arc<Document>, StorageError> {
        if std::ptr::eq(self, source) {
            return self
                .document(name)
                .ok_or_else(|| StorageError::NotFound(name.to_string()));
        }
        self.check_writable()?;
        source.check_writable()?;
        validate_name(name)?;
        source.ensure_scanned();
        self.ensure_scanned();

        let replaced = {
            let _guard = lock_pair(&source.lock, &self.lock);
            if !source.group.contains(name) {
                return Err(StorageError::NotFound(name.to_string()));
            }
            if let Some(document) = source.group.live(name) {
                document.save()?;
            }

            let same_layout = source.options.suffix.is_some() && source.options.suffix == self.options.suffix;
            let (from, to) = if same_layout {
                (source.entry_path(name), self.entry_path(name))
            } else {
                (source.file_for(name), self.file_for(name))
            };
            let replaced = self.group.contains(name);
            Self::remove_path(&to)?;
            self.drop_document(name);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
            if from.exists() {
                fs::rename(&from, &to).map_err(|e| StorageError::io(&from, e))?;
            }
            if !same_layout && source.options.suffix.is_some() {
                let _ = fs::remove_dir(source.entry_path(name));
            }

            source.drop_document(name);
            self.group.merge_listing(&BTreeSet::from([name.to_string()]));
            replaced
        };

        info!(
            from = %source.root.display(),
            to = %self.root.display(),
            name,
            "Moved document between directories"
        );
        source.group.listeners().child_deleted(name);
        if replaced {
            self.group.listeners().child_changed(name, name);
        } else {
            self.group.listeners().child_added(name);
        }
        self.document(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}

/// Document names become file names.
fn validate_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\');
    if invalid {
        Err(StorageError::InvalidKey(name.to_string()))
    } else {
        Ok(())
    }
}

impl DocumentOwner for Directory {
    fn queue_write(&self, document: Arc<Document>) {
        let key = document.key();
        if self.group.queue(document) {
            debug!(root = %self.root.display(), name = %key, "Queued document for save");
            self.group.listeners().child_changed(&key, &key);
        }
    }
}

impl Node for Directory {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn get_child(&self, key: &str) -> Option<NodeRef> {
        let document: NodeRef = self.document(key)?;
        Some(document)
    }

    fn has_child(&self, key: &str) -> bool {
        self.ensure_scanned();
        self.group.contains(key)
    }

    fn create_child(&self, key: &str) -> Result<NodeRef, StorageError> {
        let document: NodeRef = self.create_document(key)?;
        Ok(document)
    }

    /// Delete the document and its file.
    fn remove_child(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.ensure_scanned();
        let existed = {
            let _guard = self.lock.lock();
            let existed = self.group.contains(key);
            if existed {
                Self::remove_path(&self.file_for(key))?;
                if self.options.suffix.is_some() {
                    let _ = fs::remove_dir(self.entry_path(key));
                }
                self.drop_document(key);
            }
            existed
        };
        if existed {
            info!(root = %self.root.display(), name = key, "Deleted document");
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

    /// Rename a document and its file, replacing any document at `to`.
    fn move_child(&self, from: &str, to: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        if from == to {
            return Ok(());
        }
        validate_name(to)?;
        self.ensure_scanned();
        {
            let _guard = self.lock.lock();
            if !self.group.contains(from) {
                return Err(StorageError::NotFound(from.to_string()));
            }
            let source = self.entry_path(from);
            let destination = self.entry_path(to);
            Self::remove_path(&destination)?;
            self.drop_document(to);
            if source.exists() {
                fs::rename(&source, &destination).map_err(|e| StorageError::io(&source, e))?;
            }
            if let Some(document) = self.group.rename(from, to) {
                document.assign_key(to);
                document.relocate(self.file_for(to));
            }
        }
        info!(root = %self.root.display(), from, to, "Renamed document");
        self.group.listeners().child_changed(from, to);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.ensure_scanned();
        self.group.keys()
    }

    fn len(&self) -> usize {
        self.ensure_scanned();
        self.group.len()
    }

    fn is_writable(&self) -> bool {
        self.options.writable
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

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("key", &self.key)
            .field("root", &self.root)
            .field("suffix", &self.options.suffix)
            .field("writable", &self.options.writable)
            .finish()
    }
}
