//! Application context: the repository stack, jobs and client state.
//!
//! A [`Registry`] is built once from a [`StoreConfig`] and handed to whoever
//! needs documents. Layout under the data directory:
//!
//! ```text
//! repos/<repository>/<category>/<document>
//! jobs/<job>/<jobs_suffix>
//! client/state
//! ```

pub mod autosave;

pub use autosave::Autosave;

use crate::config::{RepositoryConfig, StoreConfig};
use crate::error::StorageError;
use crate::schema::Schema;
use crate::store::{Directory, DirectoryOptions, Document, SaveSummary};
use crate::tree::{Node, NodeRef};
use crate::views::ComboView;
use crate::watch::{StoreWatcher, WatchConfig};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

struct Repository {
    config: RepositoryConfig,
    directories: BTreeMap<String, Arc<Directory>>,
}

/// Process-wide container stack with an explicit lifecycle.
pub struct Registry {
    this: Weak<Registry>,
    config: StoreConfig,
    schema: Schema,
    repositories: RwLock<Vec<Repository>>,
    categories: BTreeMap<String, Arc<ComboView>>,
    jobs: Arc<Directory>,
    state: Arc<Document>,
    autosave: Mutex<Option<Autosave>>,
    watcher: Mutex<Option<StoreWatcher>>,
    closed: AtomicBool,
}

impl Registry {
    /// Build the stack and start the background workers the config asks for.
    pub fn init(config: StoreConfig) -> Result<Arc<Self>, StorageError> {
        config.validate()?;
        let schema = if config.strict_schema {
            Schema::strict()
        } else {
            Schema::default()
        };

        let repositories: Vec<Repository> = config
            .repositories
            .iter()
            .map(|repository| Self::open_repository(&config, schema, repository, None))
            .collect();
        let categories = config
            .categories
            .iter()
            .map(|category| {
                let view = ComboView::with_members(category, Self::members(&repositories, category));
                (category.clone(), view)
            })
            .collect();
        let jobs = Directory::with_options(
            config.jobs_dir(),
            DirectoryOptions::default()
                .key("jobs")
                .suffix(config.jobs_suffix.clone())
                .schema(schema)
                .cache_capacity(config.cache_capacity),
        );
        let state = Document::open_with(config.state_file(), schema);

        let registry = Arc::new_cyclic(|this| Registry {
            this: this.clone(),
            config,
            schema,
            repositories: RwLock::new(repositories),
            categories,
            jobs,
            state,
            autosave: Mutex::new(None),
            watcher: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        if registry.config.autosave_interval_ms > 0 {
            registry.start_autosave()?;
        }
        if registry.config.watch {
            registry.start_watching(WatchConfig::default())?;
        }
        info!(
            data_dir = %registry.config.data_dir.display(),
            repositories = registry.config.repositories.len(),
            categories = registry.categories.len(),
            "Registry initialized"
        );
        Ok(registry)
    }

    /// Directories for one repository. Directories in `reuse` whose
    /// repository kept its name and write mode are carried over.
    fn open_repository(
        config: &StoreConfig,
        schema: Schema,
        repository: &RepositoryConfig,
        reuse: Option<&Repository>,
    ) -> Repository {
        let directories = config
            .categories
            .iter()
            .map(|category| {
                let carried = reuse
                    .filter(|old| old.config.editable == repository.editable)
                    .and_then(|old| old.directories.get(category).cloned());
                let directory = carried.unwrap_or_else(|| {
                    let mut options = DirectoryOptions::default()
                        .key(repository.name.clone())
                        .schema(schema)
                        .cache_capacity(config.cache_capacity);
                    if !repository.editable {
                        options = options.read_only();
                    }
                    Directory::with_options(
                        config.repos_dir().join(&repository.name).join(category),
                        options,
                    )
                });
                (category.clone(), directory)
            })
            .collect();
        Repository {
            config: repository.clone(),
            directories,
        }
    }

    /// View members for `category`: the primary repository first, then the
    /// other visible repositories in precedence order.
    fn members(repositories: &[Repository], category: &str) -> Vec<(NodeRef, bool)> {
        let visible: Vec<&Repository> = repositories.iter().filter(|r| r.config.visible).collect();
        let primary = visible.iter().position(|r| r.config.editable);
        let mut members = Vec::with_capacity(visible.len());
        let ordered = primary
            .map(|index| visible[index])
            .into_iter()
            .chain(
                visible
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| Some(*index) != primary)
                    .map(|(_, repository)| *repository),
            );
        for repository in ordered {
            if let Some(directory) = repository.directories.get(category) {
                let node: NodeRef = directory.clone();
                let writable = Some(repository.config.name.as_str())
                    == primary.map(|index| visible[index].config.name.as_str());
                members.push((node, writable));
            }
        }
        members
    }

    fn start_autosave(&self) -> Result<(), StorageError> {
        let registry = self.this.clone();
        let interval = Duration::from_millis(self.config.autosave_interval_ms);
        let worker = Autosave::start(interval, move || match registry.upgrade() {
            Some(registry) => {
                let summary = registry.save();
                if summary.failed > 0 {
                    warn!(failed = summary.failed, "Autosave left documents unsaved");
                }
                true
            }
            None => false,
        })?;
        if let Some(previous) = self.autosave.lock().replace(worker) {
            previous.stop();
        }
        Ok(())
    }

    /// Watch the data directory and fold external edits back in.
    pub fn start_watching(&self, watch: WatchConfig) -> Result<(), StorageError> {
        let watcher = StoreWatcher::start(self.this.clone(), self.config.data_dir.clone(), watch)?;
        if let Some(previous) = self.watcher.lock().replace(watcher) {
            previous.stop();
        }
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    /// Overlay of every visible repository for `category`.
    pub fn category(&self, category: &str) -> Option<Arc<ComboView>> {
        self.categories.get(category).cloned()
    }

    pub fn categories(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// The directory of one repository for `category`, hidden or not.
    pub fn repository(&self, repository: &str, category: &str) -> Option<Arc<Directory>> {
        self.repositories
            .read()
            .iter()
            .find(|r| r.config.name == repository)
            .and_then(|r| r.directories.get(category).cloned())
    }

    pub fn repositories(&self) -> Vec<RepositoryConfig> {
        self.repositories
            .read()
            .iter()
            .map(|r| r.config.clone())
            .collect()
    }

    pub fn jobs(&self) -> Arc<Directory> {
        self.jobs.clone()
    }

    /// Client state document.
    pub fn state(&self) -> Arc<Document> {
        self.state.clone()
    }

    fn directories(&self) -> Vec<Arc<Directory>> {
        let mut directories: Vec<Arc<Directory>> = self
            .repositories
            .read()
            .iter()
            .flat_map(|r| r.directories.values().cloned())
            .collect();
        directories.push(self.jobs.clone());
        directories
    }

    /// Directories whose root lies under or above `path`.
    pub fn directories_at(&self, path: &Path) -> Vec<Arc<Directory>> {
        self.directories()
            .into_iter()
            .filter(|d| path.starts_with(d.root()) || d.root().starts_with(path))
            .collect()
    }

    /// Write every dirty document. Failures stay queued for the next save.
    pub fn save(&self) -> SaveSummary {
        let mut summary = SaveSummary::default();
        for directory in self.directories() {
            summary.merge(directory.save());
        }
        if self.state.is_changed() {
            match self.state.save() {
                Ok(()) => summary.saved += 1,
                Err(_) => summary.failed += 1,
            }
        }
        if summary.saved > 0 || summary.failed > 0 {
            debug!(saved = summary.saved, failed = summary.failed, "Registry save");
        }
        summary
    }

    /// Flush pending edits, then re-read everything from disk. A directory
    /// whose save failed is left as it is so the edits can be retried.
    pub fn reload(&self) {
        let mut skipped = 0;
        for directory in self.directories() {
            let summary = directory.save();
            if summary.failed > 0 {
                warn!(
                    root = %directory.root().display(),
                    failed = summary.failed,
                    "Skipping reload with unsaved documents"
                );
                skipped += 1;
                continue;
            }
            directory.reload();
        }
        if !self.state.is_changed() || self.state.save().is_ok() {
            self.state.reset();
        }
        info!(
            data_dir = %self.config.data_dir.display(),
            skipped,
            "Registry reloaded"
        );
    }

    /// Replace the repository stack. Pending edits are flushed first and the
    /// category views keep their identity.
    pub fn rebuild(&self, repositories: Vec<RepositoryConfig>) -> Result<(), StorageError> {
        let candidate = StoreConfig {
            repositories,
            ..self.config.clone()
        };
        candidate.validate()?;
        self.save();

        let mut current = self.repositories.write();
        let rebuilt: Vec<Repository> = candidate
            .repositories
            .iter()
            .map(|repository| {
                let reuse = current.iter().find(|r| r.config.name == repository.name);
                Self::open_repository(&candidate, self.schema, repository, reuse)
            })
            .collect();
        let members: Vec<(Arc<ComboView>, Vec<(NodeRef, bool)>)> = self
            .categories
            .iter()
            .map(|(category, view)| (view.clone(), Self::members(&rebuilt, category)))
            .collect();
        *current = rebuilt;
        drop(current);

        for (view, members) in members {
            view.set_members(members);
        }
        info!(repositories = candidate.repositories.len(), "Rebuilt repository stack");
        Ok(())
    }

    /// Stop the background workers and flush. Later calls do nothing.
    pub fn shutdown(&self) -> SaveSummary {
        if self.closed.swap(true, Ordering::SeqCst) {
            return SaveSummary::default();
        }
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
        if let Some(worker) = self.autosave.lock().take() {
            worker.stop();
        }
        let summary = self.save();
        info!(
            saved = summary.saved,
            failed = summary.failed,
            "Registry shut down"
        );
        summary
    }
}
