//! File watcher that folds external edits back into a [`Registry`].
//!
//! Changes below the data directory are batched; each batch saves and then
//! reloads the directories it touched, following the flush, mutate, reload
//! sequence that external tools are expected to use.

mod events;

pub use events::{FileChange, WatchConfig};

use crate::error::StorageError;
use crate::registry::Registry;
use crate::store::Directory;
use events::EventBatcher;
use notify::{RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Running watcher thread.
pub struct StoreWatcher {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

fn watch_error(root: &Path, err: notify::Error) -> StorageError {
    StorageError::io(root, std::io::Error::new(std::io::ErrorKind::Other, err))
}

impl StoreWatcher {
    /// Watch `root` recursively on a background thread. The thread ends when
    /// stopped or when the registry is dropped.
    pub fn start(
        registry: Weak<Registry>,
        root: PathBuf,
        config: WatchConfig,
    ) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                debug!("Watch channel closed: {}", e);
            }
        })
        .map_err(|e| watch_error(&root, e))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| watch_error(&root, e))?;
        info!(root = %root.display(), "Watching data directory");

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("strata-watch".to_string())
            .spawn(move || {
                // Dropping the watcher closes the channel.
                let _watcher = watcher;
                run(registry, rx, flag, config);
            })
            .map_err(|e| StorageError::io("strata-watch", e))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the thread and wait for it, unless called from that thread.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Watch thread panicked");
            }
        }
    }
}

impl Drop for StoreWatcher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn run(
    registry: Weak<Registry>,
    rx: mpsc::Receiver<notify::Result<notify::Event>>,
    running: Arc<AtomicBool>,
    config: WatchConfig,
) {
    let window = Duration::from_millis(config.batch_window_ms);
    let mut batcher = EventBatcher::new(config);
    let mut last_event = Instant::now();

    while running.load(Ordering::SeqCst) {
        let timeout = if batcher.is_empty() {
            window
        } else {
            window.saturating_sub(last_event.elapsed())
        };
        let full = match rx.recv_timeout(timeout) {
            Ok(Ok(event)) => match FileChange::from_notify(event) {
                Some(change) => {
                    last_event = Instant::now();
                    batcher.add(change)
                }
                None => false,
            },
            Ok(Err(e)) => {
                warn!("Watch error: {}", e);
                false
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                error!("Watcher channel disconnected");
                break;
            }
        };

        let due = !batcher.is_empty() && last_event.elapsed() >= window;
        if full || due {
            let Some(registry) = registry.upgrade() else {
                break;
            };
            apply(&registry, batcher.take_batch());
        }
    }
    debug!("Watch thread stopped");
}

/// Save and reload whatever `changes` touched.
fn apply(registry: &Registry, changes: Vec<FileChange>) {
    if changes.is_empty() {
        return;
    }
    let mut directories: Vec<Arc<Directory>> = Vec::new();
    let mut state_touched = false;
    let state_file = registry.state().path();
    for change in &changes {
        for path in change.paths() {
            if path == state_file {
                state_touched = true;
            }
            for directory in registry.directories_at(path) {
                if !directories.iter().any(|d| Arc::ptr_eq(d, &directory)) {
                    directories.push(directory);
                }
            }
        }
    }

    for directory in &directories {
        let summary = directory.save();
        if summary.failed > 0 {
            warn!(
                root = %directory.root().display(),
                failed = summary.failed,
                "Skipping reload with unsaved documents"
            );
            continue;
        }
        directory.reload();
    }
    if state_touched {
        let state = registry.state();
        if state.save().is_ok() {
            state.reset();
        }
    }

    let roots: BTreeSet<String> = directories
        .iter()
        .map(|d| d.root().display().to_string())
        .collect();
    info!(
        changes = changes.len(),
        directories = ?roots,
        state = state_touched,
        "Applied external changes"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::tree::{Node, NodeExt};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_apply_reloads_touched_directory_only() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::init(StoreConfig {
            autosave_interval_ms: 0,
            ..StoreConfig::with_data_dir(tmp.path())
        })
        .unwrap();
        let models = registry.repository("local", "models").unwrap();
        let references = registry.repository("local", "references").unwrap();
        models.set("1", &["a", "v"]).unwrap();
        references.set("2", &["b", "v"]).unwrap();

        let changed = models.root().join("a");
        apply(&registry, vec![FileChange::Modified(changed)]);

        assert_eq!(models.pending_writes(), 0);
        assert!(models.root().join("a").is_file());
        assert_eq!(references.pending_writes(), 1);
    }

    #[test]
    fn test_watcher_picks_up_new_file() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::init(StoreConfig {
            autosave_interval_ms: 0,
            ..StoreConfig::with_data_dir(tmp.path())
        })
        .unwrap();
        let models = registry.repository("local", "models").unwrap();
        fs::create_dir_all(models.root()).unwrap();
        assert!(models.is_empty());

        registry
            .start_watching(WatchConfig {
                batch_window_ms: 20,
                ..WatchConfig::default()
            })
            .unwrap();
        fs::write(models.root().join("fresh"), "STRATA.schema=2\nk: v\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !models.has_child("fresh") && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(models.get(&["fresh", "k"]), Some("v".to_string()));
        registry.shutdown();
    }
}
