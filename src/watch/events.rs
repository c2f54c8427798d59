//! File change events, batching, and watcher configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Repeated events on one path within this window are collapsed
    pub debounce_ms: u64,
    /// Quiet period before a batch is applied
    pub batch_window_ms: u64,
    /// A batch this large is applied without waiting
    pub max_batch_size: usize,
    /// Ignore patterns (`**` and `*` globs)
    pub ignore_patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            batch_window_ms: 250,
            max_batch_size: 100,
            ignore_patterns: vec![
                "**/.git/**".to_string(),
                "**/.DS_Store".to_string(),
                "**/*.swp".to_string(),
                "**/*.tmp".to_string(),
                "**/*~".to_string(),
            ],
        }
    }
}

/// Filesystem change below the watched root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileChange {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl FileChange {
    /// Translate a notify event. Access and metadata-only events are dropped.
    pub fn from_notify(event: notify::Event) -> Option<Self> {
        use notify::event::ModifyKind;
        use notify::EventKind;

        let mut paths = event.paths.into_iter();
        match event.kind {
            EventKind::Create(_) => paths.next().map(FileChange::Created),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(ModifyKind::Name(_)) => match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => Some(FileChange::Renamed { from, to }),
                (Some(path), None) => Some(FileChange::Modified(path)),
                _ => None,
            },
            EventKind::Modify(_) => paths.next().map(FileChange::Modified),
            EventKind::Remove(_) => paths.next().map(FileChange::Removed),
            _ => None,
        }
    }

    /// Path the change is keyed by: the destination of a rename.
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Created(p) | FileChange::Modified(p) | FileChange::Removed(p) => p,
            FileChange::Renamed { to, .. } => to,
        }
    }

    /// Every path the change touches.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            FileChange::Renamed { from, to } => vec![from.as_path(), to.as_path()],
            other => vec![other.path()],
        }
    }
}

/// Groups changes per path until a batch is due.
pub(crate) struct EventBatcher {
    config: WatchConfig,
    pending: HashMap<PathBuf, FileChange>,
    last_seen: HashMap<PathBuf, Instant>,
}

impl EventBatcher {
    pub(crate) fn new(config: WatchConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            last_seen: HashMap::new(),
        }
    }

    /// Record `change`. Returns true when the batch is full.
    pub(crate) fn add(&mut self, change: FileChange) -> bool {
        let path = change.path().to_path_buf();
        if self.should_ignore(&path) {
            return false;
        }

        let now = Instant::now();
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let recent = self
            .last_seen
            .get(&path)
            .is_some_and(|last| now.duration_since(*last) < debounce);
        self.pending.insert(path.clone(), change);
        if recent {
            return false;
        }
        self.last_seen.insert(path, now);
        self.pending.len() >= self.config.max_batch_size
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn take_batch(&mut self) -> Vec<FileChange> {
        self.last_seen.clear();
        self.pending.drain().map(|(_, change)| change).collect()
    }

    fn should_ignore(&self, path: &Path) -> bool {
        let path = path.to_string_lossy().replace('\\', "/");
        self.config
            .ignore_patterns
            .iter()
            .any(|pattern| matches_pattern(&path, &pattern.replace('\\', "/")))
    }
}

/// Minimal glob match: the first `**` splits into prefix and suffix, a
/// lone `*` into a prefix and a tail that must end the path.
fn matches_pattern(path: &str, pattern: &str) -> bool {
    if let Some((prefix, suffix)) = pattern.split_once("**") {
        let suffix = suffix.trim_start_matches('/');
        let prefix_ok = prefix.is_empty() || path.starts_with(prefix);
        return prefix_ok && (suffix.is_empty() || matches_tail(path, suffix));
    }
    if let Some((prefix, tail)) = pattern.split_once('*') {
        return path.starts_with(prefix) && path.ends_with(tail);
    }
    path == pattern
}

/// Match `suffix` against the end of `path`, at a component boundary. A
/// trailing `/**` means "anything inside".
fn matches_tail(path: &str, suffix: &str) -> bool {
    if let Some(dir) = suffix.strip_suffix("/**") {
        return path.contains(&format!("/{}/", dir)) || path.starts_with(&format!("{}/", dir));
    }
    let name = path.rsplit('/').next().unwrap_or(path);
    match suffix.split_once('*') {
        Some((head, tail)) => name.starts_with(head) && name.ends_with(tail),
        None => name == suffix,
    }
}
