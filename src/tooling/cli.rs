//! CLI Tooling
//!
//! Command-line interface over the store: inspect and edit single documents,
//! list containers and overlay categories, compare and merge trees.

use crate::config::{ConfigLoader, StoreConfig, STORE_FILE_NAME};
use crate::error::StorageError;
use crate::logging::LoggingConfig;
use crate::registry::Registry;
use crate::schema::Schema;
use crate::store::{Directory, DirectoryOptions, Document};
use crate::tooling::format::{format_diff, format_listing, DiffLine, ListingRow, NodeExport};
use crate::tree::{compare_keys, Node, NodeExt, NodeRef, TreeAlgebra};
use clap::{Parser, Subcommand, ValueEnum};
use std::cmp::Ordering;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Strata CLI - hierarchical key/value document store
#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Inspect and edit hierarchical key/value document trees")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store data directory (overrides configuration)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Colored output
    #[arg(long, value_enum, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose logging (same as --log-level debug)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    pub fn enabled(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => {
                std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
            }
        }
    }
}

impl Cli {
    /// `base` with the command-line logging flags applied.
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut config = base.clone();
        if self.verbose {
            config.level = "debug".to_string();
        }
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.file = Some(file.clone());
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a document, or one subtree of it
    Cat {
        file: PathBuf,
        /// Subtree path, segments separated by '/'
        #[arg(long)]
        path: Option<String>,
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the value at a path
    Get {
        file: PathBuf,
        path: String,
        /// Printed when the value is undefined
        #[arg(long)]
        default: Option<String>,
    },
    /// Set, or undefine, the value at a path and save
    Set {
        file: PathBuf,
        path: String,
        value: Option<String>,
        /// Undefine the value instead
        #[arg(long, conflicts_with = "value")]
        unset: bool,
    },
    /// List a folder of documents, a document's children, or a category
    Ls {
        /// Folder, document file, or configured category name
        target: String,
        /// Path inside a document
        #[arg(long)]
        path: Option<String>,
    },
    /// Show how the second document differs from the first
    Diff { from: PathBuf, to: PathBuf },
    /// Merge a document into another and save
    Merge {
        target: PathBuf,
        source: PathBuf,
        /// Only fill values the target does not define
        #[arg(long)]
        under: bool,
    },
    /// Print the effective configuration as TOML, or write it to the store
    InitConfig {
        /// Write to <data_dir>/strata.toml
        #[arg(long)]
        write: bool,
        /// Overwrite an existing file
        #[arg(long, requires = "write")]
        force: bool,
    },
}

/// CLI context holding the effective configuration
pub struct CliContext {
    config: StoreConfig,
    schema: Schema,
    color: bool,
}

impl CliContext {
    /// Create a new CLI context
    pub fn new(
        data_dir: Option<PathBuf>,
        config_path: Option<PathBuf>,
        color: bool,
    ) -> Result<Self, StorageError> {
        let config = match &config_path {
            Some(path) => {
                let mut config = ConfigLoader::load_from_file(path)?;
                if let Some(dir) = data_dir {
                    config.data_dir = dir;
                }
                config
            }
            None => ConfigLoader::load(data_dir.as_deref())?,
        };
        config.validate()?;
        Ok(Self::with_config(config, color))
    }

    pub fn with_config(config: StoreConfig, color: bool) -> Self {
        let schema = if config.strict_schema {
            Schema::strict()
        } else {
            Schema::default()
        };
        Self {
            config,
            schema,
            color,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, StorageError> {
        match command {
            Commands::Cat { file, path, format } => {
                self.handle_cat(file, path.as_deref(), format)
            }
            Commands::Get {
                file,
                path,
                default,
            } => {
                let document = self.existing_document(file)?;
                let segments = split_path(path);
                match (document.get(&segments), default) {
                    (Some(value), _) => Ok(value),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(StorageError::NotFound(path.clone())),
                }
            }
            Commands::Set {
                file,
                path,
                value,
                unset,
            } => self.handle_set(file, path, value.as_deref(), *unset),
            Commands::Ls { target, path } => self.handle_ls(target, path.as_deref()),
            Commands::Diff { from, to } => {
                let from = self.existing_document(from)?;
                let to = self.existing_document(to)?;
                Ok(format_diff(&diff_lines(from.as_ref(), to.as_ref()), self.color))
            }
            Commands::Merge {
                target,
                source,
                under,
            } => self.handle_merge(target, source, *under),
            Commands::InitConfig { write, force } => self.handle_init_config(*write, *force),
        }
    }

    fn document(&self, file: &Path) -> Arc<Document> {
        Document::open_with(file, self.schema)
    }

    fn existing_document(&self, file: &Path) -> Result<Arc<Document>, StorageError> {
        if !file.is_file() {
            return Err(StorageError::NotFound(file.display().to_string()));
        }
        Ok(self.document(file))
    }

    fn handle_cat(&self, file: &Path, path: Option<&str>, format: &str) -> Result<String, StorageError> {
        let document = self.existing_document(file)?;
        let segments = path.map(split_path).unwrap_or_default();
        let node: NodeRef = if segments.is_empty() {
            document.clone() as NodeRef
        } else {
            document
                .child(&segments)
                .ok_or_else(|| StorageError::NotFound(segments.join("/")))?
        };
        match format {
            "json" => Ok(serde_json::to_string_pretty(&NodeExport::from_node(node.as_ref()))?),
            "text" if segments.is_empty() => Ok(self
                .schema
                .document_to_string(document.as_ref(), document.doc_type().as_deref())),
            "text" => {
                let mut out = Vec::new();
                self.schema
                    .write_node(&mut out, node.as_ref())
                    .map_err(|e| StorageError::io(file, e))?;
                Ok(String::from_utf8_lossy(&out).into_owned())
            }
            other => Err(StorageError::InvalidKey(format!(
                "unknown format {:?} (must be 'text' or 'json')",
                other
            ))),
        }
    }

    fn handle_set(
        &self,
        file: &Path,
        path: &str,
        value: Option<&str>,
        unset: bool,
    ) -> Result<String, StorageError> {
        let segments = split_path(path);
        if segments.is_empty() {
            return Err(StorageError::InvalidKey(path.to_string()));
        }
        let document = self.document(file);
        if unset {
            document.set_undefined(&segments)?;
        } else {
            let value = value.ok_or_else(|| StorageError::InvalidKey("missing value".to_string()))?;
            document.set(value, &segments)?;
        }
        document.save()?;
        info!(file = %file.display(), path, "Updated document");
        Ok(String::new())
    }

    fn handle_ls(&self, target: &str, path: Option<&str>) -> Result<String, StorageError> {
        let segments = path.map(split_path).unwrap_or_default();
        let as_path = Path::new(target);

        if as_path.is_dir() {
            let directory = Directory::with_options(
                as_path,
                DirectoryOptions::default().read_only().schema(self.schema),
            );
            return self.list(target, directory.as_ref(), &segments, None);
        }
        if as_path.is_file() {
            let document = self.document(as_path);
            return self.list(target, document.as_ref(), &segments, None);
        }
        if self.config.categories.iter().any(|c| c == target) {
            let registry = Registry::init(StoreConfig {
                autosave_interval_ms: 0,
                watch: false,
                ..self.config.clone()
            })?;
            let view = registry
                .category(target)
                .ok_or_else(|| StorageError::NotFound(target.to_string()))?;
            let sources: &dyn Fn(&str) -> Option<String> =
                &|key: &str| view.container_for(key).map(|node| node.key());
            let listing = self.list(target, view.as_ref(), &segments, Some(sources));
            registry.shutdown();
            return listing;
        }
        Err(StorageError::NotFound(target.to_string()))
    }

    fn list(
        &self,
        title: &str,
        root: &dyn Node,
        segments: &[&str],
        source: Option<&dyn Fn(&str) -> Option<String>>,
    ) -> Result<String, StorageError> {
        let node = if segments.is_empty() {
            None
        } else {
            Some(
                root.child(segments)
                    .ok_or_else(|| StorageError::NotFound(segments.join("/")))?,
            )
        };
        let node: &dyn Node = node.as_deref().unwrap_or(root);
        let rows: Vec<ListingRow> = node
            .keys()
            .into_iter()
            .filter_map(|key| {
                let child = node.get_child(&key)?;
                Some(ListingRow {
                    value: child.value(),
                    children: child.len(),
                    source: if segments.is_empty() {
                        source.and_then(|source| source(&key))
                    } else {
                        None
                    },
                    key,
                })
            })
            .collect();
        Ok(format_listing(title, &rows, self.color))
    }

    fn handle_merge(&self, target: &Path, source: &Path, under: bool) -> Result<String, StorageError> {
        let source = self.existing_document(source)?;
        let target_document = self.document(target);
        if under {
            target_document.merge_under(source.as_ref())?;
        } else {
            target_document.merge(source.as_ref())?;
        }
        target_document.save()?;
        info!(target = %target.display(), under, "Merged documents");
        Ok(String::new())
    }

    fn handle_init_config(&self, write: bool, force: bool) -> Result<String, StorageError> {
        let text = self.config.to_toml()?;
        if !write {
            return Ok(text);
        }
        let path = self.config.data_dir.join(STORE_FILE_NAME);
        if path.exists() && !force {
            return Err(StorageError::ConfigError(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        std::fs::create_dir_all(&self.config.data_dir)
            .map_err(|e| StorageError::io(&self.config.data_dir, e))?;
        std::fs::write(&path, text).map_err(|e| StorageError::io(&path, e))?;
        Ok(format!("Wrote {}", path.display()))
    }
}

/// Split `a/b/c` into segments. Empty segments are dropped.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Values that differ between `from` and `to`, in collation order.
pub fn diff_lines(from: &dyn Node, to: &dyn Node) -> Vec<DiffLine> {
    let removed = from.deep_copy();
    let forward = to.deep_copy();
    // Copies are in-memory and writable.
    let _ = removed.unique_nodes(to);
    let _ = forward.unique_values(from);

    let mut lines = Vec::new();
    for (path, new) in defined_values(forward.as_ref()) {
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        let line = match from.get(&segments) {
            Some(old) => DiffLine::Changed {
                path: path.join("/"),
                old,
                new,
            },
            None => DiffLine::Added {
                path: path.join("/"),
                value: new,
            },
        };
        lines.push((path, line));
    }
    for (path, value) in defined_values(removed.as_ref()) {
        let line = DiffLine::Removed {
            path: path.join("/"),
            value,
        };
        lines.push((path, line));
    }
    lines.sort_by(|(a, _), (b, _)| compare_paths(a, b));
    lines.into_iter().map(|(_, line)| line).collect()
}

fn defined_values(root: &dyn Node) -> Vec<(Vec<String>, String)> {
    fn walk(node: &dyn Node, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, String)>) {
        for key in node.keys() {
            let Some(child) = node.get_child(&key) else {
                continue;
            };
            prefix.push(key);
            if let Some(value) = child.value() {
                out.push((prefix.clone(), value));
            }
            walk(child.as_ref(), prefix, out);
            prefix.pop();
        }
    }
    let mut out = Vec::new();
    walk(root, &mut Vec::new(), &mut out);
    out
}

fn compare_paths(a: &[String], b: &[String]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match compare_keys(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}
