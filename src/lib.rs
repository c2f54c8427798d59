//! Strata: Hierarchical, Overlaid, Lazily-Persisted Tree Store
//!
//! Every piece of data is a node in a key/value tree. Documents are subtrees
//! backed by one text file each and are read on first touch; edits mark them
//! dirty and a save writes them back. Directories hold one document per
//! file, and a [`views::ComboView`] overlays several containers so that a
//! read-only base repository can be shadowed by an editable one.
//!
//! The [`registry::Registry`] assembles the containers for an application,
//! saving periodically in the background and on shutdown.

pub mod concurrency;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod schema;
pub mod store;
pub mod tooling;
pub mod tree;
pub mod views;
pub mod watch;

pub use error::{SchemaError, StorageError};
pub use registry::Registry;
pub use tree::{Node, NodeExt, NodeRef, TreeAlgebra};
