//! File-backed Containers
//!
//! Documents map one tree to one file. Directories and document groups own
//! sets of documents, hand out one instance per document while it is in
//! use, and keep dirty documents queued until they are saved.

pub mod directory;
pub mod document;
pub mod group;
pub mod group_key;

pub use directory::{Directory, DirectoryOptions, DEFAULT_CACHE_CAPACITY};
pub use document::Document;
pub use group::SaveSummary;
pub use group_key::DocumentGroupKey;
