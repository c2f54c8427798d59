//! Integration tests for the strata tree store

mod algebra;
mod collation;
mod directory_reload;
mod overlay;
mod persistence;
mod registry;
mod serialization;
