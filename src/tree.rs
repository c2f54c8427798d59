//! Tree Layer
//!
//! The node contract, its in-memory and change-tracking variants, the
//! listener protocol and the merge/diff algebra shared by every container.

mod branch;
pub mod algebra;
pub mod collate;
pub mod listener;
pub mod node;
pub mod persistent;
pub mod volatile;

pub(crate) use branch::Branch;
pub use algebra::TreeAlgebra;
pub use collate::{compare_keys, CollatedKey};
pub use listener::{ChangeEvent, EventRecorder, ListenerSet, NodeListener};
pub use node::{same_node, Node, NodeExt, NodeRef};
pub use persistent::PersistentNode;
pub use volatile::VolatileNode;
