//! Element Tree
//!
//! This module implements the live tree of attached elements and the
//! reconciliation that rebuilds it when an event is dispatched.
//!
//! # Overview
//!
//! - A [`Node`] is one attached element instance with its dependencies,
//!   lifecycle callbacks and children.
//! - A [`Tree`] lists nodes in preorder; each node's [`Coordinates`] give
//!   its subtree range and depth.
//! - A [`Diff`] classifies nodes across one rebuild so that lifecycle
//!   callbacks fire only for nodes that actually appeared or disappeared.
//!
//! # Design Decisions
//!
//! 1. The tree is flat rather than linked. A dispatch scans it once and can
//!    skip a re-run subtree by jumping to its `to` coordinate.
//!
//! 2. Node identity follows the element, not the position. Children are
//!    keyed by element id, so reordering siblings keeps their nodes.
//!
//! 3. Nodes that survive a rebuild are shared between the old and new tree.
//!    The diff is therefore a plain identity comparison.

mod diff;
mod node;
mod tree;

pub use diff::Diff;
pub use node::{Coordinates, Node, NodeId, NodeRef};
pub(crate) use node::{Depend, Filter};
pub use tree::{attach_node, attach_root, call_depend, Tree, TreeRef};
