//! Node classification across one rebuild.

use std::collections::HashSet;

use super::node::{NodeId, NodeRef};
use super::tree::Tree;
use crate::reactive::LIFECYCLE;

/// Nodes of two trees partitioned by identity.
///
/// `skipped` and `attached` follow the order of the next tree; `detached`
/// follows the order of the previous one.
#[derive(Debug, Default)]
pub struct Diff {
    pub skipped: Vec<NodeRef>,
    pub attached: Vec<NodeRef>,
    pub detached: Vec<NodeRef>,
}

impl Diff {
    pub fn between(prev: &Tree, next: &Tree) -> Self {
        let before: HashSet<NodeId> = prev.nodes().iter().map(|n| n.borrow().id()).collect();
        let mut diff = Diff::default();

        for node in next.nodes() {
            if before.contains(&node.borrow().id()) {
                diff.skipped.push(node.clone());
            } else {
                diff.attached.push(node.clone());
            }
        }

        let kept: HashSet<NodeId> = diff.skipped.iter().map(|n| n.borrow().id()).collect();
        diff.detached = prev
            .nodes()
            .iter()
            .filter(|node| !kept.contains(&node.borrow().id()))
            .cloned()
            .collect();

        diff
    }

    /// Whether nothing was attached or detached.
    pub fn is_unchanged(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }

    /// Run detach callbacks, then attach callbacks.
    ///
    /// Skipped nodes fire nothing.
    pub fn fire(&self) {
        for node in &self.detached {
            let callbacks = node.borrow().effects.detached.clone();
            tracing::debug!(target: LIFECYCLE, element = %node.borrow().element().id(), "element detached");
            callbacks.iter().for_each(|callback| callback());
        }
        for node in &self.attached {
            let callbacks = node.borrow().effects.attached.clone();
            callbacks.iter().for_each(|callback| callback());
        }
    }
}
