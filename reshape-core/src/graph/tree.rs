//! Trees and Reconciliation
//!
//! A tree is a flattened preorder listing of attached nodes plus the stack of
//! nodes currently open while a build is in progress. Every node's
//! [`Coordinates`](super::Coordinates) describe its range in the listing.
//!
//! # Algorithm
//!
//! [`attach_node`] runs a node's body and recursively attaches the children
//! it returns, reusing the previous child node for any element that was
//! already a child. Identity is the element, never its position, so a child
//! moved among its siblings keeps its node.
//!
//! [`call_depend`] rebuilds a tree for one dispatched event without
//! recursion. It scans the old listing left to right:
//!
//! 1. A node with a matching dependency is re-attached into the new tree,
//!    and the scan skips its whole old subtree.
//! 2. Any other node is carried over as is (no re-execution).
//! 3. Before the next node, open ancestors are closed until exactly as many
//!    remain as the next node's level. This restores `to` and `level` for
//!    carried subtrees without a second pass.
//!
//! # Failed builds
//!
//! Nodes carried or re-run into a new tree are shared with the current one,
//! and a build rewrites their coordinates and run state in place. A tree
//! journals the previous state of every node it touches; [`call_depend`] and
//! [`attach_root`] restore the journal when a body fails, so the current tree
//! is left exactly as it was.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::node::{Coordinates, Node, NodeRef, Run};
use crate::error::Result;
use crate::reactive::{Context, TokenId, LIFECYCLE};

/// Shared handle to a tree.
pub type TreeRef = Rc<RefCell<Tree>>;

/// Previous state of a node touched by a build.
enum Undo {
    Coordinates(NodeRef, Coordinates),
    Run(NodeRef, Run),
}

#[derive(Default)]
pub struct Tree {
    stack: Vec<NodeRef>,
    structure: Vec<NodeRef>,
    journal: Vec<Undo>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty tree behind a shared handle.
    pub fn shared() -> TreeRef {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Completed nodes in preorder.
    pub fn nodes(&self) -> &[NodeRef] {
        &self.structure
    }

    pub fn len(&self) -> usize {
        self.structure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structure.is_empty()
    }

    /// The innermost open node, i.e. the one whose body is running.
    pub fn current(&self) -> Option<NodeRef> {
        self.stack.last().cloned()
    }

    /// Number of open nodes.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open `node` at the end of the listing.
    pub(crate) fn push_node(&mut self, node: NodeRef) {
        let coordinates = node.borrow().coordinates;
        self.journal.push(Undo::Coordinates(node.clone(), coordinates));

        node.borrow_mut().coordinates.from = self.structure.len();
        self.stack.push(node.clone());
        self.structure.push(node);
    }

    /// Close the innermost open node.
    pub(crate) fn pop_node(&mut self) -> Option<NodeRef> {
        let node = self.stack.pop()?;
        {
            let mut open = node.borrow_mut();
            open.coordinates.to = self.structure.len().saturating_sub(1);
            open.coordinates.level = self.stack.len();
        }
        Some(node)
    }

    /// Clear `node`'s run state for a re-run.
    ///
    /// Returns the previous children so the re-run can reuse them.
    fn reset_node(&mut self, node: &NodeRef) -> IndexMap<TokenId, NodeRef> {
        let run = node.borrow_mut().take_run();
        let previous = run.children.clone();
        self.journal.push(Undo::Run(node.clone(), run));
        previous
    }

    /// Restore every node this build touched and empty the tree.
    pub(crate) fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Coordinates(node, coordinates) => node.borrow_mut().coordinates = coordinates,
                Undo::Run(node, run) => node.borrow_mut().restore_run(run),
            }
        }
        self.stack.clear();
        self.structure.clear();
    }

    /// Keep this build's changes.
    pub(crate) fn commit(&mut self) {
        self.journal.clear();
    }

    /// Append `other`'s completed nodes, sharing them.
    pub(crate) fn extend_from(&mut self, other: &Tree) {
        self.structure.extend(other.structure.iter().cloned());
    }

    /// Close open nodes until `level` remain.
    fn close_to(&mut self, level: usize) {
        while self.stack.len() > level {
            self.pop_node();
        }
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("stack", &self.stack)
            .field("structure", &self.structure)
            .field("journal", &self.journal.len())
            .finish()
    }
}

/// Commit `tree` if the build succeeded, roll it back otherwise.
fn settle(tree: &TreeRef, outcome: Result<()>) -> Result<()> {
    let mut tree = tree.borrow_mut();
    match &outcome {
        Ok(()) => tree.commit(),
        Err(error) => {
            tracing::debug!(target: LIFECYCLE, %error, "build failed, tree rolled back");
            tree.rollback();
        }
    }
    outcome
}

/// Run `node`'s body inside `tree` and attach the children it returns.
///
/// The node's dependencies, effects and children are rebuilt by the run.
/// Children whose element was already a child of this node keep their node
/// (and with it their private scope and any state keyed on it).
pub fn attach_node(tree: &TreeRef, node: &NodeRef, cx: &Context) -> Result<()> {
    let element = node.borrow().element().clone();

    tree.borrow_mut().push_node(node.clone());
    let previous = tree.borrow_mut().reset_node(node);

    let outcome = element.run(cx).and_then(|children| {
        for child in children.into_iter().flatten() {
            let key = child.id();
            if node.borrow().children.contains_key(&key) {
                continue;
            }

            let child_node = match previous.get(&key) {
                Some(reused) => reused.clone(),
                None => Node::shared(child),
            };
            node.borrow_mut().children.insert(key, child_node.clone());

            attach_node(tree, &child_node, cx)?;
        }
        Ok(())
    });

    tree.borrow_mut().pop_node();

    let node = node.borrow();
    tracing::debug!(
        target: LIFECYCLE,
        element = %node.element().id(),
        from = node.coordinates.from,
        to = node.coordinates.to,
        level = node.coordinates.level,
        "element attached"
    );

    outcome
}

/// [`attach_node`] as a whole build: on error every node it touched is
/// restored and `tree` is left empty.
pub fn attach_root(tree: &TreeRef, node: &NodeRef, cx: &Context) -> Result<()> {
    settle(tree, attach_node(tree, node, cx))
}

/// Rebuild `curr` into `next` for one dispatched `event`.
///
/// Nodes with a matching dependency are re-run; everything else is carried
/// over untouched. If a body fails, `curr` is left as it was.
pub fn call_depend(curr: &Tree, next: &TreeRef, event: TokenId, cx: &Context) -> Result<()> {
    settle(next, scan(curr, next, event, cx))
}

fn scan(curr: &Tree, next: &TreeRef, event: TokenId, cx: &Context) -> Result<()> {
    let nodes = curr.nodes();
    let mut index = 0;

    while let Some(node) = nodes.get(index) {
        let depends = node.borrow().depends.clone();
        let matched = depends.iter().any(|depend| depend.matches(event));

        if matched {
            index = node.borrow().coordinates.to;
            tracing::debug!(
                target: LIFECYCLE,
                element = %node.borrow().element().id(),
                "element re-attach"
            );
            attach_node(next, node, cx)?;
        } else {
            next.borrow_mut().push_node(node.clone());
        }

        index += 1;

        let level = nodes
            .get(index)
            .map_or(0, |upcoming| upcoming.borrow().coordinates.level);
        next.borrow_mut().close_to(level);
    }

    Ok(())
}
