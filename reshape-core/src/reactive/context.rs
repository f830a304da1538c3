//! Hook Context
//!
//! The context tells hooks which tree is being built, which node's body is
//! running, and which scope facts are read from.
//!
//! # Implementation
//!
//! Each shape owns a stack of frames. Attaching an element, applying an
//! action, and `use_scope` each push a frame for their duration and pop it
//! when the returned guard is dropped, even if the body failed.
//!
//! The same stack is the shape's re-entrancy guard: while it is non-empty,
//! dispatches are queued instead of applied.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::registry::{TokenId, TokenKind};
use super::scope::ScopeRef;
use crate::error::{Error, Result};
use crate::graph::{NodeRef, TreeRef};
use crate::shape::ShapeInner;

/// An entry in a shape's frame stack.
#[derive(Clone)]
pub(crate) struct Frame {
    pub(crate) tree: TreeRef,
    pub(crate) scope: ScopeRef,
    /// Scope substituted by `use_scope` for the running node.
    pub(crate) node_scope: Option<ScopeRef>,
}

impl Frame {
    pub(crate) fn new(tree: TreeRef, scope: ScopeRef) -> Self {
        Self {
            tree,
            scope,
            node_scope: None,
        }
    }

    /// The scope hooks read from and dispatch into.
    pub(crate) fn active_scope(&self) -> &ScopeRef {
        self.node_scope.as_ref().unwrap_or(&self.scope)
    }

    /// The node whose body is running.
    pub(crate) fn current_node(&self) -> Result<NodeRef> {
        self.tree.borrow().current().ok_or(Error::NoCurrentNode)
    }
}

/// Guard that pops a frame when dropped.
pub(crate) struct FrameGuard<'a> {
    frames: &'a RefCell<Vec<Frame>>,
    depth: usize,
}

impl<'a> FrameGuard<'a> {
    pub(crate) fn enter(frames: &'a RefCell<Vec<Frame>>, frame: Frame) -> Self {
        let mut stack = frames.borrow_mut();
        stack.push(frame);

        Self {
            frames,
            depth: stack.len(),
        }
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let mut stack = self.frames.borrow_mut();

        debug_assert_eq!(
            stack.len(),
            self.depth,
            "frame stack mismatch: expected depth {}, got {}",
            self.depth,
            stack.len()
        );

        stack.pop();
    }
}

/// Handle passed to unit bodies; all hooks are methods on it.
///
/// A context refers to its shape weakly. Using it after the shape is gone
/// fails with [`Error::Incorrect`].
#[derive(Clone)]
pub struct Context {
    shape: Weak<ShapeInner>,
    id: TokenId,
}

impl Context {
    pub(crate) fn new(shape: &Rc<ShapeInner>) -> Self {
        Self {
            shape: Rc::downgrade(shape),
            id: shape.id(),
        }
    }

    /// Token id of the shape this context belongs to.
    pub fn shape_id(&self) -> TokenId {
        self.id
    }

    /// Whether the shape is currently running a body, an action or a
    /// lifecycle callback.
    pub fn is_active(&self) -> bool {
        self.shape.upgrade().is_some_and(|shape| shape.is_busy())
    }

    pub(crate) fn shape(&self) -> Result<Rc<ShapeInner>> {
        self.shape.upgrade().ok_or(Error::Incorrect {
            kind: TokenKind::Shape,
            id: self.id,
        })
    }

    /// The innermost frame.
    pub(crate) fn frame(&self) -> Result<Frame> {
        let shape = self.shape()?;
        let frame = shape.frames.borrow().last().cloned();
        frame.ok_or(Error::NoActiveContext)
    }
}
