//! Shapes
//!
//! A [`Shape`] is one runtime instance: a root scope, the tree of attached
//! elements, the action queue (held by the root scope) and the frame stack
//! that doubles as the re-entrancy guard.
//!
//! Every public operation validates the tokens it is given against the
//! ownership registry and fails with [`Error::Incorrect`] for a token that
//! is not live on this thread.

mod action;
mod persist;

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use futures_util::future::join_all;

use crate::config::ShapeConfig;
use crate::error::{Error, Result};
use crate::graph::{Tree, TreeRef};
use crate::reactive::{
    Context, Element, Event, Frame, Key, Registration, Registry, Scope, ScopeRef, Store, TokenId,
    TokenKind, LIFECYCLE,
};

pub(crate) use action::Action;

thread_local! {
    static SHAPES: RefCell<HashMap<TokenId, Weak<ShapeInner>>> = RefCell::new(HashMap::new());
}

/// One runtime instance.
///
/// Cloning a shape clones the handle; both refer to the same instance.
#[derive(Clone)]
pub struct Shape {
    inner: Rc<ShapeInner>,
}

pub(crate) struct ShapeInner {
    registration: Registration,
    pub(crate) config: ShapeConfig,
    pub(crate) scope: ScopeRef,
    tree: RefCell<TreeRef>,
    pub(crate) frames: RefCell<Vec<Frame>>,
}

impl ShapeInner {
    pub(crate) fn id(&self) -> TokenId {
        self.registration.id()
    }

    /// Whether a body, an action or a callback is running.
    pub(crate) fn is_busy(&self) -> bool {
        !self.frames.borrow().is_empty()
    }

    pub(crate) fn tree(&self) -> TreeRef {
        self.tree.borrow().clone()
    }

    pub(crate) fn replace_tree(&self, tree: TreeRef) {
        *self.tree.borrow_mut() = tree;
    }

    pub(crate) fn context(self: &Rc<Self>) -> Context {
        Context::new(self)
    }

    /// Scope a dispatch made right now runs in: the active scope of the
    /// innermost frame, or the root scope when idle.
    fn dispatch_scope(&self) -> ScopeRef {
        self.frames
            .borrow()
            .last()
            .map(|frame| frame.active_scope().clone())
            .unwrap_or_else(|| self.scope.clone())
    }

    /// Queue `action` and flush if idle.
    pub(crate) fn dispatch(self: &Rc<Self>, action: Action) -> Result<()> {
        self.scope.borrow_mut().push_action(action);
        action::attach_actions(self)
    }
}

impl Drop for ShapeInner {
    fn drop(&mut self) {
        let id = self.id();
        let _ = SHAPES.try_with(|shapes| {
            shapes.borrow_mut().remove(&id);
        });
    }
}

impl Shape {
    pub fn new() -> Self {
        Self::with_config(ShapeConfig::default())
    }

    pub fn with_config(config: ShapeConfig) -> Self {
        let registration = Registration::new(TokenKind::Shape);
        let id = registration.id();

        let inner = Rc::new(ShapeInner {
            registration,
            config,
            scope: Scope::shared(),
            tree: RefCell::new(Tree::shared()),
            frames: RefCell::new(Vec::new()),
        });

        SHAPES.with(|shapes| {
            shapes.borrow_mut().insert(id, Rc::downgrade(&inner));
        });
        tracing::trace!(
            target: LIFECYCLE,
            shape = %id,
            name = inner.config.name.as_deref(),
            "shape created"
        );

        Self { inner }
    }

    /// Look up a live shape by id.
    pub fn resolve(id: TokenId) -> Result<Self> {
        let inner = SHAPES.with(|shapes| shapes.borrow().get(&id).and_then(Weak::upgrade));

        inner
            .map(|inner| Self { inner })
            .ok_or(Error::Incorrect {
                kind: TokenKind::Shape,
                id,
            })
    }

    pub fn id(&self) -> TokenId {
        self.inner.id()
    }

    pub fn config(&self) -> &ShapeConfig {
        &self.inner.config
    }

    /// A hook context bound to this shape.
    ///
    /// Hooks only succeed while the shape is running a body.
    pub fn context(&self) -> Context {
        self.inner.context()
    }

    /// Attach `element` as a new root and run its subtree.
    ///
    /// Attach callbacks of every new node fire before later dispatches are
    /// applied. On error the shape keeps its previous tree.
    ///
    /// Attaching is queued like a dispatch: called from a body or a callback
    /// it takes effect after the operation in progress, and its outcome is
    /// reported by the call that drains the queue.
    pub fn attach_element(&self, element: &Element) -> Result<()> {
        Registry::ensure(element.id(), TokenKind::Element)?;

        self.inner.dispatch(Action::Attach(element.clone()))
    }

    /// Dispatch `event` with `payload`.
    pub fn call_event<T: 'static>(&self, event: &Event<T>, payload: T) -> Result<()> {
        Registry::ensure(event.id(), TokenKind::Event)?;

        let scope = self.inner.dispatch_scope();
        self.inner.dispatch(Action::event(scope, event.id(), payload))
    }

    /// Set `store` to `value` and dispatch its `changed` event.
    ///
    /// Unless `force` is set, nothing happens when the value equals the
    /// current one at the time the change is applied.
    pub fn change_store<T>(&self, store: &Store<T>, value: T, force: bool) -> Result<()>
    where
        T: Clone + PartialEq + 'static,
    {
        Registry::ensure(store.id(), TokenKind::Store)?;

        let scope = self.inner.dispatch_scope();
        self.inner.dispatch(Action::store(
            scope,
            store.erased(),
            store.changed().id(),
            value,
            force,
        ))
    }

    /// Call `listener` after every dispatch of `key` in the root scope.
    pub fn listen<T: 'static>(
        &self,
        key: impl Into<Key<T>>,
        listener: impl Fn(&T) + 'static,
    ) -> Result<Unlisten> {
        let key = key.into();
        key.ensure()?;

        let event = key.event().id();
        let id = self.inner.scope.borrow_mut().add_listener(
            event,
            Rc::new(move |payload: &dyn Any| {
                if let Some(payload) = payload.downcast_ref::<T>() {
                    listener(payload);
                }
            }),
        );

        Ok(Unlisten {
            scope: Rc::downgrade(&self.inner.scope),
            event,
            id,
        })
    }

    /// Wait until every future registered with `use_promise` has completed,
    /// including futures registered while waiting.
    pub async fn wait(&self) {
        loop {
            let promises = self.inner.scope.borrow_mut().take_promises();
            if promises.is_empty() {
                break;
            }
            join_all(promises).await;
        }
    }

    /// Current value of `store` in the root scope, or its initial value.
    pub fn value<T>(&self, store: &Store<T>) -> T
    where
        T: Clone + PartialEq + 'static,
    {
        let value = self.inner.scope.borrow_mut().value(store);
        value.unwrap_or_else(|| store.initial().clone())
    }

    /// Latest payload of `event` in the root scope.
    pub fn payload<T: Clone + 'static>(&self, event: &Event<T>) -> Option<T> {
        self.inner.scope.borrow().payload(event)
    }

    pub fn scope(&self) -> ScopeRef {
        self.inner.scope.clone()
    }

    pub fn tree(&self) -> TreeRef {
        self.inner.tree()
    }

    /// Whether a body, an action or a callback is running on this shape.
    pub fn is_busy(&self) -> bool {
        self.inner.is_busy()
    }

    /// Number of dispatches waiting to be applied.
    pub fn pending_actions(&self) -> usize {
        self.inner.scope.borrow().action_count()
    }
}

impl Default for Shape {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id())
            .field("name", &self.inner.config.name)
            .field("nodes", &self.inner.tree().borrow().len())
            .finish()
    }
}

/// Removes a listener registered with [`Shape::listen`].
#[derive(Debug)]
pub struct Unlisten {
    scope: Weak<RefCell<Scope>>,
    event: TokenId,
    id: u64,
}

impl Unlisten {
    pub fn unlisten(self) {
        if let Some(scope) = self.scope.upgrade() {
            scope.borrow_mut().remove_listener(self.event, self.id);
        }
    }
}
