//! Hooks
//!
//! Hooks are how a unit body talks to the runtime. Each one resolves the
//! innermost frame of the shape the body runs in:
//!
//! - reads ([`Context::use_value`], [`Context::use_payload`]) see the active
//!   scope;
//! - [`Context::use_depend`] records on the running node which event should
//!   re-run it;
//! - [`Context::use_dispatch`] hands out a [`Dispatcher`] that queues actions
//!   on the shape;
//! - [`Context::use_attach`] / [`Context::use_detach`] register lifecycle
//!   callbacks;
//! - [`Context::use_promise`] registers async work for `Shape::wait`;
//! - [`Context::use_scope`] runs a closure with the node's private scope.
//!
//! Calling a hook while the shape is idle fails with
//! [`Error::NoActiveContext`](crate::Error::NoActiveContext); calling one from
//! a listener or lifecycle callback fails with
//! [`Error::NoCurrentNode`](crate::Error::NoCurrentNode).

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures_util::future::{LocalBoxFuture, Shared};
use futures_util::FutureExt;

use super::context::{Context, Frame, FrameGuard};
use super::event::Event;
use super::registry::{Registry, TokenId, TokenKind};
use super::scope::{EventMeta, Scope, ScopeRef};
use super::store::{Key, Store};
use super::LIFECYCLE;
use crate::error::{Error, Result};
use crate::graph::{Depend, Filter};
use crate::shape::{Action, ShapeInner};

/// Narrows when a dependency re-runs its node.
///
/// `When` receives the payload just dispatched in the dependency's scope.
pub enum DependFilter<T> {
    Always,
    Never,
    When(Rc<dyn Fn(Option<&T>) -> bool>),
}

impl<T> DependFilter<T> {
    pub fn when<F>(filter: F) -> Self
    where
        F: Fn(Option<&T>) -> bool + 'static,
    {
        DependFilter::When(Rc::new(filter))
    }
}

impl<T: 'static> DependFilter<T> {
    fn bind(self, scope: &ScopeRef, event: TokenId) -> Filter {
        match self {
            DependFilter::Always => Filter::Always,
            DependFilter::Never => Filter::Never,
            DependFilter::When(filter) => {
                let scope = scope.clone();
                Filter::When(Rc::new(move || {
                    let payload = scope.borrow().raw_payload(event);
                    filter(payload.as_deref().and_then(|p| p.downcast_ref::<T>()))
                }))
            }
        }
    }
}

impl<T> Default for DependFilter<T> {
    fn default() -> Self {
        DependFilter::Always
    }
}

impl<T> Clone for DependFilter<T> {
    fn clone(&self) -> Self {
        match self {
            DependFilter::Always => DependFilter::Always,
            DependFilter::Never => DependFilter::Never,
            DependFilter::When(filter) => DependFilter::When(Rc::clone(filter)),
        }
    }
}

impl<T> From<bool> for DependFilter<T> {
    fn from(enabled: bool) -> Self {
        if enabled {
            DependFilter::Always
        } else {
            DependFilter::Never
        }
    }
}

/// Queues events or store changes on the shape a hook ran in.
///
/// The action runs in the scope that was active when the dispatcher was
/// created. If nothing else is running on the shape, the queue is flushed
/// before the call returns.
pub struct Dispatcher<T> {
    shape: Weak<ShapeInner>,
    shape_id: TokenId,
    scope: Weak<RefCell<Scope>>,
    key: Key<T>,
}

impl<T> Dispatcher<T>
where
    T: Clone + PartialEq + 'static,
{
    pub fn dispatch(&self, value: T) -> Result<()> {
        self.send(value, false)
    }

    /// Like [`dispatch`](Self::dispatch), but a store change is applied even
    /// when the value is equal to the current one.
    pub fn force(&self, value: T) -> Result<()> {
        self.send(value, true)
    }

    fn send(&self, value: T, force: bool) -> Result<()> {
        let shape = self.shape.upgrade().ok_or(Error::Incorrect {
            kind: TokenKind::Shape,
            id: self.shape_id,
        })?;

        let Some(scope) = self.scope.upgrade() else {
            tracing::debug!(target: LIFECYCLE, event = %self.key.event().id(), "dispatch into dropped scope ignored");
            return Ok(());
        };

        let action = match &self.key {
            Key::Event(event) => Action::event(scope, event.id(), value),
            Key::Store(store) => Action::store(scope, store.erased(), store.changed().id(), value, force),
        };

        shape.dispatch(action)
    }
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            shape_id: self.shape_id,
            scope: self.scope.clone(),
            key: self.key.clone(),
        }
    }
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("shape", &self.shape_id)
            .field("event", &self.key.event().id())
            .finish()
    }
}

impl Context {
    /// Re-run the current node whenever `key` is dispatched in the active
    /// scope.
    pub fn use_depend<T>(&self, key: impl Into<Key<T>>) -> Result<EventMeta<T>>
    where
        T: Clone + 'static,
    {
        self.use_depend_with(key, DependFilter::Always)
    }

    /// [`use_depend`](Self::use_depend) with a filter.
    pub fn use_depend_with<T>(
        &self,
        key: impl Into<Key<T>>,
        filter: impl Into<DependFilter<T>>,
    ) -> Result<EventMeta<T>>
    where
        T: Clone + 'static,
    {
        let frame = self.frame()?;
        let node = frame.current_node()?;
        let scope = frame.active_scope();
        let key = key.into();
        key.ensure()?;
        let event = key.event();

        let filter = filter.into().bind(scope, event.id());
        node.borrow_mut()
            .depends
            .push(Depend::new(event.id(), scope.clone(), filter));

        let meta = scope.borrow().event_meta(&event);
        Ok(meta)
    }

    /// What the active scope knows about `event`, without depending on it.
    pub fn use_payload<T>(&self, event: &Event<T>) -> Result<EventMeta<T>>
    where
        T: Clone + 'static,
    {
        let frame = self.frame()?;
        Registry::ensure(event.id(), TokenKind::Event)?;
        let meta = frame.active_scope().borrow().event_meta(event);
        Ok(meta)
    }

    /// Current value of `store`, or its initial value if unset.
    pub fn use_value<T>(&self, store: &Store<T>) -> Result<T>
    where
        T: Clone + PartialEq + 'static,
    {
        let frame = self.frame()?;
        Ok(read(frame.active_scope(), store))
    }

    /// A reader for `store` that can be called later, for example from a
    /// lifecycle callback.
    pub fn use_take<T>(&self, store: &Store<T>) -> Result<impl Fn() -> T>
    where
        T: Clone + PartialEq + 'static,
    {
        let frame = self.frame()?;
        let scope = frame.active_scope().clone();
        let store = store.clone();

        Ok(move || read(&scope, &store))
    }

    pub fn use_dispatch<T>(&self, key: impl Into<Key<T>>) -> Result<Dispatcher<T>>
    where
        T: Clone + PartialEq + 'static,
    {
        let shape = self.shape()?;
        let frame = self.frame()?;
        let key = key.into();
        key.ensure()?;

        Ok(Dispatcher {
            shape: Rc::downgrade(&shape),
            shape_id: shape.id(),
            scope: Rc::downgrade(frame.active_scope()),
            key,
        })
    }

    /// Register `future` with the shape so `Shape::wait` waits for it.
    ///
    /// Returns a shared handle to the same future.
    pub fn use_promise<F>(&self, future: F) -> Result<Shared<LocalBoxFuture<'static, F::Output>>>
    where
        F: Future + 'static,
        F::Output: Clone,
    {
        let shape = self.shape()?;
        self.frame()?;

        let shared = future.boxed_local().shared();
        shape
            .scope
            .borrow_mut()
            .add_promise(shared.clone().map(|_| ()).boxed_local());

        Ok(shared)
    }

    /// Run `callback` when the current node enters the tree.
    pub fn use_attach(&self, callback: impl Fn() + 'static) -> Result<()> {
        let node = self.frame()?.current_node()?;
        node.borrow_mut().effects.attached.push(Rc::new(callback));
        Ok(())
    }

    /// Run `callback` when the current node leaves the tree.
    pub fn use_detach(&self, callback: impl Fn() + 'static) -> Result<()> {
        let node = self.frame()?.current_node()?;
        node.borrow_mut().effects.detached.push(Rc::new(callback));
        Ok(())
    }

    /// Run `callback` with the current node's private scope as the active
    /// scope.
    ///
    /// Values, payloads and dispatches inside the callback are local to this
    /// node and persist across its re-runs.
    pub fn use_scope<R>(&self, callback: impl FnOnce(&Context) -> Result<R>) -> Result<R> {
        let shape = self.shape()?;
        let frame = self.frame()?;
        let node = frame.current_node()?;

        let frame = Frame {
            node_scope: Some(node.borrow().scope().clone()),
            ..frame
        };
        let _guard = FrameGuard::enter(&shape.frames, frame);

        callback(self)
    }

    /// Depend on `event` and get a dispatcher for it.
    pub fn use_event<T>(
        &self,
        event: &Event<T>,
        filter: impl Into<DependFilter<T>>,
    ) -> Result<(EventMeta<T>, Dispatcher<T>)>
    where
        T: Clone + PartialEq + 'static,
    {
        let meta = self.use_depend_with(event, filter)?;
        Ok((meta, self.use_dispatch(event)?))
    }

    /// Depend on `store` and get its value plus a dispatcher for it.
    pub fn use_store<T>(
        &self,
        store: &Store<T>,
        filter: impl Into<DependFilter<T>>,
    ) -> Result<(T, Dispatcher<T>)>
    where
        T: Clone + PartialEq + 'static,
    {
        self.use_depend_with(store, filter)?;
        Ok((self.use_value(store)?, self.use_dispatch(store)?))
    }
}

fn read<T>(scope: &ScopeRef, store: &Store<T>) -> T
where
    T: Clone + PartialEq + 'static,
{
    let value = scope.borrow_mut().value(store);
    value.unwrap_or_else(|| store.initial().clone())
}
