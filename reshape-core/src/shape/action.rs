//! Dispatch queue.
//!
//! Every event call, store change and element attach becomes an [`Action`]
//! appended to the shape's root scope. The queue is drained by whichever call finds the
//! shape idle; calls made while an action, an attach or a callback is in
//! progress only enqueue. Actions are therefore applied one at a time, in
//! the order they were dispatched, each against the tree the previous one
//! produced.

use std::any::Any;
use std::rc::Rc;

use super::ShapeInner;
use crate::error::{Error, Result};
use crate::graph::{attach_root, call_depend, Diff, Node, Tree};
use crate::reactive::{Element, ErasedStore, Frame, FrameGuard, ScopeRef, TokenId, LIFECYCLE};

/// A queued operation.
pub(crate) enum Action {
    Dispatch(Dispatch),
    /// Attach an element as a new root.
    Attach(Element),
}

/// A queued event call or store change.
pub(crate) struct Dispatch {
    scope: ScopeRef,
    event: TokenId,
    payload: Rc<dyn Any>,
    store: Option<Rc<dyn ErasedStore>>,
    force: bool,
}

impl Action {
    pub(crate) fn event<T: 'static>(scope: ScopeRef, event: TokenId, payload: T) -> Self {
        Action::Dispatch(Dispatch {
            scope,
            event,
            payload: Rc::new(payload),
            store: None,
            force: false,
        })
    }

    pub(crate) fn store<T: 'static>(
        scope: ScopeRef,
        store: Rc<dyn ErasedStore>,
        changed: TokenId,
        value: T,
        force: bool,
    ) -> Self {
        Action::Dispatch(Dispatch {
            scope,
            event: changed,
            payload: Rc::new(value),
            store: Some(store),
            force,
        })
    }
}

/// Apply queued actions until the queue is empty.
///
/// Returns immediately if the shape is already busy; the outermost caller
/// drains what was queued. An error stops the flush and leaves the
/// remaining actions queued.
pub(crate) fn attach_actions(shape: &Rc<ShapeInner>) -> Result<()> {
    if shape.is_busy() {
        return Ok(());
    }

    let span = tracing::debug_span!(
        target: LIFECYCLE,
        "dispatch",
        shape = %shape.id(),
        name = shape.config.name.as_deref()
    );
    let _enter = span.enter();

    let mut applied = 0;
    loop {
        let Some(action) = shape.scope.borrow_mut().pop_action() else {
            break;
        };

        if let Some(limit) = shape.config.action_limit {
            if applied >= limit {
                shape.scope.borrow_mut().unshift_action(action);
                tracing::warn!(target: LIFECYCLE, limit, "action limit reached");
                return Err(Error::ActionLimit { limit });
            }
        }

        applied += 1;
        match action {
            Action::Dispatch(dispatch) => attach_action(shape, dispatch)?,
            Action::Attach(element) => attach_element(shape, &element)?,
        }
    }

    Ok(())
}

/// Build `element` as a new root after the current roots and fire attach
/// callbacks of every new node.
///
/// The tree is replaced only when the build succeeds.
fn attach_element(shape: &Rc<ShapeInner>, element: &Element) -> Result<()> {
    let curr = shape.tree();
    let next = Tree::shared();
    next.borrow_mut().extend_from(&curr.borrow());
    let start = next.borrow().len();

    let _guard = FrameGuard::enter(&shape.frames, Frame::new(next.clone(), shape.scope.clone()));
    attach_root(&next, &Node::shared(element.clone()), &shape.context())?;
    shape.replace_tree(next.clone());

    let attached: Vec<_> = next.borrow().nodes()[start..].to_vec();
    for node in attached {
        let callbacks = node.borrow().effects.attached.clone();
        callbacks.iter().for_each(|callback| callback());
    }

    Ok(())
}

/// Apply one dispatch: record it in its scope, rebuild the tree, fire
/// lifecycle callbacks and listeners, then swap in the new tree.
fn attach_action(shape: &Rc<ShapeInner>, dispatch: Dispatch) -> Result<()> {
    let Dispatch {
        scope,
        event,
        payload,
        store,
        force,
    } = dispatch;

    if let Some(store) = &store {
        let unchanged = Rc::clone(store).holds(&mut scope.borrow_mut(), &*payload);
        if unchanged && !force {
            tracing::trace!(target: LIFECYCLE, store = %store.id(), "store unchanged, action skipped");
            return Ok(());
        }
    }

    tracing::debug!(target: LIFECYCLE, %event, "applying action");

    let curr = shape.tree();
    let next = Tree::shared();
    let cx = shape.context();
    let _guard = FrameGuard::enter(&shape.frames, Frame::new(next.clone(), shape.scope.clone()));

    {
        let mut scope = scope.borrow_mut();
        if let Some(store) = &store {
            scope.set_value(Rc::clone(store), Rc::clone(&payload));
        }
        scope.set_current_event(Some(event));
        scope.set_payload(event, Rc::clone(&payload));
    }

    let rebuilt = call_depend(&curr.borrow(), &next, event, &cx);
    scope.borrow_mut().set_current_event(None);
    rebuilt?;

    let diff = Diff::between(&curr.borrow(), &next.borrow());
    diff.fire();

    let listeners = scope.borrow().listeners(event);
    for listener in listeners {
        listener(&*payload);
    }

    shape.replace_tree(next);
    Ok(())
}
