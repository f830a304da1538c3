//! Events
//!
//! An event is an identity-only token naming a class of occurrences with a
//! payload type. It carries no runtime data: the payload of the latest
//! occurrence lives in a [`Scope`](super::Scope).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use super::registry::{Registration, Registry, TokenId, TokenKind};
use super::LIFECYCLE;

/// Typed event token.
///
/// Two events are the same event iff they have the same id. Events are
/// `Copy`; copies share identity.
pub struct Event<T> {
    id: TokenId,
    _payload: PhantomData<fn() -> T>,
}

impl<T: 'static> Event<T> {
    /// Create a new event.
    pub fn new() -> Self {
        let id = Registry::register(TokenKind::Event);
        tracing::trace!(target: LIFECYCLE, event = %id, "event created");

        Self {
            id,
            _payload: PhantomData,
        }
    }
}

impl<T> Event<T> {
    /// An event whose registration is held by its owner.
    ///
    /// Used for a store's `changed` event, which is unregistered together
    /// with the store.
    pub(crate) fn owned(registration: &Registration) -> Self {
        Self {
            id: registration.id(),
            _payload: PhantomData,
        }
    }

    /// Get the event's token id.
    pub fn id(&self) -> TokenId {
        self.id
    }
}

impl<T: 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Event<T> {}

impl<T> PartialEq for Event<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Event<T> {}

impl<T> Hash for Event<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Event").field(&self.id).finish()
    }
}
