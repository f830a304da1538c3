//! Ownership Registry
//!
//! Every event, store, unit, element and shape is identified by a
//! [`TokenId`]. The registry records which ids are live on the current
//! thread and what kind of handle each one is. Type guards and the
//! "incorrect token" checks performed by shape operations answer from here.
//!
//! # Lifetimes
//!
//! Events made with `Event::new` are permanent: once created they stay
//! registered for the life of the thread. A store's `changed` event, and
//! every other kind, is backed by a [`Registration`] guard inside shared
//! state, so the entry disappears when the last handle is dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// Unique identifier for a runtime token.
///
/// Ids come from one process-wide counter, so they never collide across
/// kinds or threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u64);

impl TokenId {
    /// Generate a new unique token id.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TokenId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of handle a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Event,
    Store,
    Unit,
    Element,
    Shape,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Event => "event",
            TokenKind::Store => "store",
            TokenKind::Unit => "unit",
            TokenKind::Element => "element",
            TokenKind::Shape => "shape",
        };
        f.write_str(name)
    }
}

thread_local! {
    static OWNERSHIP: RefCell<HashMap<TokenId, TokenKind>> = RefCell::new(HashMap::new());
}

/// Guard that keeps a token registered.
///
/// Dropping the guard unregisters the token.
#[derive(Debug)]
pub(crate) struct Registration {
    id: TokenId,
}

impl Registration {
    pub(crate) fn new(kind: TokenKind) -> Self {
        Self {
            id: Registry::register(kind),
        }
    }

    pub(crate) fn id(&self) -> TokenId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        // The thread-local may already be gone during thread teardown.
        let _ = OWNERSHIP.try_with(|owned| {
            owned.borrow_mut().remove(&self.id);
        });
    }
}

/// Lookup table for live tokens on the current thread.
pub struct Registry;

impl Registry {
    /// Allocate a fresh id and record it under `kind`.
    pub(crate) fn register(kind: TokenKind) -> TokenId {
        let id = TokenId::next();
        OWNERSHIP.with(|owned| {
            owned.borrow_mut().insert(id, kind);
        });
        id
    }

    /// The kind of a live token, if any.
    pub fn kind_of(id: TokenId) -> Option<TokenKind> {
        OWNERSHIP.with(|owned| owned.borrow().get(&id).copied())
    }

    /// Check that `id` is a live token of `kind`.
    pub fn ensure(id: TokenId, kind: TokenKind) -> Result<()> {
        match Self::kind_of(id) {
            Some(found) if found == kind => Ok(()),
            _ => Err(Error::Incorrect { kind, id }),
        }
    }

    /// Number of live tokens of `kind` on this thread.
    pub fn count(kind: TokenKind) -> usize {
        OWNERSHIP.with(|owned| owned.borrow().values().filter(|k| **k == kind).count())
    }
}

pub fn is_event(id: TokenId) -> bool {
    Registry::kind_of(id) == Some(TokenKind::Event)
}

pub fn is_store(id: TokenId) -> bool {
    Registry::kind_of(id) == Some(TokenKind::Store)
}

pub fn is_unit(id: TokenId) -> bool {
    Registry::kind_of(id) == Some(TokenKind::Unit)
}

pub fn is_element(id: TokenId) -> bool {
    Registry::kind_of(id) == Some(TokenKind::Element)
}

pub fn is_shape(id: TokenId) -> bool {
    Registry::kind_of(id) == Some(TokenKind::Shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_ids_are_unique() {
        let id1 = TokenId::next();
        let id2 = TokenId::next();
        let id3 = TokenId::next();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn registration_unregisters_on_drop() {
        let registration = Registration::new(TokenKind::Element);
        let id = registration.id();

        assert!(is_element(id));
        assert!(!is_shape(id));

        drop(registration);

        assert!(!is_element(id));
        assert_eq!(Registry::kind_of(id), None);
    }

    #[test]
    fn ensure_rejects_wrong_kind() {
        let id = Registry::register(TokenKind::Event);

        assert!(Registry::ensure(id, TokenKind::Event).is_ok());
        assert!(matches!(
            Registry::ensure(id, TokenKind::Store),
            Err(Error::Incorrect { kind: TokenKind::Store, .. })
        ));
        assert!(matches!(
            Registry::ensure(TokenId::from(0), TokenKind::Event),
            Err(Error::Incorrect { kind: TokenKind::Event, .. })
        ));
    }

    #[test]
    fn tokens_are_thread_local() {
        let id = Registry::register(TokenKind::Event);

        let seen = std::thread::spawn(move || is_event(id))
            .join()
            .expect("thread panicked");

        assert!(is_event(id));
        assert!(!seen);
    }
}
