//! Stores
//!
//! A store is a named cell: an initial value plus an implicit `changed`
//! event. The current value is not held by the store itself but by whichever
//! [`Scope`] the store was written in, so one store can hold different values
//! in different shapes.
//!
//! # Persistence
//!
//! A store created with [`StoreOptions`] carries a persistence key and a
//! [`Codec`]. Keys are claimed in a process-wide table. If two distinct
//! stores claim the same key, the key is poisoned for good and neither store
//! is persisted; this is logged but never an error.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::event::Event;
use super::registry::{Registration, Registry, TokenId, TokenKind};
use super::scope::Scope;
use super::LIFECYCLE;
use crate::error::Result;

/// Conversion between a store value and its persisted form.
pub struct Codec<T> {
    serialize: Rc<dyn Fn(&T) -> serde_json::Result<Value>>,
    deserialize: Rc<dyn Fn(&Value) -> serde_json::Result<T>>,
}

impl<T> Codec<T> {
    pub fn new<S, D>(serialize: S, deserialize: D) -> Self
    where
        S: Fn(&T) -> serde_json::Result<Value> + 'static,
        D: Fn(&Value) -> serde_json::Result<T> + 'static,
    {
        Self {
            serialize: Rc::new(serialize),
            deserialize: Rc::new(deserialize),
        }
    }

    pub fn serialize(&self, value: &T) -> serde_json::Result<Value> {
        (self.serialize)(value)
    }

    pub fn deserialize(&self, raw: &Value) -> serde_json::Result<T> {
        (self.deserialize)(raw)
    }
}

impl<T> Codec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    /// Codec going through `serde_json`.
    pub fn json() -> Self {
        Self::new(|value| serde_json::to_value(value), |raw| T::deserialize(raw))
    }
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        Self {
            serialize: Rc::clone(&self.serialize),
            deserialize: Rc::clone(&self.deserialize),
        }
    }
}

/// Persistence settings for a store.
pub struct StoreOptions<T> {
    key: String,
    codec: Codec<T>,
}

impl<T> StoreOptions<T> {
    pub fn new(key: impl Into<String>, codec: Codec<T>) -> Self {
        Self {
            key: key.into(),
            codec,
        }
    }
}

impl<T> StoreOptions<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    /// Persist under `key` with the JSON codec.
    pub fn json(key: impl Into<String>) -> Self {
        Self::new(key, Codec::json())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyClaim {
    Owned(TokenId),
    Poisoned,
}

// Claimed persistence keys. Shared by every thread so a key can never be
// reused by two stores anywhere in the process.
static PERSIST_KEYS: OnceLock<Mutex<HashMap<String, KeyClaim>>> = OnceLock::new();

fn persist_keys() -> &'static Mutex<HashMap<String, KeyClaim>> {
    PERSIST_KEYS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn claim_key(key: &str, id: TokenId) {
    let mut keys = persist_keys().lock();

    match keys.get(key).copied() {
        None => {
            keys.insert(key.to_owned(), KeyClaim::Owned(id));
        }
        Some(KeyClaim::Owned(owner)) if owner == id => {}
        Some(KeyClaim::Owned(_)) => {
            keys.insert(key.to_owned(), KeyClaim::Poisoned);
            tracing::warn!(
                target: LIFECYCLE,
                key,
                "persistence key claimed by two stores, persistence disabled for it"
            );
        }
        Some(KeyClaim::Poisoned) => {}
    }
}

fn key_owner(key: &str) -> Option<TokenId> {
    match persist_keys().lock().get(key) {
        Some(KeyClaim::Owned(owner)) => Some(*owner),
        _ => None,
    }
}

/// A named cell with an initial value and a `changed` event.
pub struct Store<T> {
    inner: Rc<StoreInner<T>>,
}

pub(crate) struct StoreInner<T> {
    registration: Registration,
    /// Registration of the `changed` event.
    changed: Registration,
    initial: T,
    persist: Option<StoreOptions<T>>,
}

impl<T> Store<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a store without persistence.
    pub fn new(initial: T) -> Self {
        Self::build(initial, None)
    }

    /// Create a persisted store.
    pub fn with_options(initial: T, options: StoreOptions<T>) -> Self {
        Self::build(initial, Some(options))
    }

    fn build(initial: T, persist: Option<StoreOptions<T>>) -> Self {
        let registration = Registration::new(TokenKind::Store);
        let id = registration.id();

        if let Some(options) = &persist {
            claim_key(&options.key, id);
        }

        tracing::trace!(
            target: LIFECYCLE,
            store = %id,
            key = persist.as_ref().map(|options| options.key.as_str()),
            "store created"
        );

        Self {
            inner: Rc::new(StoreInner {
                registration,
                changed: Registration::new(TokenKind::Event),
                initial,
                persist,
            }),
        }
    }

    pub(crate) fn erased(&self) -> Rc<dyn ErasedStore> {
        self.inner.clone()
    }
}

impl<T> Store<T> {
    /// Get the store's token id.
    pub fn id(&self) -> TokenId {
        self.inner.id()
    }

    /// The event dispatched whenever the store changes.
    pub fn changed(&self) -> Event<T> {
        Event::owned(&self.inner.changed)
    }

    pub fn initial(&self) -> &T {
        &self.inner.initial
    }

    /// The persistence key, if one was requested.
    ///
    /// Returned even when the key has been poisoned by a collision.
    pub fn key(&self) -> Option<&str> {
        self.inner.persist.as_ref().map(|options| options.key.as_str())
    }

    /// Whether values of this store are written by `Shape::serialize`.
    pub fn is_persisted(&self) -> bool {
        self.inner.persistence().is_some()
    }

    pub(crate) fn inner(&self) -> &Rc<StoreInner<T>> {
        &self.inner
    }
}

impl<T> StoreInner<T> {
    pub(crate) fn id(&self) -> TokenId {
        self.registration.id()
    }

    /// Persistence key and codec, unless the key was poisoned.
    pub(crate) fn persistence(&self) -> Option<(&str, &Codec<T>)> {
        let options = self.persist.as_ref()?;

        (key_owner(&options.key) == Some(self.id()))
            .then(|| (options.key.as_str(), &options.codec))
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Store<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<T> Eq for Store<T> {}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id())
            .field("initial", &self.inner.initial)
            .field("key", &self.key())
            .finish()
    }
}

/// Type-erased view of a store used by scopes and queued actions.
pub(crate) trait ErasedStore {
    fn id(&self) -> TokenId;

    /// Whether `candidate` equals the store's current value in `scope`.
    fn holds(self: Rc<Self>, scope: &mut Scope, candidate: &dyn Any) -> bool;

    /// Persisted form of `value`, or `None` for stores without a usable key.
    fn persist(&self, value: &dyn Any) -> Option<(String, Value)>;
}

impl<T> ErasedStore for StoreInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn id(&self) -> TokenId {
        self.registration.id()
    }

    fn holds(self: Rc<Self>, scope: &mut Scope, candidate: &dyn Any) -> bool {
        let Some(candidate) = candidate.downcast_ref::<T>() else {
            return false;
        };
        let current = scope
            .lookup(&self)
            .unwrap_or_else(|| self.initial.clone());

        *candidate == current
    }

    fn persist(&self, value: &dyn Any) -> Option<(String, Value)> {
        let (key, codec) = self.persistence()?;
        let value = value.downcast_ref::<T>()?;

        match codec.serialize(value) {
            Ok(raw) => Some((key.to_owned(), raw)),
            Err(error) => {
                tracing::warn!(target: LIFECYCLE, key, %error, "failed to serialize store value");
                None
            }
        }
    }
}

/// Either an event or a store, resolved to the event a dependency or
/// dispatch refers to.
pub enum Key<T> {
    Event(Event<T>),
    Store(Store<T>),
}

impl<T> Key<T> {
    /// The event behind this key: the event itself, or the store's
    /// `changed` event.
    pub fn event(&self) -> Event<T> {
        match self {
            Key::Event(event) => *event,
            Key::Store(store) => store.changed(),
        }
    }

    /// Check that the key is a live token on this thread.
    pub fn ensure(&self) -> Result<()> {
        match self {
            Key::Event(event) => Registry::ensure(event.id(), TokenKind::Event),
            Key::Store(store) => Registry::ensure(store.id(), TokenKind::Store),
        }
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        match self {
            Key::Event(event) => Key::Event(*event),
            Key::Store(store) => Key::Store(store.clone()),
        }
    }
}

impl<T> From<Event<T>> for Key<T> {
    fn from(event: Event<T>) -> Self {
        Key::Event(event)
    }
}

impl<T> From<&Event<T>> for Key<T> {
    fn from(event: &Event<T>) -> Self {
        Key::Event(*event)
    }
}

impl<T> From<Store<T>> for Key<T> {
    fn from(store: Store<T>) -> Self {
        Key::Store(store)
    }
}

impl<T> From<&Store<T>> for Key<T> {
    fn from(store: &Store<T>) -> Self {
        Key::Store(store.clone())
    }
}
