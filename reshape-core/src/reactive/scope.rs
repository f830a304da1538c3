//! Scopes
//!
//! A scope is the "facts" layer: the latest payload of every event, the
//! current value of every written store, the event being dispatched right
//! now, pending async work, external listeners, raw persisted data, and (on a
//! shape's root scope) the queue of actions not yet applied.
//!
//! Nothing here touches a tree. Reads are pure except for one cache: a store
//! value deserialized from raw data is kept so the codec runs once.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::event::Event;
use super::registry::TokenId;
use super::store::{ErasedStore, Store, StoreInner};
use super::LIFECYCLE;
use crate::shape::Action;

/// Persisted store values keyed by persistence key.
pub type RawData = Map<String, Value>;

/// Shared handle to a scope.
pub type ScopeRef = Rc<RefCell<Scope>>;

pub(crate) type Listener = Rc<dyn Fn(&dyn Any)>;

/// What a scope knows about one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta<T> {
    /// The event is the one being dispatched right now.
    pub called: bool,
    /// Latest payload, if the event was ever dispatched in this scope.
    pub payload: Option<T>,
}

struct StoreValue {
    store: Rc<dyn ErasedStore>,
    value: Rc<dyn Any>,
}

#[derive(Default)]
pub struct Scope {
    payloads: HashMap<TokenId, Rc<dyn Any>>,
    values: HashMap<TokenId, StoreValue>,
    current_event: Option<TokenId>,
    promises: Vec<LocalBoxFuture<'static, ()>>,
    listeners: HashMap<TokenId, IndexMap<u64, Listener>>,
    next_listener: u64,
    raw_data: RawData,
    actions: VecDeque<Action>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new scope behind a shared handle.
    pub fn shared() -> ScopeRef {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Latest payload of `event`.
    pub fn payload<T: Clone + 'static>(&self, event: &Event<T>) -> Option<T> {
        self.payloads
            .get(&event.id())
            .and_then(|payload| payload.downcast_ref::<T>())
            .cloned()
    }

    pub(crate) fn raw_payload(&self, event: TokenId) -> Option<Rc<dyn Any>> {
        self.payloads.get(&event).cloned()
    }

    pub fn event_meta<T: Clone + 'static>(&self, event: &Event<T>) -> EventMeta<T> {
        EventMeta {
            called: self.current_event == Some(event.id()),
            payload: self.payload(event),
        }
    }

    /// Current value of `store` in this scope.
    ///
    /// Falls back to raw persisted data, deserialized on first access and
    /// cached. `None` means the store is unset here; callers substitute the
    /// initial value.
    pub fn value<T: Clone + PartialEq + 'static>(&mut self, store: &Store<T>) -> Option<T> {
        self.lookup(store.inner())
    }

    pub(crate) fn lookup<T: Clone + PartialEq + 'static>(
        &mut self,
        store: &Rc<StoreInner<T>>,
    ) -> Option<T> {
        if let Some(slot) = self.values.get(&store.id()) {
            return slot.value.downcast_ref::<T>().cloned();
        }

        let (key, codec) = store.persistence()?;
        let raw = self.raw_data.get(key)?;

        match codec.deserialize(raw) {
            Ok(value) => {
                self.values.insert(
                    store.id(),
                    StoreValue {
                        store: store.clone(),
                        value: Rc::new(value.clone()),
                    },
                );
                Some(value)
            }
            Err(error) => {
                tracing::warn!(target: LIFECYCLE, key, %error, "failed to deserialize store value");
                None
            }
        }
    }

    /// The event being dispatched right now, if any.
    pub fn current_event(&self) -> Option<TokenId> {
        self.current_event
    }

    pub(crate) fn set_current_event(&mut self, event: Option<TokenId>) {
        self.current_event = event;
    }

    pub(crate) fn set_payload(&mut self, event: TokenId, payload: Rc<dyn Any>) {
        self.payloads.insert(event, payload);
    }

    pub(crate) fn set_value(&mut self, store: Rc<dyn ErasedStore>, value: Rc<dyn Any>) {
        self.values.insert(store.id(), StoreValue { store, value });
    }

    pub fn raw_data(&self) -> &RawData {
        &self.raw_data
    }

    pub fn set_raw_data(&mut self, raw_data: RawData) {
        self.raw_data = raw_data;
    }

    /// Persisted form of every written store that has a usable key.
    pub fn serialize(&self) -> RawData {
        self.values
            .values()
            .filter_map(|slot| slot.store.persist(slot.value.as_ref()))
            .collect()
    }

    pub(crate) fn add_promise(&mut self, promise: LocalBoxFuture<'static, ()>) {
        self.promises.push(promise);
    }

    pub(crate) fn take_promises(&mut self) -> Vec<LocalBoxFuture<'static, ()>> {
        std::mem::take(&mut self.promises)
    }

    /// Number of registered futures not yet drained.
    pub fn pending_count(&self) -> usize {
        self.promises.len()
    }

    pub(crate) fn add_listener(&mut self, event: TokenId, listener: Listener) -> u64 {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.entry(event).or_default().insert(id, listener);
        id
    }

    pub(crate) fn remove_listener(&mut self, event: TokenId, id: u64) {
        if let Some(listeners) = self.listeners.get_mut(&event) {
            listeners.shift_remove(&id);
        }
    }

    /// Listeners of `event`, in registration order.
    pub(crate) fn listeners(&self, event: TokenId) -> Vec<Listener> {
        self.listeners
            .get(&event)
            .map(|listeners| listeners.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn push_action(&mut self, action: Action) {
        self.actions.push_back(action);
    }

    pub(crate) fn pop_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub(crate) fn unshift_action(&mut self, action: Action) {
        self.actions.push_front(action);
    }

    /// Number of queued actions.
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}
