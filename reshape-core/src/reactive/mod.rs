//! Reactive Primitives
//!
//! This module implements the building blocks units are written with:
//! events, stores, units and elements, scopes, and the hook context.
//!
//! # Concepts
//!
//! ## Events
//!
//! An [`Event`] is an identity-only token with a payload type. Dispatching
//! it records the payload in a scope and re-runs every attached node that
//! depends on it.
//!
//! ## Stores
//!
//! A [`Store`] is a cell with an initial value and an implicit `changed`
//! event. Its current value lives in a scope, so one store can hold
//! different values in different shapes.
//!
//! ## Units and Elements
//!
//! A [`Unit`] wraps a body function. Calling it produces an [`Element`], the
//! lazily evaluated instance that gets attached to a shape's tree.
//!
//! ## Scopes
//!
//! A [`Scope`] holds facts: payloads, values, pending async work, listeners
//! and raw persisted data.
//!
//! # Implementation Notes
//!
//! Bodies receive an explicit [`Context`] instead of reading ambient global
//! state. The context resolves the innermost frame of its shape to find the
//! running node and the active scope.

mod cache;
mod context;
mod event;
mod hooks;
mod registry;
mod scope;
mod store;
mod unit;

pub use cache::Cache;
pub use context::Context;
pub(crate) use context::{Frame, FrameGuard};
pub use event::Event;
pub use hooks::{DependFilter, Dispatcher};
pub use registry::{
    is_element, is_event, is_shape, is_store, is_unit, Registry, TokenId, TokenKind,
};
pub(crate) use registry::Registration;
pub use scope::{EventMeta, RawData, Scope, ScopeRef};
pub use store::{Codec, Key, Store, StoreOptions};
pub(crate) use store::ErasedStore;
pub use unit::{Children, Element, Unit};

/// Tracing target for lifecycle events.
pub(crate) const LIFECYCLE: &str = "reshape::lifecycle";
