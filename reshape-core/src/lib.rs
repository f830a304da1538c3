//! Reshape Core
//!
//! This crate provides a dependency-tracking runtime that re-executes exactly
//! the computations touched by an event. It implements:
//!
//! - Event and store primitives
//! - Units, the lazy computations that produce elements
//! - A flattened element tree with surgical, identity-preserving rebuilds
//! - A FIFO dispatch queue that serializes re-entrant dispatches
//! - Hooks for reading, depending, dispatching, lifecycle and async work
//! - Persistence of store values as JSON
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: events, stores, units, scopes, hooks and the token registry
//! - `graph`: nodes, trees, reconciliation and diffing
//! - `shape`: runtime instances, the dispatch queue and persistence
//!
//! # Example
//!
//! ```rust
//! use reshape_core::{Event, Shape, Store, Unit};
//!
//! let count = Store::new(0);
//! let increment: Event<()> = Event::new();
//!
//! let counter = Unit::new(|cx, (count, increment): &(Store<i32>, Event<()>)| {
//!     let (value, set) = cx.use_store(count, true)?;
//!     if cx.use_depend(increment)?.called {
//!         set.dispatch(value + 1)?;
//!     }
//!     Ok(())
//! });
//!
//! let shape = Shape::new();
//! shape.attach_element(&counter.call((count.clone(), increment)))?;
//! shape.call_event(&increment, ())?;
//!
//! assert_eq!(shape.value(&count), 1);
//! # Ok::<(), reshape_core::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod shape;

pub use config::ShapeConfig;
pub use error::{Error, Result};
pub use reactive::{
    Cache, Children, Codec, Context, DependFilter, Dispatcher, Element, Event, EventMeta, Key,
    RawData, Store, StoreOptions, TokenId, TokenKind, Unit,
};
pub use shape::{Shape, Unlisten};
