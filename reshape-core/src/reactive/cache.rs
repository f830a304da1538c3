//! Keyed memoization for stable element identity.
//!
//! Calling a unit always produces a new element, so a body that returns
//! `unit.call(x)` on every run would replace its child every time. Keeping
//! elements in a [`Cache`] keyed by what they were built from makes the
//! child survive re-runs with its node, scope and effects intact.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;

/// Insertion-ordered memo table with interior mutability.
///
/// Shared between re-runs by capturing it (usually behind an `Rc`) in a
/// unit body.
pub struct Cache<K, V> {
    values: RefCell<IndexMap<K, V>>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            values: RefCell::new(IndexMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.values.borrow().get(key).cloned()
    }

    /// Store `value` under `key` and return it.
    pub fn set(&self, key: K, value: V) -> V {
        self.values.borrow_mut().insert(key, value.clone());
        value
    }

    /// The cached value for `key`, creating it on first use.
    ///
    /// `create` runs without the table borrowed, so it may use the cache
    /// itself.
    pub fn take(&self, key: K, create: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        self.set(key, create())
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.values.borrow_mut().shift_remove(key)
    }

    pub fn clear(&self) {
        self.values.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.values.borrow().len())
            .finish()
    }
}
