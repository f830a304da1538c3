//! Persistence of store values.
//!
//! Only the root scope is persisted. A store is written when it has a
//! persistence key that was not poisoned by a collision; see
//! [`StoreOptions`](crate::StoreOptions).

use super::Shape;
use crate::reactive::RawData;

impl Shape {
    /// Persisted form of every store written in the root scope.
    pub fn serialize(&self) -> RawData {
        self.inner.scope.borrow().serialize()
    }

    /// Replace the root scope's raw data.
    ///
    /// Values are decoded lazily, the first time each store is read, and
    /// only for stores that have not been written yet.
    pub fn set_raw_data(&self, raw_data: RawData) {
        tracing::debug!(
            target: crate::reactive::LIFECYCLE,
            shape = %self.id(),
            keys = raw_data.len(),
            "raw data set"
        );
        self.inner.scope.borrow_mut().set_raw_data(raw_data);
    }
}

#[cfg(test)]
mod tests {
    use crate::reactive::{Store, StoreOptions, Unit};
    use crate::shape::Shape;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn serialize_writes_changed_stores() {
        let count = Store::with_options(0u32, StoreOptions::json("persist-tests/count"));
        let plain = Store::new(0u32);
        let shape = Shape::new();

        shape.change_store(&count, 3, false).expect("change");
        shape.change_store(&plain, 4, false).expect("change");

        let raw = shape.serialize();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw.get("persist-tests/count"), Some(&json!(3)));
    }

    #[test]
    fn raw_data_seeds_values() {
        let name = Store::with_options(String::new(), StoreOptions::json("persist-tests/name"));
        let seen = Rc::new(Cell::new(false));
        let seen_body = seen.clone();
        let unit = Unit::new(move |cx, name: &Store<String>| {
            seen_body.set(cx.use_value(name)? == "restored");
            Ok(())
        });

        let source = Shape::new();
        source.change_store(&name, "restored".to_string(), false).expect("change");

        let target = Shape::new();
        target.set_raw_data(source.serialize());
        target.attach_element(&unit.call(name.clone())).expect("attach");

        assert!(seen.get());
        assert_eq!(target.value(&name), "restored");
    }
}
