//! Integration Tests for Shapes
//!
//! These tests verify that units, events, stores and the dispatch queue work
//! together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use reshape_core::{
    Cache, DependFilter, Element, Error, Event, EventMeta, Shape, ShapeConfig, Store,
    StoreOptions, Unit,
};

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

/// Dispatching one event re-runs only the child that depends on it.
#[test]
fn dispatch_reruns_only_dependent_child() {
    let first: Event<()> = Event::new();
    let second: Event<()> = Event::new();
    let (runs1, runs2) = (counter(), counter());

    let child = Unit::new(|cx, (event, runs): &(Event<()>, Rc<Cell<u32>>)| {
        runs.set(runs.get() + 1);
        cx.use_depend(event)?;
        Ok(())
    });
    let root = Unit::new(|_, children: &Vec<Element>| Ok(children.clone()));

    let shape = Shape::new();
    shape
        .attach_element(&root.call(vec![
            child.call((first, runs1.clone())),
            child.call((second, runs2.clone())),
        ]))
        .expect("attach");

    assert_eq!((runs1.get(), runs2.get()), (1, 1));

    shape.call_event(&first, ()).expect("dispatch");

    assert_eq!((runs1.get(), runs2.get()), (2, 1));
}

/// A store change fires one dependency callback; an equal value fires none.
#[test]
fn store_change_fires_once_per_distinct_value() {
    let path = Store::new("_".to_string());
    let calls: Rc<RefCell<Vec<EventMeta<String>>>> = Rc::new(RefCell::new(Vec::new()));
    let calls_body = calls.clone();

    let unit = Unit::new(move |cx, path: &Store<String>| {
        let meta = cx.use_depend(path)?;
        if meta.called {
            calls_body.borrow_mut().push(meta);
        }
        Ok(())
    });

    let shape = Shape::new();
    shape.attach_element(&unit.call(path.clone())).expect("attach");

    shape.change_store(&path, "/".to_string(), false).expect("change");
    assert_eq!(
        *calls.borrow(),
        vec![EventMeta {
            called: true,
            payload: Some("/".to_string()),
        }]
    );

    shape.change_store(&path, "/".to_string(), false).expect("same value");
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(shape.value(&path), "/");
}

/// A child dropped from its parent's output fires its detach callback once.
#[test]
fn removed_child_fires_detach_once() {
    let toggle: Event<bool> = Event::new();
    let detached = counter();
    let attached = counter();

    let leaf = {
        let (attached, detached) = (attached.clone(), detached.clone());
        Unit::new(move |cx, _: &()| {
            let attached = attached.clone();
            let detached = detached.clone();
            cx.use_attach(move || attached.set(attached.get() + 1))?;
            cx.use_detach(move || detached.set(detached.get() + 1))?;
            Ok(())
        })
    };
    let keep = leaf.call(());
    let drop_me = leaf.call(());

    let parent = Unit::new(move |cx, (toggle, keep, drop_me): &(Event<bool>, Element, Element)| {
        let meta = cx.use_depend(toggle)?;
        let mut children = vec![keep.clone()];
        if meta.payload.unwrap_or(true) {
            children.push(drop_me.clone());
        }
        Ok(children)
    });

    let shape = Shape::new();
    shape
        .attach_element(&parent.call((toggle, keep, drop_me)))
        .expect("attach");
    assert_eq!(attached.get(), 2);

    shape.call_event(&toggle, false).expect("shrink");
    shape.call_event(&toggle, false).expect("again");

    assert_eq!(detached.get(), 1);
    assert_eq!(attached.get(), 2);
    assert_eq!(shape.tree().borrow().len(), 2);

    shape.call_event(&toggle, true).expect("grow");

    assert_eq!(attached.get(), 3);
    assert_eq!(shape.tree().borrow().len(), 3);
}

/// Dispatches made while an action is applied run afterwards, in order.
#[test]
fn dispatches_during_rebuild_are_fifo() {
    let start: Event<()> = Event::new();
    let a: Event<&'static str> = Event::new();
    let b: Event<&'static str> = Event::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let trigger = Unit::new(|cx, (start, a, b): &(Event<()>, Event<&'static str>, Event<&'static str>)| {
        let meta = cx.use_depend(start)?;
        if meta.called {
            cx.use_dispatch(a)?.dispatch("a")?;
            cx.use_dispatch(b)?.dispatch("b")?;
        }
        Ok(())
    });
    let observer = {
        let log = log.clone();
        Unit::new(move |cx, (a, b): &(Event<&'static str>, Event<&'static str>)| {
            for event in [a, b] {
                let meta = cx.use_depend(event)?;
                if let (true, Some(payload)) = (meta.called, meta.payload) {
                    log.borrow_mut().push(payload);
                }
            }
            Ok(())
        })
    };
    let root = Unit::new(|_, children: &Vec<Element>| Ok(children.clone()));

    let shape = Shape::new();
    shape
        .attach_element(&root.call(vec![trigger.call((start, a, b)), observer.call((a, b))]))
        .expect("attach");

    shape.call_event(&start, ()).expect("start");

    assert_eq!(*log.borrow(), vec!["a", "b"]);
    assert_eq!(shape.pending_actions(), 0);
}

/// A listener sees the payload after the rebuild for its event.
#[test]
fn listeners_run_after_rebuild() {
    let store = Store::new(0);
    let order = Rc::new(RefCell::new(Vec::new()));

    let unit = {
        let order = order.clone();
        Unit::new(move |cx, store: &Store<i32>| {
            let (value, _) = cx.use_store(store, true)?;
            order.borrow_mut().push(format!("body {value}"));
            Ok(())
        })
    };

    let shape = Shape::new();
    shape.attach_element(&unit.call(store.clone())).expect("attach");
    let listener_order = order.clone();
    let unlisten = shape
        .listen(&store, move |value: &i32| listener_order.borrow_mut().push(format!("listener {value}")))
        .expect("listen");

    shape.change_store(&store, 7, false).expect("change");
    unlisten.unlisten();
    shape.change_store(&store, 8, false).expect("change");

    assert_eq!(
        *order.borrow(),
        vec!["body 0", "body 7", "listener 7", "body 8"]
    );
}

/// Children kept in a cache keep their node when the parent re-runs, even
/// when they move.
#[test]
fn cached_children_survive_parent_rerun() {
    let reverse: Event<bool> = Event::new();
    let (attached, detached) = (counter(), counter());

    let leaf = {
        let (attached, detached) = (attached.clone(), detached.clone());
        Unit::new(move |cx, _: &u32| {
            let attached = attached.clone();
            let detached = detached.clone();
            cx.use_attach(move || attached.set(attached.get() + 1))?;
            cx.use_detach(move || detached.set(detached.get() + 1))?;
            Ok(())
        })
    };
    let cache: Rc<Cache<u32, Element>> = Rc::new(Cache::new());

    let list = {
        let cache = cache.clone();
        Unit::new(move |cx, reverse: &Event<bool>| {
            let mut keys = vec![1u32, 2, 3];
            if cx.use_depend(reverse)?.payload.unwrap_or(false) {
                keys.reverse();
            }
            Ok(keys
                .into_iter()
                .map(|key| cache.take(key, || leaf.call(key)))
                .collect::<Vec<_>>())
        })
    };

    let shape = Shape::new();
    shape.attach_element(&list.call(reverse)).expect("attach");
    let before: Vec<_> = shape.tree().borrow().nodes().iter().map(|n| n.borrow().id()).collect();

    shape.call_event(&reverse, true).expect("reverse");
    let after: Vec<_> = shape.tree().borrow().nodes().iter().map(|n| n.borrow().id()).collect();

    assert_eq!(after, vec![before[0], before[3], before[2], before[1]]);
    assert_eq!((attached.get(), detached.get()), (3, 0));
}

/// A re-run that drops a parent detaches its whole subtree.
#[test]
fn dropping_a_parent_detaches_its_subtree() {
    let hide: Event<()> = Event::new();
    let detached = Rc::new(RefCell::new(Vec::new()));

    let leaf = {
        let detached = detached.clone();
        Unit::new(move |cx, name: &&'static str| {
            let detached = detached.clone();
            let name = *name;
            cx.use_detach(move || detached.borrow_mut().push(name))?;
            Ok(())
        })
    };
    let group = Unit::new(|_, children: &Vec<Element>| Ok(children.clone()));
    let inner = group.call(vec![leaf.call("x"), leaf.call("y")]);
    let sibling = leaf.call("z");

    let root = Unit::new(move |cx, (hide, inner, sibling): &(Event<()>, Element, Element)| {
        if cx.use_depend(hide)?.called {
            Ok(vec![sibling.clone()])
        } else {
            Ok(vec![inner.clone(), sibling.clone()])
        }
    });

    let shape = Shape::new();
    shape
        .attach_element(&root.call((hide, inner, sibling)))
        .expect("attach");
    assert_eq!(shape.tree().borrow().len(), 5);

    shape.call_event(&hide, ()).expect("hide");

    assert_eq!(*detached.borrow(), vec!["x", "y"]);
    assert_eq!(shape.tree().borrow().len(), 2);
}

/// Store values survive a serialize / set_raw_data round trip.
#[test]
fn persistence_round_trip() {
    let theme = Store::with_options("light".to_string(), StoreOptions::json("integration/theme"));
    let volume = Store::with_options(5u8, StoreOptions::json("integration/volume"));

    let source = Shape::new();
    source.change_store(&theme, "dark".to_string(), false).expect("theme");
    source.change_store(&volume, 9, false).expect("volume");

    let target = Shape::new();
    target.set_raw_data(source.serialize());

    assert_eq!(target.value(&theme), "dark");
    assert_eq!(target.value(&volume), 9);
    assert_eq!(target.serialize(), source.serialize());
}

/// Hooks report misuse instead of silently doing nothing.
#[test]
fn hooks_outside_a_body_fail() {
    let store = Store::new(0);
    let event: Event<()> = Event::new();
    let shape = Shape::new();
    let cx = shape.context();

    assert!(matches!(cx.use_value(&store), Err(Error::NoActiveContext)));
    assert!(matches!(cx.use_depend(&event), Err(Error::NoActiveContext)));

    // Inside a listener the shape is busy but no node is running.
    let seen = Rc::new(RefCell::new(None));
    let seen_listener = seen.clone();
    let listener_cx = shape.context();
    shape
        .listen(&event, move |_: &()| {
            *seen_listener.borrow_mut() = Some(listener_cx.use_depend(&event).map(|_| ()));
        })
        .expect("listen");
    shape.call_event(&event, ()).expect("dispatch");

    assert!(matches!(
        seen.borrow_mut().take(),
        Some(Err(Error::NoCurrentNode))
    ));
}

/// A body error propagates and the shape keeps its previous tree.
#[test]
fn body_error_keeps_previous_tree() {
    let fail: Event<bool> = Event::new();
    let unit = Unit::new(|cx, fail: &Event<bool>| {
        if cx.use_depend(fail)?.payload.unwrap_or(false) {
            return Err(Error::NoCurrentNode);
        }
        Ok(())
    });

    let shape = Shape::new();
    shape.attach_element(&unit.call(fail)).expect("attach");
    let before = shape.tree();

    assert!(shape.call_event(&fail, true).is_err());
    assert!(Rc::ptr_eq(&before, &shape.tree()));
    assert!(!shape.is_busy());

    shape.call_event(&fail, false).expect("recovers");
}

/// A child failing during its parent's re-run leaves the parent, its
/// siblings and their coordinates as they were.
#[test]
fn failing_child_leaves_siblings_intact() {
    let tick: Event<u32> = Event::new();
    let (attached, detached) = (counter(), counter());

    let failing = Unit::new(|cx, tick: &Event<u32>| {
        if cx.use_payload(tick)?.payload == Some(1) {
            return Err(Error::NoCurrentNode);
        }
        Ok(())
    });
    let watched = {
        let (attached, detached) = (attached.clone(), detached.clone());
        Unit::new(move |cx, _: &()| {
            let attached = attached.clone();
            let detached = detached.clone();
            cx.use_attach(move || attached.set(attached.get() + 1))?;
            cx.use_detach(move || detached.set(detached.get() + 1))?;
            Ok(())
        })
    };
    let parent = Unit::new(|cx, (tick, children): &(Event<u32>, Vec<Element>)| {
        cx.use_depend(tick)?;
        Ok(children.clone())
    });

    let shape = Shape::new();
    shape
        .attach_element(&parent.call((tick, vec![failing.call(tick), watched.call(())])))
        .expect("attach");

    assert!(shape.call_event(&tick, 1).is_err());
    shape.call_event(&tick, 2).expect("recovers");

    let tree = shape.tree();
    let coordinates: Vec<_> = tree
        .borrow()
        .nodes()
        .iter()
        .map(|node| {
            let c = node.borrow().coordinates();
            (c.from, c.to, c.level)
        })
        .collect();
    assert_eq!(coordinates, vec![(0, 2, 0), (1, 1, 1), (2, 2, 1)]);
    assert_eq!((attached.get(), detached.get()), (1, 0));
}

/// A body that fails before declaring its dependency keeps reacting.
#[test]
fn body_error_before_depend_keeps_the_dependency() {
    let tick: Event<u32> = Event::new();
    let runs = counter();

    let unit = {
        let runs = runs.clone();
        Unit::new(move |cx, tick: &Event<u32>| {
            runs.set(runs.get() + 1);
            if cx.use_payload(tick)?.payload == Some(1) {
                return Err(Error::NoCurrentNode);
            }
            cx.use_depend(tick)?;
            Ok(())
        })
    };

    let shape = Shape::new();
    shape.attach_element(&unit.call(tick)).expect("attach");

    assert!(shape.call_event(&tick, 1).is_err());
    shape.call_event(&tick, 2).expect("recovers");

    assert_eq!(runs.get(), 3);
}

/// An element attached from inside a body becomes a root once the
/// dispatch in progress is applied.
#[test]
fn attach_from_a_body_is_queued() {
    let go: Event<()> = Event::new();
    let attached = counter();

    let leaf = {
        let attached = attached.clone();
        Unit::new(move |cx, _: &()| {
            let attached = attached.clone();
            cx.use_attach(move || attached.set(attached.get() + 1))?;
            Ok(())
        })
    };
    let spawner = Unit::new(move |cx, go: &Event<()>| {
        if cx.use_depend(go)?.called {
            let shape = Shape::resolve(cx.shape_id())?;
            shape.attach_element(&leaf.call(()))?;
            // Queued, not applied yet.
            assert_eq!(shape.pending_actions(), 1);
        }
        Ok(())
    });

    let shape = Shape::new();
    shape.attach_element(&spawner.call(go)).expect("attach");
    shape.call_event(&go, ()).expect("go");

    assert_eq!(shape.tree().borrow().len(), 2);
    assert_eq!(attached.get(), 1);
    assert_eq!(shape.pending_actions(), 0);
}

/// A runaway dispatch loop is cut off by the configured action limit.
#[test]
fn action_limit_stops_runaway_loops() {
    let ping: Event<u32> = Event::new();
    let unit = Unit::new(|cx, ping: &Event<u32>| {
        let (meta, dispatch) = cx.use_event(ping, DependFilter::Always)?;
        if let (true, Some(n)) = (meta.called, meta.payload) {
            dispatch.dispatch(n + 1)?;
        }
        Ok(())
    });

    let shape = Shape::with_config(ShapeConfig::default().with_name("loop").with_action_limit(10));
    shape.attach_element(&unit.call(ping)).expect("attach");

    assert!(matches!(
        shape.call_event(&ping, 0),
        Err(Error::ActionLimit { limit: 10 })
    ));
    assert_eq!(shape.pending_actions(), 1);
    assert_eq!(shape.payload(&ping), Some(9));
}

/// `wait` resolves once every registered future, including ones registered
/// while waiting, has completed.
#[tokio::test(flavor = "current_thread")]
async fn wait_reaches_a_fixpoint() {
    let loaded = Store::new(Vec::<u32>::new());
    let shape = Shape::new();

    let loader = Unit::new(move |cx, loaded: &Store<Vec<u32>>| {
        let (items, set) = cx.use_store(loaded, true)?;
        if items.len() < 3 {
            let next = items.len() as u32;
            let _ = cx.use_promise(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                let mut items = items;
                items.push(next);
                // The body re-runs from this dispatch and registers the next
                // future before this one completes.
                set.dispatch(items).map_err(|error| error.to_string())
            })?;
        }
        Ok(())
    });

    shape.attach_element(&loader.call(loaded.clone())).expect("attach");
    shape.wait().await;

    assert_eq!(shape.value(&loaded), vec![0, 1, 2]);
}
