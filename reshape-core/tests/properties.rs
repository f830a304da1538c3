//! Property tests for tree reconciliation.
//!
//! Random element trees are attached, pruned by a dispatch and restored by
//! another. After every step the flattened coordinates must describe the
//! node hierarchy, and the diff must partition both trees exactly.

use std::collections::HashSet;

use proptest::prelude::*;
use reshape_core::graph::{Diff, NodeId, NodeRef, Tree};
use reshape_core::{Element, Event, Shape, Unit};

#[derive(Debug, Clone)]
struct Layout {
    depends: bool,
    keep: bool,
    children: Vec<Layout>,
}

fn layout() -> impl Strategy<Value = Layout> {
    let leaf = (any::<bool>(), any::<bool>()).prop_map(|(depends, keep)| Layout {
        depends,
        keep,
        children: Vec::new(),
    });

    leaf.prop_recursive(4, 48, 4, |inner| {
        (any::<bool>(), any::<bool>(), prop::collection::vec(inner, 0..4)).prop_map(
            |(depends, keep, children)| Layout {
                depends,
                keep,
                children,
            },
        )
    })
}

type Args = (Event<bool>, bool, Vec<(bool, Element)>);

/// A body that drops its non-kept children while the event's payload is
/// `true`.
fn pruning_unit() -> Unit<Args> {
    Unit::new(|cx, (event, depends, children): &Args| {
        let meta = if *depends {
            cx.use_depend(event)?
        } else {
            cx.use_payload(event)?
        };
        let prune = meta.payload.unwrap_or(false);

        Ok(children
            .iter()
            .filter(|(keep, _)| !prune || *keep)
            .map(|(_, element)| element.clone())
            .collect::<Vec<_>>())
    })
}

fn build(unit: &Unit<Args>, event: Event<bool>, layout: &Layout) -> Element {
    let children = layout
        .children
        .iter()
        .map(|child| (child.keep, build(unit, event, child)))
        .collect();

    unit.call((event, layout.depends, children))
}

fn check_coordinates(tree: &Tree) -> Result<(), TestCaseError> {
    let len = tree.len();

    for (index, node) in tree.nodes().iter().enumerate() {
        let node = node.borrow();
        let parent = node.coordinates();

        prop_assert_eq!(parent.from, index);
        prop_assert!(parent.from <= parent.to && parent.to < len);

        let mut previous_to = None;
        for child in node.children() {
            let child = child.borrow().coordinates();

            prop_assert!(child.from > parent.from && child.to <= parent.to);
            prop_assert_eq!(child.level, parent.level + 1);
            if let Some(previous_to) = previous_to {
                prop_assert!(child.from > previous_to);
            }
            previous_to = Some(child.to);
        }
    }

    Ok(())
}

fn ids(nodes: &[NodeRef]) -> HashSet<NodeId> {
    nodes.iter().map(|node| node.borrow().id()).collect()
}

fn check_diff(prev: &Tree, next: &Tree) -> Result<Diff, TestCaseError> {
    let diff = Diff::between(prev, next);
    let skipped = ids(&diff.skipped);
    let attached = ids(&diff.attached);
    let detached = ids(&diff.detached);

    prop_assert!(skipped.is_disjoint(&attached));
    prop_assert!(skipped.is_disjoint(&detached));
    prop_assert!(attached.is_disjoint(&detached));
    prop_assert_eq!(&skipped | &attached, ids(next.nodes()));
    prop_assert_eq!(&skipped | &detached, ids(prev.nodes()));

    Ok(diff)
}

proptest! {
    #[test]
    fn attach_assigns_consistent_coordinates(layout in layout()) {
        let unit = pruning_unit();
        let event: Event<bool> = Event::new();
        let shape = Shape::new();

        shape.attach_element(&build(&unit, event, &layout)).expect("attach");

        check_coordinates(&shape.tree().borrow())?;
    }

    #[test]
    fn rebuilds_keep_coordinates_and_partition_nodes(layout in layout()) {
        let unit = pruning_unit();
        let event: Event<bool> = Event::new();
        let shape = Shape::new();
        shape.attach_element(&build(&unit, event, &layout)).expect("attach");
        let initial = shape.tree();

        shape.call_event(&event, true).expect("prune");
        let pruned = shape.tree();
        check_coordinates(&pruned.borrow())?;
        let diff = check_diff(&initial.borrow(), &pruned.borrow())?;
        // Pruning reuses every surviving node.
        prop_assert!(diff.attached.is_empty());

        shape.call_event(&event, false).expect("restore");
        let restored = shape.tree();
        check_coordinates(&restored.borrow())?;
        let diff = check_diff(&pruned.borrow(), &restored.borrow())?;
        prop_assert!(diff.detached.is_empty());
    }
}
