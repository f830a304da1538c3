//! Tree Nodes
//!
//! A node is one attached element instance. It records the dependencies the
//! element's body declared on its last run, the lifecycle callbacks it
//! registered, the child nodes it produced (keyed by child element so they
//! can be reused on the next run), its position in the flattened tree, and a
//! private scope for `use_scope`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::reactive::{Element, Scope, ScopeRef, TokenId};

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a node.
///
/// A node that survives a rebuild is shared between the old and the new
/// tree.
pub type NodeRef = Rc<RefCell<Node>>;

pub(crate) type Callback = Rc<dyn Fn()>;

/// Position of a node in a tree's flattened preorder listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coordinates {
    /// Index of the node itself.
    pub from: usize,
    /// Index of the node's last descendant, or `from` for a leaf.
    pub to: usize,
    /// Depth; roots are at level 0.
    pub level: usize,
}

/// When a dependency matches a dispatched event.
#[derive(Clone)]
pub(crate) enum Filter {
    Always,
    Never,
    When(Rc<dyn Fn() -> bool>),
}

/// A node's registered interest in one event, evaluated against the scope
/// the dependency was declared in.
#[derive(Clone)]
pub(crate) struct Depend {
    event: TokenId,
    scope: ScopeRef,
    filter: Filter,
}

impl Depend {
    pub(crate) fn new(event: TokenId, scope: ScopeRef, filter: Filter) -> Self {
        Self {
            event,
            scope,
            filter,
        }
    }

    pub(crate) fn event(&self) -> TokenId {
        self.event
    }

    /// Whether dispatching `event` must re-run the owning node.
    ///
    /// Only a dispatch running in the dependency's own scope can match.
    pub(crate) fn matches(&self, event: TokenId) -> bool {
        if self.event != event {
            return false;
        }
        if self.scope.borrow().current_event() != Some(event) {
            return false;
        }

        match &self.filter {
            Filter::Always => true,
            Filter::Never => false,
            Filter::When(filter) => filter(),
        }
    }
}

/// Lifecycle callbacks registered by a node's body.
#[derive(Default)]
pub(crate) struct Effects {
    pub(crate) attached: Vec<Callback>,
    pub(crate) detached: Vec<Callback>,
}

/// Everything one run of a node's body declared.
pub(crate) struct Run {
    depends: SmallVec<[Depend; 2]>,
    effects: Effects,
    pub(crate) children: IndexMap<TokenId, NodeRef>,
}

/// A live, attached element instance.
pub struct Node {
    id: NodeId,
    element: Element,
    pub(crate) coordinates: Coordinates,
    pub(crate) depends: SmallVec<[Depend; 2]>,
    pub(crate) effects: Effects,
    pub(crate) children: IndexMap<TokenId, NodeRef>,
    scope: ScopeRef,
}

impl Node {
    /// Create an unattached node for `element`.
    pub fn new(element: Element) -> Self {
        Self {
            id: NodeId::new(),
            element,
            coordinates: Coordinates::default(),
            depends: SmallVec::new(),
            effects: Effects::default(),
            children: IndexMap::new(),
            scope: Scope::shared(),
        }
    }

    /// Create an unattached node behind a shared handle.
    pub fn shared(element: Element) -> NodeRef {
        Rc::new(RefCell::new(Self::new(element)))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    /// Child nodes in the order the body returned them.
    pub fn children(&self) -> impl Iterator<Item = &NodeRef> {
        self.children.values()
    }

    /// Number of dependencies declared on the last run.
    pub fn dependency_count(&self) -> usize {
        self.depends.len()
    }

    /// Events this node depends on, in declaration order.
    pub fn dependencies(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.depends.iter().map(Depend::event)
    }

    /// The node's private scope, used by `use_scope`.
    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    /// Take what the previous run declared, leaving the node blank for the
    /// next run.
    pub(crate) fn take_run(&mut self) -> Run {
        Run {
            depends: std::mem::take(&mut self.depends),
            effects: std::mem::take(&mut self.effects),
            children: std::mem::take(&mut self.children),
        }
    }

    /// Put back a run taken with [`take_run`](Self::take_run).
    pub(crate) fn restore_run(&mut self, run: Run) {
        self.depends = run.depends;
        self.effects = run.effects;
        self.children = run.children;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("element", &self.element.id())
            .field("coordinates", &self.coordinates)
            .field("dependency_count", &self.depends.len())
            .field("children", &self.children.len())
            .finish()
    }
}
