//! Units and Elements
//!
//! A [`Unit`] is a factory: calling it with an argument value produces an
//! [`Element`], a lazily evaluated computation instance. An element is a
//! plain data record (the unit's shared body plus the captured argument),
//! compared by identity only. Calling a unit twice with equal arguments
//! yields two distinct elements; callers that want a stable identity across
//! re-execution keep the element around, typically in a
//! [`Cache`](super::Cache).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::context::Context;
use super::registry::{Registration, TokenId, TokenKind};
use super::LIFECYCLE;
use crate::error::Result;

type Body<A> = dyn Fn(&Context, &A) -> Result<Children>;

/// What a unit body returns.
///
/// `None` entries in a list are position-stable holes: they are kept while
/// normalizing but never become nodes.
#[derive(Debug, Clone, Default)]
pub enum Children {
    #[default]
    Empty,
    One(Element),
    Many(Vec<Option<Element>>),
}

impl Children {
    /// Normalize into a child list.
    pub fn into_list(self) -> Vec<Option<Element>> {
        match self {
            Children::Empty => Vec::new(),
            Children::One(element) => vec![Some(element)],
            Children::Many(children) => children,
        }
    }
}

impl From<()> for Children {
    fn from(_: ()) -> Self {
        Children::Empty
    }
}

impl From<Element> for Children {
    fn from(element: Element) -> Self {
        Children::One(element)
    }
}

impl From<Option<Element>> for Children {
    fn from(element: Option<Element>) -> Self {
        element.map_or(Children::Empty, Children::One)
    }
}

impl From<Vec<Element>> for Children {
    fn from(elements: Vec<Element>) -> Self {
        Children::Many(elements.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<Element>>> for Children {
    fn from(elements: Vec<Option<Element>>) -> Self {
        Children::Many(elements)
    }
}

/// Element factory bound to one body function.
pub struct Unit<A> {
    inner: Rc<UnitInner<A>>,
}

struct UnitInner<A> {
    registration: Registration,
    body: Rc<Body<A>>,
}

impl<A: 'static> Unit<A> {
    /// Create a unit from its body.
    ///
    /// The body receives the hook [`Context`] and the argument the element
    /// was created with.
    pub fn new<F, C>(body: F) -> Self
    where
        F: Fn(&Context, &A) -> Result<C> + 'static,
        C: Into<Children>,
    {
        let registration = Registration::new(TokenKind::Unit);
        tracing::trace!(target: LIFECYCLE, unit = %registration.id(), "unit created");

        let body: Rc<Body<A>> = Rc::new(move |cx: &Context, args: &A| -> Result<Children> {
            body(cx, args).map(Into::into)
        });

        Self {
            inner: Rc::new(UnitInner { registration, body }),
        }
    }

    /// Create a fresh element for `args`.
    pub fn call(&self, args: A) -> Element {
        Element::bind(
            self.id(),
            Bound {
                body: Rc::clone(&self.inner.body),
                args,
            },
        )
    }
}

impl<A> Unit<A> {
    /// Get the unit's token id.
    pub fn id(&self) -> TokenId {
        self.inner.registration.id()
    }
}

impl<A> Clone for Unit<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Unit<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unit").field(&self.id()).finish()
    }
}

trait Invoke {
    fn invoke(&self, cx: &Context) -> Result<Children>;
}

struct Bound<A> {
    body: Rc<Body<A>>,
    args: A,
}

impl<A> Invoke for Bound<A> {
    fn invoke(&self, cx: &Context) -> Result<Children> {
        (self.body)(cx, &self.args)
    }
}

/// Opaque handle to one lazy computation instance.
///
/// Cloning an element keeps its identity; this is the reconciliation key.
#[derive(Clone)]
pub struct Element {
    inner: Rc<ElementInner>,
}

struct ElementInner {
    registration: Registration,
    unit: TokenId,
    body: Box<dyn Invoke>,
}

impl Element {
    fn bind<A: 'static>(unit: TokenId, bound: Bound<A>) -> Self {
        let registration = Registration::new(TokenKind::Element);
        tracing::trace!(
            target: LIFECYCLE,
            unit = %unit,
            element = %registration.id(),
            "element created"
        );

        Self {
            inner: Rc::new(ElementInner {
                registration,
                unit,
                body: Box::new(bound),
            }),
        }
    }

    /// Get the element's token id.
    pub fn id(&self) -> TokenId {
        self.inner.registration.id()
    }

    /// The unit this element was created by.
    pub fn unit(&self) -> TokenId {
        self.inner.unit
    }

    /// Run the body and normalize its result.
    pub(crate) fn run(&self, cx: &Context) -> Result<Vec<Option<Element>>> {
        self.inner.body.invoke(cx).map(Children::into_list)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id())
            .field("unit", &self.inner.unit)
            .finish()
    }
}
