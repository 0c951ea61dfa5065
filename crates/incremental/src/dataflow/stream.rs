//! The graph node connecting operators.

use crate::dataflow::message::Request;
use crate::error::{Error, Result};
use crate::materialite::Materialite;
use crate::multiset::Multiset;
use crate::types::Version;
use core::cell::RefCell;
use core::fmt;
use std::rc::{Rc, Weak};

/// Receives the diffs pushed into a stream.
pub trait Listener<T> {
    fn new_difference(&self, version: Version, data: &Multiset<T>) -> Result<()>;
}

impl<T, F> Listener<T> for F
where
    F: Fn(Version, &Multiset<T>) -> Result<()>,
{
    fn new_difference(&self, version: Version, data: &Multiset<T>) -> Result<()> {
        self(version, data)
    }
}

/// A node that consumes input streams and produces one output stream.
pub trait Operator {
    /// Forwards `request` to every input of the operator.
    fn message_upstream(&self, request: &Request) -> Result<()>;

    /// Detaches the operator from its inputs.
    fn destroy(&self);
}

/// Producer side of a root stream: answers pull requests with full contents.
pub(crate) trait Hydrate<T> {
    fn request_hydration(&self, request: &Request, requester: Rc<dyn Listener<T>>) -> Result<()>;
}

enum Upstream<T> {
    Operator(Rc<dyn Operator>),
    Source(Weak<dyn Hydrate<T>>),
}

impl<T> Clone for Upstream<T> {
    fn clone(&self) -> Self {
        match self {
            Upstream::Operator(op) => Upstream::Operator(Rc::clone(op)),
            Upstream::Source(src) => Upstream::Source(Weak::clone(src)),
        }
    }
}

struct StreamInner<T> {
    materialite: Materialite,
    listeners: RefCell<Vec<Rc<dyn Listener<T>>>>,
    upstream: RefCell<Option<Upstream<T>>>,
}

/// A point in the dataflow graph.
///
/// Holds the downstream listeners and, unless it is a bare entry point, the
/// operator or source producing its data. Cloning yields another handle to
/// the same node.
pub struct DifferenceStream<T> {
    inner: Rc<StreamInner<T>>,
}

impl<T> Clone for DifferenceStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> DifferenceStream<T> {
    pub(crate) fn new(materialite: Materialite) -> Self {
        Self {
            inner: Rc::new(StreamInner {
                materialite,
                listeners: RefCell::new(Vec::new()),
                upstream: RefCell::new(None),
            }),
        }
    }

    /// Returns the coordinator this stream reports to.
    #[inline]
    pub fn materialite(&self) -> &Materialite {
        &self.inner.materialite
    }

    /// Registers a listener for future pushes.
    pub fn add_downstream(&self, listener: Rc<dyn Listener<T>>) {
        self.inner.listeners.borrow_mut().push(listener);
    }

    /// Unregisters a listener.
    ///
    /// Returns true if the listener was registered. A push already in
    /// progress still reaches the listener.
    pub fn remove_downstream(&self, listener: &Rc<dyn Listener<T>>) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| !Rc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Pushes `data` to every listener.
    ///
    /// Listeners are snapshotted before dispatch, so they may attach or detach
    /// listeners while being notified. A failing listener does not stop the
    /// others; failures are returned once every listener has run.
    pub fn new_data(&self, version: Version, data: Multiset<T>) -> Result<()> {
        let listeners: Vec<Rc<dyn Listener<T>>> = self.inner.listeners.borrow().clone();
        let mut errors = Vec::new();
        for listener in listeners {
            if let Err(e) = listener.new_difference(version, &data) {
                errors.push(e);
            }
        }
        Error::from_many(errors)
    }

    /// Sends `request` toward the sources feeding this stream.
    ///
    /// A source answers a pull by replaying its contents to `requester`
    /// at the next commit.
    pub fn message_upstream(
        &self,
        request: &Request,
        requester: &Rc<dyn Listener<T>>,
    ) -> Result<()> {
        let upstream = self.inner.upstream.borrow().clone();
        match upstream {
            Some(Upstream::Operator(op)) => op.message_upstream(request),
            Some(Upstream::Source(source)) => match source.upgrade() {
                Some(source) => source.request_hydration(request, Rc::clone(requester)),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    /// Detaches the operator producing this stream from its inputs.
    pub fn destroy(&self) {
        let upstream = self.inner.upstream.borrow_mut().take();
        if let Some(Upstream::Operator(op)) = upstream {
            op.destroy();
        }
    }

    /// Returns true if both handles point to the same node.
    #[inline]
    pub fn ptr_eq(&self, other: &DifferenceStream<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_operator(&self, operator: Rc<dyn Operator>) {
        *self.inner.upstream.borrow_mut() = Some(Upstream::Operator(operator));
    }

    pub(crate) fn set_source(&self, source: Weak<dyn Hydrate<T>>) {
        *self.inner.upstream.borrow_mut() = Some(Upstream::Source(source));
    }

    pub(crate) fn downgrade(&self) -> WeakStream<T> {
        WeakStream(Rc::downgrade(&self.inner))
    }
}

impl<T> fmt::Debug for DifferenceStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DifferenceStream")
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

/// Non-owning handle used by operators to reach their output.
pub(crate) struct WeakStream<T>(Weak<StreamInner<T>>);

impl<T> Clone for WeakStream<T> {
    fn clone(&self) -> Self {
        WeakStream(Weak::clone(&self.0))
    }
}

impl<T> WeakStream<T> {
    pub(crate) fn upgrade(&self) -> Option<DifferenceStream<T>> {
        self.0.upgrade().map(|inner| DifferenceStream { inner })
    }
}
