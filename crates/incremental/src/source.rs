//! Mutable base relations.

use crate::dataflow::{DifferenceStream, Hydrate, Listener, Request};
use crate::error::{Error, Result};
use crate::materialite::{Materialite, SourceInternal};
use crate::multiset::{Entry, Multiset};
use crate::types::{NodeId, Version};
use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt;
use std::rc::{Rc, Weak};

/// Total order over the rows of a relation.
pub type Comparator<T> = Rc<dyn Fn(&T, &T) -> Ordering>;

struct Staged<T> {
    diff: Vec<Entry<T>>,
    snapshot: Vec<T>,
    requesters: Vec<Rc<dyn Listener<T>>>,
}

struct SourceState<T> {
    committed: Vec<T>,
    pending: Vec<Entry<T>>,
    pulls: Vec<Rc<dyn Listener<T>>>,
    staged: Option<Staged<T>>,
}

struct SourceInner<T> {
    id: NodeId,
    materialite: Materialite,
    comparator: Comparator<T>,
    stream: DifferenceStream<T>,
    state: RefCell<SourceState<T>>,
    this: Weak<SourceInner<T>>,
}

/// A comparator-ordered set of rows and the only entry point for writes.
///
/// Rows that compare equal are the same row: adding one replaces the
/// committed row, deleting one removes it. Writes are buffered until the
/// enclosing transaction commits, or committed on the spot when no
/// transaction is open.
pub struct Source<T> {
    inner: Rc<SourceInner<T>>,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Source<T> {
    pub(crate) fn new(materialite: Materialite, comparator: Comparator<T>) -> Self {
        let id = materialite.next_node_id();
        let stream = materialite.new_stream();
        let inner = Rc::new_cyclic(|this: &Weak<SourceInner<T>>| {
            let hydrate: Weak<dyn Hydrate<T>> = this.clone();
            stream.set_source(hydrate);
            SourceInner {
                id,
                materialite,
                comparator,
                stream,
                state: RefCell::new(SourceState {
                    committed: Vec::new(),
                    pending: Vec::new(),
                    pulls: Vec::new(),
                    staged: None,
                }),
                this: this.clone(),
            }
        });
        Self { inner }
    }

    /// Inserts `value`, replacing a committed row that compares equal.
    pub fn add(&self, value: T) -> Result<()> {
        self.enqueue(Entry::insert(value))
    }

    /// Removes the committed row comparing equal to `value`, if any.
    pub fn delete(&self, value: T) -> Result<()> {
        self.enqueue(Entry::retract(value))
    }

    /// Returns the stream carrying this source's diffs.
    pub fn stream(&self) -> DifferenceStream<T> {
        self.inner.stream.clone()
    }

    /// Returns the coordinator owning this source.
    pub fn materialite(&self) -> &Materialite {
        &self.inner.materialite
    }

    /// Returns the committed rows in comparator order.
    pub fn value(&self) -> Vec<T> {
        self.inner.state.borrow().committed.clone()
    }

    /// Looks up the committed row comparing equal to `key`.
    pub fn get(&self, key: &T) -> Option<T> {
        let state = self.inner.state.borrow();
        state
            .committed
            .binary_search_by(|row| (self.inner.comparator)(row, key))
            .ok()
            .map(|i| state.committed[i].clone())
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().committed.is_empty()
    }

    fn enqueue(&self, entry: Entry<T>) -> Result<()> {
        self.inner.state.borrow_mut().pending.push(entry);
        let dirty: Rc<dyn SourceInternal> = Rc::clone(&self.inner) as Rc<dyn SourceInternal>;
        self.inner.materialite.add_dirty_source(dirty)
    }
}

impl<T: Clone + 'static> SourceInternal for SourceInner<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn on_commit_enqueue(&self, _version: Version) {
        let mut state = self.state.borrow_mut();
        let pending = core::mem::take(&mut state.pending);
        let requesters = core::mem::take(&mut state.pulls);
        let snapshot = if requesters.is_empty() {
            Vec::new()
        } else {
            state.committed.clone()
        };

        let mut diff = Vec::with_capacity(pending.len());
        for entry in pending {
            let pos = state
                .committed
                .binary_search_by(|row| (self.comparator)(row, &entry.value));
            match (entry.is_insert(), pos) {
                (true, Ok(i)) => {
                    let old = core::mem::replace(&mut state.committed[i], entry.value.clone());
                    diff.push(Entry::retract(old));
                    diff.push(Entry::insert(entry.value));
                }
                (true, Err(i)) => {
                    state.committed.insert(i, entry.value.clone());
                    diff.push(Entry::insert(entry.value));
                }
                (false, Ok(i)) => {
                    let old = state.committed.remove(i);
                    diff.push(Entry::retract(old));
                }
                (false, Err(_)) => {}
            }
        }

        state.staged = Some(Staged {
            diff,
            snapshot,
            requesters,
        });
    }

    fn on_commit(&self, version: Version) -> Result<()> {
        let Some(staged) = self.state.borrow_mut().staged.take() else {
            return Ok(());
        };

        let mut errors = Vec::new();
        if !staged.requesters.is_empty() {
            let snapshot: Multiset<T> = staged.snapshot.into_iter().map(Entry::insert).collect();
            for requester in &staged.requesters {
                if let Err(e) = requester.new_difference(version, &snapshot) {
                    errors.push(e);
                }
            }
        }
        if !staged.diff.is_empty() {
            if let Err(e) = self.stream.new_data(version, Multiset::new(staged.diff)) {
                errors.push(e);
            }
        }
        Error::from_many(errors)
    }

    fn on_rollback(&self) {
        let mut state = self.state.borrow_mut();
        state.pending.clear();
        state.pulls.clear();
        state.staged = None;
    }
}

impl<T: Clone + 'static> Hydrate<T> for SourceInner<T> {
    /// Replays the committed rows to `requester`.
    ///
    /// Outside a transaction the rows are sent right away, stamped with the
    /// last committed version. Inside one the reply is queued and sent by the
    /// commit, ahead of the diff, so the requester sees every row once.
    fn request_hydration(&self, request: &Request, requester: Rc<dyn Listener<T>>) -> Result<()> {
        if !self.materialite.in_transaction() {
            let snapshot: Multiset<T> = {
                let state = self.state.borrow();
                state.committed.iter().cloned().map(Entry::insert).collect()
            };
            let version = self.materialite.version();
            tracing::debug!(source = self.id, request = request.id(), version, "hydrated");
            return requester.new_difference(version, &snapshot);
        }

        let Some(this) = self.this.upgrade() else {
            return Ok(());
        };
        {
            let mut state = self.state.borrow_mut();
            if !state.pulls.iter().any(|l| Rc::ptr_eq(l, &requester)) {
                state.pulls.push(requester);
            }
        }
        tracing::debug!(source = self.id, request = request.id(), "hydration queued");
        self.materialite.add_dirty_source(this)
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Source")
            .field("id", &self.inner.id)
            .field("len", &state.committed.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}
