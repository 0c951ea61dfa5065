//! Materialized views.
//!
//! A view is a terminal of the graph that folds every diff it receives into
//! an ordered result set and tells its subscribers about the new result once
//! per commit, after the whole graph has propagated.

use crate::dataflow::{DifferenceStream, Listener, Request};
use crate::error::Result;
use crate::materialite::{CommitNode, Materialite};
use crate::multiset::{Entry, Multiplicity, Multiset};
use crate::operators::Attachment;
use crate::source::Comparator;
use crate::subscription::{SubscriptionId, SubscriptionManager};
use crate::types::{NodeId, Version};
use core::cell::{Cell, RefCell};
use core::cmp::Ordering;
use core::fmt;
use std::rc::Rc;

struct ViewState<T> {
    rows: Vec<(T, Multiplicity)>,
    version: Version,
    pending: Vec<Entry<T>>,
}

struct ViewInner<T> {
    id: NodeId,
    materialite: Materialite,
    comparator: Comparator<T>,
    state: RefCell<ViewState<T>>,
    subscriptions: RefCell<SubscriptionManager<T>>,
}

impl<T: Clone + PartialEq + 'static> ViewInner<T> {
    fn position(&self, rows: &[(T, Multiplicity)], value: &T) -> core::result::Result<usize, usize> {
        rows.binary_search_by(|(row, _)| (self.comparator)(row, value))
    }

    /// Folds `pending` into `rows` and reports whether any visible row
    /// changed.
    ///
    /// Entries are grouped by row so a retraction followed by an equal
    /// insert leaves the result unchanged.
    fn apply(&self, rows: &mut Vec<(T, Multiplicity)>, mut pending: Vec<Entry<T>>) -> bool {
        pending.sort_by(|a, b| (self.comparator)(&a.value, &b.value));

        let mut changed = false;
        let mut entries = pending.into_iter().peekable();
        while let Some(first) = entries.next() {
            let key = first.value.clone();
            let before = self.position(rows, &key).ok().map(|i| rows[i].0.clone());

            let mut group = vec![first];
            while let Some(next) =
                entries.next_if(|e| (self.comparator)(&e.value, &key) == Ordering::Equal)
            {
                group.push(next);
            }
            for entry in group {
                match self.position(rows, &entry.value) {
                    Ok(i) => {
                        let slot = &mut rows[i];
                        slot.1 += entry.multiplicity;
                        if entry.multiplicity > 0 {
                            slot.0 = entry.value;
                        }
                        if slot.1 <= 0 {
                            rows.remove(i);
                        }
                    }
                    Err(i) => {
                        if entry.is_insert() {
                            rows.insert(i, (entry.value, entry.multiplicity));
                        }
                    }
                }
            }
            let after = self.position(rows, &key).ok().map(|i| &rows[i].0);
            changed |= before.as_ref() != after;
        }
        changed
    }
}

impl<T: Clone + PartialEq + 'static> CommitNode for ViewInner<T> {
    fn on_commit(&self, version: Version) -> Result<()> {
        let snapshot = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            state.version = version;
            let pending = core::mem::take(&mut state.pending);
            if !self.apply(&mut state.rows, pending) {
                return Ok(());
            }
            state.rows.iter().map(|(row, _)| row.clone()).collect::<Vec<T>>()
        };
        let callbacks = self.subscriptions.borrow().callbacks();
        tracing::debug!(
            view = self.id,
            version,
            rows = snapshot.len(),
            subscribers = callbacks.len(),
            "view changed"
        );
        for callback in callbacks {
            callback(&snapshot);
        }
        Ok(())
    }

    fn on_rollback(&self) {
        self.state.borrow_mut().pending.clear();
    }
}

/// An incrementally maintained, comparator-ordered query result.
///
/// Rows that compare equal are one row: its multiplicity is the net of
/// every diff received for it and its value is the latest inserted one. A
/// row is removed once its multiplicity drops to zero. Dropping the view
/// detaches it from the graph.
pub struct MaterializedView<T: 'static> {
    inner: Rc<ViewInner<T>>,
    attachment: Attachment<T>,
    hydrated: Cell<bool>,
}

impl<T: Clone + PartialEq + 'static> DifferenceStream<T> {
    /// Materializes this stream into a view ordered by `comparator`.
    ///
    /// Received diffs are folded in once the commit that carries them has
    /// propagated; subscribers are told only when the visible rows differ.
    #[must_use]
    pub fn materialize<C>(&self, comparator: C) -> MaterializedView<T>
    where
        C: Fn(&T, &T) -> Ordering + 'static,
    {
        let materialite = self.materialite().clone();
        let inner = Rc::new(ViewInner {
            id: materialite.next_node_id(),
            materialite,
            comparator: Rc::new(comparator),
            state: RefCell::new(ViewState {
                rows: Vec::new(),
                version: 0,
                pending: Vec::new(),
            }),
            subscriptions: RefCell::new(SubscriptionManager::new()),
        });

        let view = Rc::clone(&inner);
        let listener: Rc<dyn Listener<T>> =
            Rc::new(move |_: Version, data: &Multiset<T>| -> Result<()> {
                view.state
                    .borrow_mut()
                    .pending
                    .extend(data.iter().filter(|e| !e.is_noop()));
                view.materialite
                    .add_dirty_node(view.id, Rc::clone(&view) as Rc<dyn CommitNode>);
                Ok(())
            });

        MaterializedView {
            inner,
            attachment: Attachment::new(self, listener),
            hydrated: Cell::new(false),
        }
    }
}

impl<T: Clone + 'static> MaterializedView<T> {
    /// Asks the sources feeding this view to replay their contents.
    ///
    /// Only the first call sends a request. Outside a transaction the rows
    /// are loaded before this returns and the version does not move; inside
    /// one they arrive when it commits.
    pub fn hydrate(&self) -> Result<()> {
        if self.hydrated.replace(true) {
            return Ok(());
        }
        self.attachment.pull(&Request::pull())?;
        self.inner.materialite.flush_nodes()
    }

    /// Returns true once [`hydrate`](Self::hydrate) has been called.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated.get()
    }

    /// Returns the current rows in comparator order.
    pub fn value(&self) -> Vec<T> {
        self.inner
            .state
            .borrow()
            .rows
            .iter()
            .map(|(row, _)| row.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().rows.is_empty()
    }

    /// Returns the last committed version this view observed.
    pub fn version(&self) -> Version {
        self.inner.state.borrow().version
    }

    /// Returns the stream this view reads from.
    pub fn stream(&self) -> &DifferenceStream<T> {
        self.attachment.input()
    }

    /// Registers `f` to receive the full result after every changing commit.
    pub fn subscribe<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&[T]) + 'static,
    {
        self.inner.subscriptions.borrow_mut().subscribe(f)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscriptions.borrow_mut().unsubscribe(id)
    }

    /// Detaches the view from the graph. Later commits leave it unchanged.
    pub fn destroy(&self) {
        self.attachment.detach();
        self.inner.subscriptions.borrow_mut().clear();
    }
}

impl<T> fmt::Debug for MaterializedView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("MaterializedView")
            .field("id", &self.inner.id)
            .field("rows", &state.rows.len())
            .field("version", &state.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Issue {
        id: i32,
        title: &'static str,
        open: bool,
    }

    fn by_id(a: &Issue, b: &Issue) -> Ordering {
        a.id.cmp(&b.id)
    }

    fn issue(id: i32, title: &'static str, open: bool) -> Issue {
        Issue { id, title, open }
    }

    #[test]
    fn test_view_follows_source() {
        let m = Materialite::new();
        let source = m.new_source(by_id);
        let view = source.stream().filter(|i: &Issue| i.open).materialize(by_id);

        m.tx(|| {
            source.add(issue(2, "b", true))?;
            source.add(issue(1, "a", true))?;
            source.add(issue(3, "c", false))
        })
        .unwrap();
        assert_eq!(view.value(), vec![issue(1, "a", true), issue(2, "b", true)]);
        assert_eq!(view.version(), 1);

        source.add(issue(1, "a", false)).unwrap();
        assert_eq!(view.value(), vec![issue(2, "b", true)]);

        source.add(issue(2, "renamed", true)).unwrap();
        assert_eq!(view.value(), vec![issue(2, "renamed", true)]);
        assert_eq!(view.version(), 3);
    }

    #[test]
    fn test_subscribers_get_full_result_once_per_commit() {
        let m = Materialite::new();
        let source = m.new_source(by_id);
        let view = source.stream().materialize(by_id);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        view.subscribe(move |rows: &[Issue]| {
            sink.borrow_mut()
                .push(rows.iter().map(|i| i.id).collect::<Vec<_>>())
        });

        m.tx(|| {
            source.add(issue(1, "a", true))?;
            source.add(issue(2, "b", true))
        })
        .unwrap();
        source.delete(issue(1, "", true)).unwrap();

        assert_eq!(*seen.borrow(), vec![vec![1, 2], vec![2]]);
    }

    #[test]
    fn test_unchanged_commit_does_not_notify() {
        let m = Materialite::new();
        let source = m.new_source(by_id);
        let view = source
            .stream()
            .filter(|i: &Issue| i.open)
            .materialize(by_id);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        view.subscribe(move |_: &[Issue]| counter.set(counter.get() + 1));

        source.add(issue(1, "closed", false)).unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_rewriting_equal_row_does_not_notify() {
        let m = Materialite::new();
        let source = m.new_source(by_id);
        let view = source.stream().materialize(by_id);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        view.subscribe(move |_: &[Issue]| counter.set(counter.get() + 1));

        source.add(issue(1, "a", true)).unwrap();
        source.add(issue(1, "a", true)).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(view.version(), 2);

        source.add(issue(1, "renamed", true)).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_rollback_discards_buffered_diffs() {
        let m = Materialite::new();
        let input = m.new_stream::<Issue>();
        let view = input.materialize(by_id);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        view.subscribe(move |_: &[Issue]| counter.set(counter.get() + 1));

        let result: Result<()> = m.tx(|| {
            input.new_data(1, Multiset::single(issue(9, "gone", true), 1))?;
            Err(crate::error::Error::invalid_operation("abort"))
        });
        assert!(result.is_err());
        assert!(view.is_empty());

        m.tx(|| input.new_data(1, Multiset::single(issue(1, "a", true), 1)))
            .unwrap();
        assert_eq!(view.value(), vec![issue(1, "a", true)]);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_hydrate_loads_existing_rows() {
        let m = Materialite::new();
        let source = m.new_source(by_id);
        source.add(issue(1, "a", true)).unwrap();
        source.add(issue(2, "b", false)).unwrap();

        let view = source.stream().filter(|i: &Issue| i.open).materialize(by_id);
        assert!(view.is_empty());

        view.hydrate().unwrap();
        assert_eq!(view.value(), vec![issue(1, "a", true)]);
        assert_eq!(m.version(), 2);
        assert_eq!(view.version(), 2);

        // a second hydrate is a no-op
        view.hydrate().unwrap();
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn test_unsubscribe_and_destroy() {
        let m = Materialite::new();
        let source = m.new_source(by_id);
        let view = source.stream().materialize(by_id);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let id = view.subscribe(move |_: &[Issue]| counter.set(counter.get() + 1));

        source.add(issue(1, "a", true)).unwrap();
        assert!(view.unsubscribe(id));
        source.add(issue(2, "b", true)).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(view.len(), 2);

        view.destroy();
        source.add(issue(3, "c", true)).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(source.stream().listener_count(), 0);
    }
}
