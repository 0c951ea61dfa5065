//! Transaction coordinator.
//!
//! A `Materialite` owns the version counter and drives commits: it tracks the
//! sources touched by the open transaction and the graph nodes that asked to
//! be called back once propagation for a version has finished.

use crate::dataflow::DifferenceStream;
use crate::error::{Error, Result};
use crate::source::Source;
use crate::types::{NodeId, Version};
use core::cell::{Cell, RefCell};
use core::cmp::Ordering;
use core::fmt;
use hashbrown::HashSet;
use std::rc::Rc;

/// A graph node that buffers what it receives and acts on it once the
/// version has propagated.
pub(crate) trait CommitNode {
    fn on_commit(&self, version: Version) -> Result<()>;

    /// Drops whatever was buffered for the failed transaction.
    fn on_rollback(&self);
}

/// Coordinator-facing side of a source.
pub(crate) trait SourceInternal {
    fn id(&self) -> NodeId;

    /// Folds pending diffs into committed state and stages them for pushing.
    fn on_commit_enqueue(&self, version: Version);

    /// Pushes the staged diffs downstream.
    fn on_commit(&self, version: Version) -> Result<()>;

    /// Drops the pending diffs of the failed transaction.
    fn on_rollback(&self);
}

#[derive(Default)]
struct DirtySet {
    sources: Vec<Rc<dyn SourceInternal>>,
    nodes: Vec<(NodeId, Rc<dyn CommitNode>)>,
    node_ids: HashSet<NodeId>,
}

struct Inner {
    version: Cell<Version>,
    current_tx: Cell<Option<Version>>,
    next_node_id: Cell<NodeId>,
    dirty: RefCell<DirtySet>,
}

/// The transaction coordinator shared by every source and operator of a graph.
///
/// Cloning yields another handle to the same coordinator.
#[derive(Clone)]
pub struct Materialite {
    inner: Rc<Inner>,
}

impl Default for Materialite {
    fn default() -> Self {
        Self::new()
    }
}

impl Materialite {
    /// Creates a coordinator at version 0.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                version: Cell::new(0),
                current_tx: Cell::new(None),
                next_node_id: Cell::new(1),
                dirty: RefCell::new(DirtySet::default()),
            }),
        }
    }

    /// Returns the last committed version.
    #[inline]
    pub fn version(&self) -> Version {
        self.inner.version.get()
    }

    /// Returns true while a transaction is open.
    #[inline]
    pub fn in_transaction(&self) -> bool {
        self.inner.current_tx.get().is_some()
    }

    /// Returns true if both handles point to the same coordinator.
    #[inline]
    pub fn ptr_eq(&self, other: &Materialite) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Creates a source ordered by `comparator`.
    pub fn new_source<T, C>(&self, comparator: C) -> Source<T>
    where
        T: Clone + 'static,
        C: Fn(&T, &T) -> Ordering + 'static,
    {
        Source::new(self.clone(), Rc::new(comparator))
    }

    /// Creates a bare entry point into a graph.
    pub fn new_stream<T: 'static>(&self) -> DifferenceStream<T> {
        DifferenceStream::new(self.clone())
    }

    /// Runs `f` inside a transaction.
    ///
    /// The outermost call opens the transaction at the next version and
    /// commits when `f` returns `Ok`. Nested calls run `f` inline and leave
    /// commit and rollback to the outermost call. If `f` fails, the sources and
    /// nodes touched by the transaction drop what they buffered for it and
    /// the error is returned unchanged. Failures raised while committing do not stop the
    /// commit; they are returned together as `Error::Commit` afterwards.
    pub fn tx<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        if self.in_transaction() {
            return f();
        }
        let version = self.inner.version.get() + 1;
        self.inner.current_tx.set(Some(version));

        match f() {
            Ok(value) => {
                let errors = self.commit();
                if errors.is_empty() {
                    Ok(value)
                } else {
                    Err(Error::Commit { version, errors })
                }
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        let id = self.inner.next_node_id.get();
        self.inner.next_node_id.set(id + 1);
        id
    }

    /// Records a source with pending diffs.
    ///
    /// Outside a transaction this opens and commits one on the spot.
    pub(crate) fn add_dirty_source(&self, source: Rc<dyn SourceInternal>) -> Result<()> {
        {
            let mut dirty = self.inner.dirty.borrow_mut();
            let id = source.id();
            if !dirty.sources.iter().any(|s| s.id() == id) {
                dirty.sources.push(source);
            }
        }

        if self.in_transaction() {
            return Ok(());
        }
        let version = self.inner.version.get() + 1;
        self.inner.current_tx.set(Some(version));
        let errors = self.commit();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Commit { version, errors })
        }
    }

    /// Registers `node` to run once after the current version propagates.
    ///
    /// Registering the same node twice in one commit has no further effect.
    pub(crate) fn add_dirty_node(&self, id: NodeId, node: Rc<dyn CommitNode>) {
        let mut dirty = self.inner.dirty.borrow_mut();
        if dirty.node_ids.insert(id) {
            dirty.nodes.push((id, node));
        }
    }

    /// Runs the dirty nodes at the last committed version.
    ///
    /// Used after a hydration answered outside a transaction: the replayed
    /// rows belong to the current version, so no new one is opened.
    pub(crate) fn flush_nodes(&self) -> Result<()> {
        if self.in_transaction() {
            return Ok(());
        }
        let version = self.version();
        let mut errors = Vec::new();
        let nodes = self.run_nodes(version, &mut errors);
        tracing::debug!(version, nodes, errors = errors.len(), "flushed");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Commit { version, errors })
        }
    }

    fn take_nodes(&self) -> Vec<(NodeId, Rc<dyn CommitNode>)> {
        let mut dirty = self.inner.dirty.borrow_mut();
        dirty.node_ids.clear();
        core::mem::take(&mut dirty.nodes)
    }

    fn run_nodes(&self, version: Version, errors: &mut Vec<Error>) -> usize {
        let nodes = self.take_nodes();
        for (_, node) in &nodes {
            if let Err(e) = node.on_commit(version) {
                errors.push(e);
            }
        }
        nodes.len()
    }

    fn commit(&self) -> Vec<Error> {
        let Some(version) = self.inner.current_tx.take() else {
            return Vec::new();
        };
        self.inner.version.set(version);

        let sources = core::mem::take(&mut self.inner.dirty.borrow_mut().sources);
        for source in &sources {
            source.on_commit_enqueue(version);
        }

        let mut errors = Vec::new();
        for source in &sources {
            if let Err(e) = source.on_commit(version) {
                errors.push(e);
            }
        }

        // Propagation is synchronous, so every node that will run for this
        // version has registered by now.
        let nodes = self.run_nodes(version, &mut errors);

        tracing::debug!(
            version,
            sources = sources.len(),
            nodes,
            errors = errors.len(),
            "committed"
        );
        errors
    }

    fn rollback(&self) {
        let version = self.inner.current_tx.take();
        let sources = core::mem::take(&mut self.inner.dirty.borrow_mut().sources);
        let nodes = self.take_nodes();
        for source in &sources {
            source.on_rollback();
        }
        for (_, node) in &nodes {
            node.on_rollback();
        }
        tracing::debug!(
            version,
            sources = sources.len(),
            nodes = nodes.len(),
            "rolled back"
        );
    }
}

impl fmt::Debug for Materialite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Materialite")
            .field("version", &self.inner.version.get())
            .field("current_tx", &self.inner.current_tx.get())
            .finish()
    }
}
