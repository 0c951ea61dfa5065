//! Incremental inner join.

use super::difference_index::{DifferenceIndex, Indexed};
use super::Attachment;
use crate::dataflow::{DifferenceStream, Listener, WeakStream};
use crate::error::{Error, Result};
use crate::multiset::{Entry, Multiset};
use crate::types::{Alias, PrimaryKey, Version};
use core::cell::RefCell;
use core::hash::Hash;
use std::collections::VecDeque;
use std::rc::Rc;

/// A row produced by a join.
///
/// `id` is `"<a primary key>_<b primary key>"`. A join result can itself be
/// fed into another join; its primary key extractor then usually returns
/// `id`, and the alias of that side is left unset.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JoinResult<A, B> {
    pub id: PrimaryKey,
    pub a: A,
    pub b: B,
    pub a_as: Option<Alias>,
    pub b_as: Option<Alias>,
}

impl<A, B> JoinResult<A, B> {
    /// Returns the `a` side if `alias` names it.
    pub fn get_a(&self, alias: &str) -> Option<&A> {
        (self.a_as.as_deref() == Some(alias)).then_some(&self.a)
    }

    /// Returns the `b` side if `alias` names it.
    pub fn get_b(&self, alias: &str) -> Option<&B> {
        (self.b_as.as_deref() == Some(alias)).then_some(&self.b)
    }
}

type KeyFn<T, K> = Rc<dyn Fn(&T) -> K>;
type PrimaryKeyFn<T> = Rc<dyn Fn(&T) -> PrimaryKey>;

/// Configures a join between two streams.
///
/// Obtained from [`DifferenceStream::join`]. Both join key extractors and
/// both primary key extractors are required.
#[must_use]
pub struct JoinBuilder<K, A: 'static, B: 'static> {
    a: DifferenceStream<A>,
    b: DifferenceStream<B>,
    a_as: Option<Alias>,
    b_as: Option<Alias>,
    a_join_key: Option<KeyFn<A, K>>,
    b_join_key: Option<KeyFn<B, K>>,
    a_primary_key: Option<PrimaryKeyFn<A>>,
    b_primary_key: Option<PrimaryKeyFn<B>>,
}

impl<T: 'static> DifferenceStream<T> {
    /// Starts configuring an inner join of this stream (side `a`) with `other`
    /// (side `b`).
    pub fn join<K, B: 'static>(&self, other: &DifferenceStream<B>) -> JoinBuilder<K, T, B> {
        JoinBuilder {
            a: self.clone(),
            b: other.clone(),
            a_as: None,
            b_as: None,
            a_join_key: None,
            b_join_key: None,
            a_primary_key: None,
            b_primary_key: None,
        }
    }
}

impl<K, A, B> JoinBuilder<K, A, B>
where
    K: Eq + Hash + Clone + 'static,
    A: Clone + 'static,
    B: Clone + 'static,
{
    pub fn a_as(mut self, alias: impl Into<Alias>) -> Self {
        self.a_as = Some(alias.into());
        self
    }

    pub fn b_as(mut self, alias: impl Into<Alias>) -> Self {
        self.b_as = Some(alias.into());
        self
    }

    pub fn a_join_key(mut self, f: impl Fn(&A) -> K + 'static) -> Self {
        self.a_join_key = Some(Rc::new(f));
        self
    }

    pub fn b_join_key(mut self, f: impl Fn(&B) -> K + 'static) -> Self {
        self.b_join_key = Some(Rc::new(f));
        self
    }

    pub fn a_primary_key<P: Into<PrimaryKey>>(mut self, f: impl Fn(&A) -> P + 'static) -> Self {
        self.a_primary_key = Some(Rc::new(move |a: &A| f(a).into()));
        self
    }

    pub fn b_primary_key<P: Into<PrimaryKey>>(mut self, f: impl Fn(&B) -> P + 'static) -> Self {
        self.b_primary_key = Some(Rc::new(move |b: &B| f(b).into()));
        self
    }

    /// Validates the configuration and wires the join into the graph.
    pub fn build(self) -> Result<DifferenceStream<JoinResult<A, B>>> {
        let (Some(a_join_key), Some(b_join_key)) = (self.a_join_key, self.b_join_key) else {
            return Err(Error::invalid_operator("join requires a join key for both sides"));
        };
        let (Some(a_primary_key), Some(b_primary_key)) = (self.a_primary_key, self.b_primary_key)
        else {
            return Err(Error::invalid_operator(
                "join requires a primary key for both sides",
            ));
        };
        if let (Some(a), Some(b)) = (&self.a_as, &self.b_as) {
            if a == b {
                return Err(Error::invalid_operator(format!(
                    "both join sides are aliased as `{}`",
                    a
                )));
            }
        }
        if !self.a.materialite().ptr_eq(self.b.materialite()) {
            return Err(Error::invalid_operator(
                "join inputs belong to different materialites",
            ));
        }

        let output = DifferenceStream::new(self.a.materialite().clone());
        let join = Rc::new(InnerJoin {
            a_as: self.a_as,
            b_as: self.b_as,
            a_join_key,
            b_join_key,
            a_primary_key,
            b_primary_key,
            state: RefCell::new(JoinState::default()),
            output: output.downgrade(),
        });

        let on_a = Rc::clone(&join);
        let a_listener: Rc<dyn Listener<A>> =
            Rc::new(move |version: Version, data: &Multiset<A>| -> Result<()> {
                on_a.run(version, Some(data), None)
            });
        let on_b = Rc::clone(&join);
        let b_listener: Rc<dyn Listener<B>> =
            Rc::new(move |version: Version, data: &Multiset<B>| -> Result<()> {
                on_b.run(version, None, Some(data))
            });

        output.set_operator(Rc::new((
            Attachment::new(&self.a, a_listener),
            Attachment::new(&self.b, b_listener),
        )));
        Ok(output)
    }
}

struct JoinState<K, A, B>
where
    K: Eq + Hash,
{
    index_a: DifferenceIndex<K, A>,
    index_b: DifferenceIndex<K, B>,
    pending_a: VecDeque<DifferenceIndex<K, A>>,
    pending_b: VecDeque<DifferenceIndex<K, B>>,
}

impl<K, A, B> Default for JoinState<K, A, B>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            index_a: DifferenceIndex::default(),
            index_b: DifferenceIndex::default(),
            pending_a: VecDeque::new(),
            pending_b: VecDeque::new(),
        }
    }
}

struct InnerJoin<K, A: 'static, B: 'static>
where
    K: Eq + Hash,
{
    a_as: Option<Alias>,
    b_as: Option<Alias>,
    a_join_key: KeyFn<A, K>,
    b_join_key: KeyFn<B, K>,
    a_primary_key: PrimaryKeyFn<A>,
    b_primary_key: PrimaryKeyFn<B>,
    state: RefCell<JoinState<K, A, B>>,
    output: WeakStream<JoinResult<A, B>>,
}

impl<K, A, B> InnerJoin<K, A, B>
where
    K: Eq + Hash + Clone + 'static,
    A: Clone + 'static,
    B: Clone + 'static,
{
    /// Joins one push from either side against the other side's index.
    ///
    /// Each incoming entry becomes a one-row delta. Deltas are drained in
    /// lock-step from both queues; a delta is joined against the other
    /// side's accumulated index and only then folded into its own, so a row
    /// is never matched against itself.
    fn run(
        &self,
        version: Version,
        input_a: Option<&Multiset<A>>,
        input_b: Option<&Multiset<B>>,
    ) -> Result<()> {
        let Some(output) = self.output.upgrade() else {
            return Ok(());
        };

        let rows = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;

            let mut a_keys = Vec::new();
            for entry in input_a.into_iter().flat_map(|data| data.iter()) {
                let key = (self.a_join_key)(&entry.value);
                let primary_key = (self.a_primary_key)(&entry.value);
                let mut delta = DifferenceIndex::new();
                delta.add(key.clone(), primary_key, entry);
                state.pending_a.push_back(delta);
                a_keys.push(key);
            }

            let mut b_keys = Vec::new();
            for entry in input_b.into_iter().flat_map(|data| data.iter()) {
                let key = (self.b_join_key)(&entry.value);
                let primary_key = (self.b_primary_key)(&entry.value);
                let mut delta = DifferenceIndex::new();
                delta.add(key.clone(), primary_key, entry);
                state.pending_b.push_back(delta);
                b_keys.push(key);
            }

            let mut rows = Vec::new();
            while !state.pending_a.is_empty() || !state.pending_b.is_empty() {
                if let Some(delta) = state.pending_a.pop_front() {
                    rows.extend(delta.join(&state.index_b).map(|(a, b)| self.combine(a, b)));
                    state.index_a.extend(delta);
                }
                if let Some(delta) = state.pending_b.pop_front() {
                    rows.extend(state.index_a.join(&delta).map(|(a, b)| self.combine(a, b)));
                    state.index_b.extend(delta);
                }
                state.index_a.compact(&a_keys);
                state.index_b.compact(&b_keys);
            }

            tracing::trace!(
                version,
                rows = rows.len(),
                index_a = state.index_a.len(),
                index_b = state.index_b.len(),
                "join round"
            );
            rows
        };

        if rows.is_empty() {
            return Ok(());
        }
        output.new_data(version, Multiset::new(rows))
    }

    fn combine(&self, a: &Indexed<A>, b: &Indexed<B>) -> Entry<JoinResult<A, B>> {
        Entry::new(
            JoinResult {
                id: PrimaryKey::Str(format!("{}_{}", a.primary_key, b.primary_key)),
                a: a.value.clone(),
                b: b.value.clone(),
                a_as: self.a_as.clone(),
                b_as: self.b_as.clone(),
            },
            a.multiplicity * b.multiplicity,
        )
    }
}
