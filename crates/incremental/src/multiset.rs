//! Multiset difference algebra.
//!
//! An `Entry` pairs a value with a signed multiplicity: positive entries assert
//! the value that many times, negative entries retract it. A `Multiset` is one
//! batch of entries, produced lazily: transforms layered on top of it with
//! [`Multiset::map`] or [`Multiset::filter`] only run when a consumer iterates,
//! and every iteration re-runs the producing computation from the start.

use core::fmt;
use core::hash::Hash;
use hashbrown::HashMap;
use std::rc::Rc;

/// Signed count of a value in a diff.
pub type Multiplicity = i64;

/// A single differential change.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Entry<T> {
    /// The value being asserted or retracted
    pub value: T,
    /// How many times: > 0 asserts, < 0 retracts, 0 is a no-op
    pub multiplicity: Multiplicity,
}

impl<T> Entry<T> {
    /// Creates an entry with the given multiplicity.
    #[inline]
    pub fn new(value: T, multiplicity: Multiplicity) -> Self {
        Self {
            value,
            multiplicity,
        }
    }

    /// Creates an insertion entry (+1).
    #[inline]
    pub fn insert(value: T) -> Self {
        Self::new(value, 1)
    }

    /// Creates a retraction entry (-1).
    #[inline]
    pub fn retract(value: T) -> Self {
        Self::new(value, -1)
    }

    #[inline]
    pub fn is_insert(&self) -> bool {
        self.multiplicity > 0
    }

    #[inline]
    pub fn is_retract(&self) -> bool {
        self.multiplicity < 0
    }

    #[inline]
    pub fn is_noop(&self) -> bool {
        self.multiplicity == 0
    }

    /// Maps the value, keeping the multiplicity.
    #[inline]
    pub fn map<U, F>(self, f: F) -> Entry<U>
    where
        F: FnOnce(T) -> U,
    {
        Entry::new(f(self.value), self.multiplicity)
    }

    /// Flips an insertion into a retraction and vice versa.
    #[inline]
    pub fn negate(self) -> Self {
        Self::new(self.value, -self.multiplicity)
    }
}

impl<T> From<(T, Multiplicity)> for Entry<T> {
    fn from((value, multiplicity): (T, Multiplicity)) -> Self {
        Entry::new(value, multiplicity)
    }
}

type Producer<T> = dyn Fn() -> Box<dyn Iterator<Item = Entry<T>>>;

/// A lazily produced batch of entries.
///
/// Cloning is cheap and shares the producer. Consuming the multiset twice runs
/// the producer twice.
pub struct Multiset<T> {
    producer: Rc<Producer<T>>,
}

impl<T> Clone for Multiset<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Rc::clone(&self.producer),
        }
    }
}

impl<T: 'static> Multiset<T> {
    /// Creates a multiset whose entries are produced by `f` on every iteration.
    pub fn from_fn<F, I>(f: F) -> Self
    where
        F: Fn() -> I + 'static,
        I: Iterator<Item = Entry<T>> + 'static,
    {
        let producer: Rc<Producer<T>> =
            Rc::new(move || Box::new(f()) as Box<dyn Iterator<Item = Entry<T>>>);
        Self { producer }
    }

    /// Creates an empty multiset.
    pub fn empty() -> Self {
        Self::from_fn(core::iter::empty::<Entry<T>>)
    }

    /// Starts a fresh pass over the entries.
    pub fn iter(&self) -> Box<dyn Iterator<Item = Entry<T>>> {
        (self.producer)()
    }

    /// Lazily maps each value, keeping multiplicities.
    ///
    /// `f` runs once per entry per iteration of the returned multiset, and not
    /// at all if nobody iterates it.
    pub fn map<U, F>(&self, f: F) -> Multiset<U>
    where
        U: 'static,
        F: Fn(&T) -> U + 'static,
    {
        let source = self.clone();
        let f = Rc::new(f);
        Multiset::from_fn(move || {
            let f = Rc::clone(&f);
            source
                .iter()
                .map(move |e| Entry::new(f(&e.value), e.multiplicity))
        })
    }

    /// Lazily keeps the entries whose value satisfies `predicate`.
    ///
    /// Retractions pass exactly like insertions do.
    pub fn filter<F>(&self, predicate: F) -> Multiset<T>
    where
        F: Fn(&T) -> bool + 'static,
    {
        let source = self.clone();
        let predicate = Rc::new(predicate);
        Multiset::from_fn(move || {
            let predicate = Rc::clone(&predicate);
            source.iter().filter(move |e| predicate(&e.value))
        })
    }

    /// Chains several multisets into one, in order.
    pub fn concat(parts: Vec<Multiset<T>>) -> Self {
        Self::from_fn(move || parts.clone().into_iter().flat_map(|part| part.iter()))
    }

    /// Collects the entries.
    pub fn to_vec(&self) -> Vec<Entry<T>> {
        self.iter().collect()
    }

    /// Returns true if a pass yields no entries.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Returns the sum of all multiplicities.
    pub fn net_multiplicity(&self) -> Multiplicity {
        self.iter().map(|e| e.multiplicity).sum()
    }
}

impl<T: Clone + 'static> Multiset<T> {
    /// Creates a multiset over a fixed list of entries.
    pub fn new(entries: Vec<Entry<T>>) -> Self {
        let entries: Rc<[Entry<T>]> = entries.into();
        Self::from_fn(move || {
            let entries = Rc::clone(&entries);
            let len = entries.len();
            (0..len).map(move |i| entries[i].clone())
        })
    }

    /// Creates a multiset from `(value, multiplicity)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (T, Multiplicity)>) -> Self {
        Self::new(pairs.into_iter().map(Entry::from).collect())
    }

    /// Creates a multiset holding one entry.
    pub fn single(value: T, multiplicity: Multiplicity) -> Self {
        Self::new(vec![Entry::new(value, multiplicity)])
    }
}

impl<T: Clone + Eq + Hash + 'static> Multiset<T> {
    /// Merges equal values into their net multiplicity and drops zero entries.
    ///
    /// Values keep the order of their first appearance.
    pub fn consolidated(&self) -> Vec<Entry<T>> {
        let mut positions: HashMap<T, usize> = HashMap::new();
        let mut merged: Vec<Entry<T>> = Vec::new();
        for entry in self.iter() {
            match positions.get(&entry.value) {
                Some(&pos) => merged[pos].multiplicity += entry.multiplicity,
                None => {
                    positions.insert(entry.value.clone(), merged.len());
                    merged.push(entry);
                }
            }
        }
        merged.retain(|e| !e.is_noop());
        merged
    }
}

impl<T: Clone + 'static> From<Vec<Entry<T>>> for Multiset<T> {
    fn from(entries: Vec<Entry<T>>) -> Self {
        Multiset::new(entries)
    }
}

impl<T: Clone + 'static> FromIterator<Entry<T>> for Multiset<T> {
    fn from_iter<I: IntoIterator<Item = Entry<T>>>(iter: I) -> Self {
        Multiset::new(iter.into_iter().collect())
    }
}

impl<T: 'static> IntoIterator for &Multiset<T> {
    type Item = Entry<T>;
    type IntoIter = Box<dyn Iterator<Item = Entry<T>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Multiset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
