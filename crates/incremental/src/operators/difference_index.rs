//! Per-key index of differences used by joins.

use crate::multiset::{Entry, Multiplicity};
use crate::types::PrimaryKey;
use core::hash::Hash;
use hashbrown::HashMap;

/// One indexed row.
#[derive(Clone, Debug, PartialEq)]
pub struct Indexed<V> {
    pub primary_key: PrimaryKey,
    pub value: V,
    pub multiplicity: Multiplicity,
}

/// Join key -> rows indexed under that key, with their multiplicities.
///
/// Rows are appended as they arrive. [`DifferenceIndex::compact`] merges the
/// rows of a key that share a primary key into their net multiplicity.
#[derive(Clone, Debug)]
pub struct DifferenceIndex<K, V>
where
    K: Eq + Hash,
{
    index: HashMap<K, Vec<Indexed<V>>>,
}

impl<K, V> Default for DifferenceIndex<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            index: HashMap::new(),
        }
    }
}

impl<K, V> DifferenceIndex<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `entry` under `key`.
    pub fn add(&mut self, key: K, primary_key: PrimaryKey, entry: Entry<V>) {
        self.index.entry(key).or_default().push(Indexed {
            primary_key,
            value: entry.value,
            multiplicity: entry.multiplicity,
        });
    }

    /// Appends every row of `other`.
    pub fn extend(&mut self, other: DifferenceIndex<K, V>) {
        for (key, rows) in other.index {
            self.index.entry(key).or_default().extend(rows);
        }
    }

    /// Pairs every row of `self` with every row of `other` sharing its key.
    pub fn join<'a, W>(
        &'a self,
        other: &'a DifferenceIndex<K, W>,
    ) -> impl Iterator<Item = (&'a Indexed<V>, &'a Indexed<W>)> + 'a {
        self.index.iter().flat_map(move |(key, rows)| {
            let matches: &'a [Indexed<W>] =
                other.index.get(key).map(Vec::as_slice).unwrap_or(&[]);
            rows.iter()
                .flat_map(move |row| matches.iter().map(move |matched| (row, matched)))
        })
    }

    /// Merges rows sharing a primary key under each of `keys`.
    ///
    /// A merged row carries the net multiplicity and the value of the latest
    /// insertion. Rows netting to zero are dropped, and so are keys left
    /// without rows.
    pub fn compact(&mut self, keys: &[K]) {
        for key in keys {
            let Some(rows) = self.index.get_mut(key) else {
                continue;
            };
            if rows.len() > 1 {
                let mut positions: HashMap<PrimaryKey, usize> = HashMap::new();
                let mut merged: Vec<Indexed<V>> = Vec::with_capacity(rows.len());
                for row in rows.drain(..) {
                    match positions.get(&row.primary_key) {
                        Some(&pos) => {
                            let target = &mut merged[pos];
                            target.multiplicity += row.multiplicity;
                            if row.multiplicity > 0 {
                                target.value = row.value;
                            }
                        }
                        None => {
                            positions.insert(row.primary_key.clone(), merged.len());
                            merged.push(row);
                        }
                    }
                }
                *rows = merged;
            }
            rows.retain(|row| row.multiplicity != 0);
            if rows.is_empty() {
                self.index.remove(key);
            }
        }
    }

    /// Returns the rows indexed under `key`.
    pub fn get(&self, key: &K) -> &[Indexed<V>] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the number of indexed rows.
    pub fn len(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the number of distinct join keys.
    pub fn key_count(&self) -> usize {
        self.index.len()
    }
}
