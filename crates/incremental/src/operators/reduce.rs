//! Group-by reduce operator.

use super::unary;
use crate::dataflow::DifferenceStream;
use crate::multiset::{Entry, Multiplicity, Multiset};
use crate::types::PrimaryKey;
use core::cell::RefCell;
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// The current members of one group, each repeated by its multiplicity.
#[derive(Clone)]
pub struct GroupValues<'a, T> {
    members: btree_map::Values<'a, PrimaryKey, (T, Multiplicity)>,
    current: Option<(&'a T, Multiplicity)>,
}

impl<'a, T> Iterator for GroupValues<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        loop {
            if let Some((value, remaining)) = self.current.as_mut() {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Some(*value);
                }
            }
            let (value, multiplicity) = self.members.next()?;
            self.current = Some((value, *multiplicity));
        }
    }
}

struct GroupState<T, O> {
    members: BTreeMap<PrimaryKey, (T, Multiplicity)>,
    output: Option<O>,
}

impl<T, O> Default for GroupState<T, O> {
    fn default() -> Self {
        Self {
            members: BTreeMap::new(),
            output: None,
        }
    }
}

impl<T: Clone + 'static> DifferenceStream<T> {
    /// Groups values and maintains one reduced row per group.
    ///
    /// `get_value_identity` tells group members apart, so two distinct rows
    /// with equal contents are not mistaken for one row at multiplicity 2.
    /// When a push touches a group, `reducer` is rerun over the group's full
    /// membership; a changed result is emitted as a retraction of the old row
    /// and an insertion of the new one. A group that becomes empty only
    /// retracts.
    #[must_use]
    pub fn reduce<K, P, O, G, I, R>(
        &self,
        get_group_key: G,
        get_value_identity: I,
        reducer: R,
    ) -> DifferenceStream<O>
    where
        K: Eq + Hash + Clone + 'static,
        P: Into<PrimaryKey>,
        O: Clone + PartialEq + 'static,
        G: Fn(&T) -> K + 'static,
        I: Fn(&T) -> P + 'static,
        R: Fn(GroupValues<'_, T>) -> O + 'static,
    {
        let groups: RefCell<HashMap<K, GroupState<T, O>>> = RefCell::new(HashMap::new());

        unary(self, move |version, data| {
            let mut groups = groups.borrow_mut();
            let mut touched: Vec<K> = Vec::new();
            let mut seen: HashSet<K> = HashSet::new();

            for entry in data.iter() {
                let key = get_group_key(&entry.value);
                let identity: PrimaryKey = get_value_identity(&entry.value).into();
                if seen.insert(key.clone()) {
                    touched.push(key.clone());
                }

                let group = groups.entry(key).or_default();
                match group.members.entry(identity) {
                    btree_map::Entry::Occupied(mut member) => {
                        let (value, multiplicity) = member.get_mut();
                        *multiplicity += entry.multiplicity;
                        if entry.multiplicity > 0 {
                            *value = entry.value;
                        }
                        if *multiplicity <= 0 {
                            member.remove();
                        }
                    }
                    btree_map::Entry::Vacant(slot) => {
                        if entry.multiplicity > 0 {
                            slot.insert((entry.value, entry.multiplicity));
                        }
                    }
                }
            }

            let mut out = Vec::new();
            for key in &touched {
                let Some(group) = groups.get_mut(key) else {
                    continue;
                };
                let next = if group.members.is_empty() {
                    None
                } else {
                    Some(reducer(GroupValues {
                        members: group.members.values(),
                        current: None,
                    }))
                };
                if next != group.output {
                    if let Some(previous) = group.output.take() {
                        out.push(Entry::retract(previous));
                    }
                    if let Some(next) = next {
                        out.push(Entry::insert(next.clone()));
                        group.output = Some(next);
                    }
                }
                if group.members.is_empty() {
                    groups.remove(key);
                }
            }

            tracing::trace!(version, groups = touched.len(), rows = out.len(), "reduce");
            if out.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Multiset::new(out)))
            }
        })
    }
}
