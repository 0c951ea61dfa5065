//! Observation points: post-commit effects and debug taps.

use super::unary;
use crate::dataflow::DifferenceStream;
use crate::error::{BoxError, Error, Result};
use crate::materialite::CommitNode;
use crate::multiset::{Multiplicity, Multiset};
use crate::types::Version;
use core::cell::RefCell;
use core::convert::Infallible;
use std::rc::Rc;

type EffectFn<T> = Box<dyn Fn(&T, Multiplicity) -> Result<()>>;

struct EffectNode<T> {
    collected: RefCell<Vec<Multiset<T>>>,
    f: EffectFn<T>,
}

impl<T: 'static> CommitNode for EffectNode<T> {
    fn on_commit(&self, _version: Version) -> Result<()> {
        let batches = core::mem::take(&mut *self.collected.borrow_mut());
        let mut errors = Vec::new();
        for batch in &batches {
            for entry in batch {
                if let Err(e) = (self.f)(&entry.value, entry.multiplicity) {
                    errors.push(e);
                }
            }
        }
        Error::from_many(errors)
    }

    fn on_rollback(&self) {
        self.collected.borrow_mut().clear();
    }
}

impl<T: 'static> DifferenceStream<T> {
    /// Runs `f` once per received entry after the commit has propagated.
    ///
    /// Pushes are buffered while the graph runs; once every source has
    /// flushed, the coordinator calls back and `f` sees each entry in arrival
    /// order. `f` never runs while a transaction is open. Data is forwarded
    /// to the returned stream unchanged.
    #[must_use]
    pub fn effect<F>(&self, f: F) -> DifferenceStream<T>
    where
        F: Fn(&T, Multiplicity) + 'static,
    {
        self.try_effect(move |value, multiplicity| {
            f(value, multiplicity);
            Ok::<(), Infallible>(())
        })
    }

    /// Like [`effect`](Self::effect), with a fallible callback.
    ///
    /// Failures do not stop the remaining entries; they are reported by the
    /// commit that ran the effect.
    #[must_use]
    pub fn try_effect<F, E>(&self, f: F) -> DifferenceStream<T>
    where
        F: Fn(&T, Multiplicity) -> core::result::Result<(), E> + 'static,
        E: Into<BoxError>,
    {
        let materialite = self.materialite().clone();
        let id = materialite.next_node_id();
        let node = Rc::new(EffectNode {
            collected: RefCell::new(Vec::new()),
            f: Box::new(move |value: &T, multiplicity| {
                f(value, multiplicity).map_err(Error::callback)
            }),
        });

        unary(self, move |_, data| {
            materialite.add_dirty_node(id, Rc::clone(&node) as Rc<dyn CommitNode>);
            node.collected.borrow_mut().push(data.clone());
            Ok(Some(data.clone()))
        })
    }

    /// Calls `f` synchronously with every push, then forwards the data.
    #[must_use]
    pub fn debug<F>(&self, f: F) -> DifferenceStream<T>
    where
        F: Fn(Version, &Multiset<T>) + 'static,
    {
        unary(self, move |version, data| {
            f(version, data);
            Ok(Some(data.clone()))
        })
    }
}
