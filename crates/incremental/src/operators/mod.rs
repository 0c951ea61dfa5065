//! Dataflow operators.
//!
//! Each operator is constructed through a method on [`DifferenceStream`] and
//! owned by the stream it returns:
//! - `map` / `filter`: stateless, lazy per-entry transforms
//! - `concat`: fan-in of several streams
//! - `join`: incremental inner join over two streams
//! - `reduce`: group-by with a reducer over full group membership
//! - `aggregate` and shorthands: running aggregates over the whole stream
//! - `linear_count`: running total of multiplicities
//! - `effect` / `try_effect` / `debug`: observation points

mod aggregate;
mod concat;
mod difference_index;
mod effect;
mod filter;
mod join;
mod map;
mod reduce;

pub use aggregate::{aggregate_values, Accumulator, AggregateKind, OrderedValue};
pub use concat::concat;
pub use difference_index::{DifferenceIndex, Indexed};
pub use join::{JoinBuilder, JoinResult};
pub use reduce::GroupValues;

use crate::dataflow::{DifferenceStream, Listener, Operator, Request};
use crate::error::{Error, Result};
use crate::multiset::Multiset;
use crate::types::Version;
use std::rc::Rc;

/// A listener registered on an input stream.
///
/// Removes itself from the input when dropped, so releasing an operator
/// detaches it from the graph.
pub(crate) struct Attachment<T: 'static> {
    input: DifferenceStream<T>,
    listener: Rc<dyn Listener<T>>,
}

impl<T: 'static> Attachment<T> {
    pub(crate) fn new(input: &DifferenceStream<T>, listener: Rc<dyn Listener<T>>) -> Self {
        input.add_downstream(Rc::clone(&listener));
        Self {
            input: input.clone(),
            listener,
        }
    }

    pub(crate) fn input(&self) -> &DifferenceStream<T> {
        &self.input
    }

    pub(crate) fn pull(&self, request: &Request) -> Result<()> {
        self.input.message_upstream(request, &self.listener)
    }

    pub(crate) fn detach(&self) {
        self.input.remove_downstream(&self.listener);
    }
}

impl<T: 'static> Drop for Attachment<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T: 'static> Operator for Attachment<T> {
    fn message_upstream(&self, request: &Request) -> Result<()> {
        self.pull(request)
    }

    fn destroy(&self) {
        self.detach();
    }
}

impl<T: 'static> Operator for Vec<Attachment<T>> {
    fn message_upstream(&self, request: &Request) -> Result<()> {
        let mut errors = Vec::new();
        for attachment in self {
            if let Err(e) = attachment.pull(request) {
                errors.push(e);
            }
        }
        Error::from_many(errors)
    }

    fn destroy(&self) {
        for attachment in self {
            attachment.detach();
        }
    }
}

impl<A: 'static, B: 'static> Operator for (Attachment<A>, Attachment<B>) {
    fn message_upstream(&self, request: &Request) -> Result<()> {
        let a = self.0.pull(request);
        let b = self.1.pull(request);
        Error::from_many(a.err().into_iter().chain(b.err()).collect())
    }

    fn destroy(&self) {
        self.0.detach();
        self.1.detach();
    }
}

/// Builds a single-input operator.
///
/// `f` runs on every push to `input`; when it returns data, the data is
/// pushed to the returned stream at the same version.
pub(crate) fn unary<I, O, F>(input: &DifferenceStream<I>, f: F) -> DifferenceStream<O>
where
    I: 'static,
    O: 'static,
    F: Fn(Version, &Multiset<I>) -> Result<Option<Multiset<O>>> + 'static,
{
    let output = DifferenceStream::new(input.materialite().clone());
    let weak = output.downgrade();
    let listener: Rc<dyn Listener<I>> =
        Rc::new(move |version: Version, data: &Multiset<I>| -> Result<()> {
            let Some(output) = weak.upgrade() else {
                return Ok(());
            };
            match f(version, data)? {
                Some(out) => output.new_data(version, out),
                None => Ok(()),
            }
        });
    output.set_operator(Rc::new(Attachment::new(input, listener)));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialite::Materialite;
    use crate::multiset::Entry;
    use core::cell::RefCell;

    #[test]
    fn test_dropping_output_detaches_operator() {
        let m = Materialite::new();
        let input = m.new_stream::<i32>();
        let mapped = input.map(|x| x + 1);
        assert_eq!(input.listener_count(), 1);

        drop(mapped);
        assert_eq!(input.listener_count(), 0);
    }

    #[test]
    fn test_destroy_detaches_whole_chain_link() {
        let m = Materialite::new();
        let input = m.new_stream::<i32>();
        let a = input.filter(|x| *x > 0);
        let b = input.map(|x| x * 2);
        assert_eq!(input.listener_count(), 2);

        a.destroy();
        assert_eq!(input.listener_count(), 1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _out = b.debug(move |_, d| sink.borrow_mut().extend(d.to_vec()));
        input.new_data(1, Multiset::single(4, 1)).unwrap();
        assert_eq!(*seen.borrow(), vec![Entry::insert(8)]);
    }

    #[test]
    fn test_intermediate_stream_kept_alive_by_downstream() {
        let m = Materialite::new();
        let input = m.new_stream::<i32>();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let out = input
            .map(|x| x + 1)
            .filter(|x| x % 2 == 0)
            .debug(move |_, d| sink.borrow_mut().extend(d.to_vec()));

        input
            .new_data(1, Multiset::from_pairs(vec![(1, 1), (2, 1), (3, -1)]))
            .unwrap();
        assert_eq!(*seen.borrow(), vec![Entry::insert(2), Entry::retract(4)]);

        drop(out);
        assert_eq!(input.listener_count(), 0);
    }
}
