//! Map operator.

use super::unary;
use crate::dataflow::DifferenceStream;
use std::rc::Rc;

impl<T: 'static> DifferenceStream<T> {
    /// Transforms every value, keeping multiplicities.
    ///
    /// The transform is deferred: it runs when a consumer iterates the pushed
    /// multiset, once per entry per iteration.
    #[must_use]
    pub fn map<U, F>(&self, f: F) -> DifferenceStream<U>
    where
        U: 'static,
        F: Fn(&T) -> U + 'static,
    {
        let f = Rc::new(f);
        unary(self, move |_, data| {
            let f = Rc::clone(&f);
            Ok(Some(data.map(move |value| f(value))))
        })
    }
}
