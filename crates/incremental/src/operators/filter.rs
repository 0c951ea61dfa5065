//! Filter operator.

use super::unary;
use crate::dataflow::DifferenceStream;
use std::rc::Rc;

impl<T: 'static> DifferenceStream<T> {
    /// Keeps the entries whose value satisfies `predicate`.
    ///
    /// Retractions are tested the same way as insertions, so a value that
    /// passed on the way in also passes on the way out.
    #[must_use]
    pub fn filter<F>(&self, predicate: F) -> DifferenceStream<T>
    where
        F: Fn(&T) -> bool + 'static,
    {
        let predicate = Rc::new(predicate);
        unary(self, move |_, data| {
            let predicate = Rc::clone(&predicate);
            Ok(Some(data.filter(move |value| predicate(value))))
        })
    }
}
