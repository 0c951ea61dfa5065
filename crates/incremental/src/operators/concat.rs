//! Concat operator.

use super::Attachment;
use crate::dataflow::{DifferenceStream, Listener};
use crate::error::{Error, Result};
use crate::multiset::Multiset;
use crate::types::Version;
use std::rc::Rc;

/// Merges several streams into one.
///
/// Every push to any input is forwarded on its own, so the output may see
/// several pushes for one version, one per contributing input.
pub fn concat<T: 'static>(inputs: &[DifferenceStream<T>]) -> Result<DifferenceStream<T>> {
    let Some(first) = inputs.first() else {
        return Err(Error::invalid_operator("concat needs at least one input"));
    };
    let materialite = first.materialite().clone();
    if inputs.iter().any(|s| !s.materialite().ptr_eq(&materialite)) {
        return Err(Error::invalid_operator(
            "concat inputs belong to different materialites",
        ));
    }

    let output = DifferenceStream::new(materialite);
    let weak = output.downgrade();
    let listener: Rc<dyn Listener<T>> =
        Rc::new(move |version: Version, data: &Multiset<T>| -> Result<()> {
            match weak.upgrade() {
                Some(output) => output.new_data(version, data.clone()),
                None => Ok(()),
            }
        });

    let attachments: Vec<Attachment<T>> = inputs
        .iter()
        .map(|input| Attachment::new(input, Rc::clone(&listener)))
        .collect();
    output.set_operator(Rc::new(attachments));
    Ok(output)
}

impl<T: 'static> DifferenceStream<T> {
    /// Merges this stream with `others`. See [`concat`].
    pub fn concat(&self, others: &[DifferenceStream<T>]) -> Result<DifferenceStream<T>> {
        let mut inputs = Vec::with_capacity(others.len() + 1);
        inputs.push(self.clone());
        inputs.extend(others.iter().cloned());
        concat(&inputs)
    }
}
