//! Dataflow graph primitives.
//!
//! A `DifferenceStream` is a node of the graph. Operators listen to one or
//! more input streams and own exactly one output stream; pull requests travel
//! the other way, from consumers toward the sources.

mod message;
mod stream;

pub use message::{Request, RequestId};
pub use stream::{DifferenceStream, Listener, Operator};

pub(crate) use stream::{Hydrate, WeakStream};
