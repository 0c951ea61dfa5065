//! Materia Incremental - an embedded incremental view maintenance runtime.
//!
//! Queries are dataflow graphs built over mutable base relations. When a
//! relation changes, only the difference flows through the graph, and every
//! derived result is brought up to date without recomputation.
//!
//! # Core Concepts
//!
//! - `Entry<T>` / `Multiset<T>`: a value with a signed multiplicity, and a
//!   lazily produced batch of them
//! - `DifferenceStream<T>`: a node of the graph; operators are built as
//!   methods on it and each returns a new stream
//! - `Materialite`: the transaction coordinator; versions, commit, rollback
//! - `Source<T>`: a comparator-ordered base relation, the only place writes
//!   enter the graph
//! - `MaterializedView<T>`: a terminal holding the accumulated result
//!
//! # Operators
//!
//! - `map`, `filter`, `concat`
//! - `join` (semi-naive inner join over per-key `DifferenceIndex`es)
//! - `reduce` (group-by over full group membership)
//! - `aggregate`, `count`, `sum`, `average`, `min`, `max`, `linear_count`
//! - `effect`, `try_effect`, `debug`
//!
//! # Example
//!
//! ```
//! use materia_incremental::Materialite;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct User {
//!     id: i64,
//!     age: i64,
//! }
//!
//! let m = Materialite::new();
//! let users = m.new_source(|a: &User, b: &User| a.id.cmp(&b.id));
//! let adults = users
//!     .stream()
//!     .filter(|u| u.age >= 18)
//!     .materialize(|a: &User, b: &User| a.id.cmp(&b.id));
//!
//! m.tx(|| {
//!     users.add(User { id: 1, age: 25 })?;
//!     users.add(User { id: 2, age: 12 })
//! })
//! .unwrap();
//!
//! assert_eq!(adults.value(), vec![User { id: 1, age: 25 }]);
//! ```

pub mod dataflow;
pub mod error;
pub mod materialite;
pub mod materialize;
pub mod multiset;
pub mod operators;
pub mod source;
pub mod subscription;
pub mod types;

pub use dataflow::{DifferenceStream, Listener, Operator, Request, RequestId};
pub use error::{BoxError, Error, Result};
pub use materialite::Materialite;
pub use materialize::MaterializedView;
pub use multiset::{Entry, Multiplicity, Multiset};
pub use operators::{
    aggregate_values, concat, Accumulator, AggregateKind, DifferenceIndex, GroupValues, Indexed,
    JoinBuilder, JoinResult, OrderedValue,
};
pub use source::{Comparator, Source};
pub use subscription::{ResultCallback, Subscription, SubscriptionId, SubscriptionManager};
pub use types::{Alias, NodeId, PrimaryKey, Version};
