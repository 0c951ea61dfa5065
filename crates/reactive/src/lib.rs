//! Materia Reactive - host-facing layer over the incremental runtime.
//!
//! A host keeps its tables in a [`Context`] and prepares [`Statement`]s
//! against it. Each statement is a dataflow graph whose result is
//! materialized and kept up to date as the tables change; subscribers get
//! the complete result after every commit that changes it.
//!
//! # Example
//!
//! ```
//! use materia_reactive::{Context, Entity, PrimaryKey, Statement};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Issue {
//!     id: i64,
//!     open: bool,
//! }
//!
//! impl Entity for Issue {
//!     fn id(&self) -> PrimaryKey {
//!         self.id.into()
//!     }
//! }
//!
//! let ctx = Context::new();
//! let issues = ctx.get_source_for_table::<Issue>("issue").unwrap();
//! issues.add(Issue { id: 1, open: true }).unwrap();
//!
//! let open = Statement::prepare(
//!     &ctx,
//!     |ctx| Ok(ctx.get_source_for_table::<Issue>("issue")?.stream().filter(|i| i.open)),
//!     |a: &Issue, b: &Issue| a.id.cmp(&b.id),
//! )
//! .unwrap();
//!
//! issues.add(Issue { id: 2, open: false }).unwrap();
//! assert_eq!(open.exec(), vec![Issue { id: 1, open: true }]);
//! ```

pub mod context;
pub mod statement;

pub use context::{Context, Entity};
pub use statement::Statement;

pub use materia_incremental::{
    DifferenceStream, Error, Materialite, PrimaryKey, Result, Source, SubscriptionId,
};
