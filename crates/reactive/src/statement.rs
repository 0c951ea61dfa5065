//! Prepared statements.
//!
//! A statement is a query graph built once against a `Context` and
//! materialized into a view. The view is hydrated as soon as it is attached,
//! so rows written before and after `prepare` are each counted once.

use crate::context::Context;
use core::cmp::Ordering;
use core::fmt;
use materia_incremental::{DifferenceStream, MaterializedView, Result, SubscriptionId};
use std::rc::Rc;

/// A prepared, incrementally maintained query.
pub struct Statement<T: 'static> {
    context: Context,
    view: MaterializedView<T>,
}

impl<T: Clone + PartialEq + 'static> Statement<T> {
    /// Builds the query graph with `build` and materializes its output.
    ///
    /// `build` receives the context to look up its tables; `comparator`
    /// orders the result rows. Inside an open transaction the existing rows
    /// arrive when it commits.
    pub fn prepare<B, C>(context: &Context, build: B, comparator: C) -> Result<Self>
    where
        B: FnOnce(&Context) -> Result<DifferenceStream<T>>,
        C: Fn(&T, &T) -> Ordering + 'static,
    {
        let stream = build(context)?;
        let view = stream.materialize(comparator);
        view.hydrate()?;
        Ok(Self {
            context: context.clone(),
            view,
        })
    }

    /// Returns the current result.
    pub fn exec(&self) -> Vec<T> {
        self.view.value()
    }

    /// Calls `f` with the complete result now and after every changing
    /// commit.
    ///
    /// The first call is made right away. Inside an open transaction it is
    /// made by the commit instead, if the commit changes the result.
    pub fn subscribe<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&[T]) + 'static,
    {
        let callback = Rc::new(f);
        let on_change = Rc::clone(&callback);
        let id = self.view.subscribe(move |rows: &[T]| on_change(rows));

        if !self.context.materialite().in_transaction() {
            callback(&self.view.value());
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.view.unsubscribe(id)
    }

    /// Detaches the statement from its tables and drops its subscribers.
    pub fn destroy(&self) {
        self.view.destroy();
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn view(&self) -> &MaterializedView<T> {
        &self.view
    }
}

impl<T> fmt::Debug for Statement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement").field("view", &self.view).finish()
    }
}
