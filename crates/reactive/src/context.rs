//! Named sources shared by the statements of one host.
//!
//! A `Context` owns a single `Materialite` and hands out one `Source` per
//! table name, creating it on first use. Every statement prepared against
//! the context reads from these sources, so a write to a table reaches all
//! of them in the same commit.

use core::any::{type_name, Any};
use core::cmp::Ordering;
use core::fmt;
use hashbrown::HashMap;
use materia_incremental::{Error, Materialite, PrimaryKey, Result, Source};
use std::cell::RefCell;
use std::rc::Rc;

/// A row type stored in a named table.
pub trait Entity: Clone + 'static {
    /// Returns the identity of this row. Tables are ordered by it.
    fn id(&self) -> PrimaryKey;
}

struct Table {
    source: Box<dyn Any>,
    element: &'static str,
}

struct ContextInner {
    materialite: Materialite,
    tables: RefCell<HashMap<String, Table>>,
}

/// Integration point between a host and the dataflow runtime.
///
/// Cloning a context yields another handle to the same tables.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with a fresh coordinator and no tables.
    pub fn new() -> Self {
        Self::with_materialite(Materialite::new())
    }

    /// Creates a context over an existing coordinator.
    pub fn with_materialite(materialite: Materialite) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                materialite,
                tables: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn materialite(&self) -> &Materialite {
        &self.inner.materialite
    }

    /// Returns the table `name`, ordered by `Entity::id`.
    pub fn get_source_for_table<T: Entity>(&self, name: &str) -> Result<Source<T>> {
        self.get_source_with_ordering(name, |a: &T, b: &T| a.id().cmp(&b.id()))
    }

    /// Returns the table `name`, creating it with `comparator` if needed.
    ///
    /// The comparator only applies when the table is created; an existing
    /// table keeps its ordering. Asking for an existing table with another
    /// element type fails.
    pub fn get_source_with_ordering<T, C>(&self, name: &str, comparator: C) -> Result<Source<T>>
    where
        T: Clone + 'static,
        C: Fn(&T, &T) -> Ordering + 'static,
    {
        let mut tables = self.inner.tables.borrow_mut();
        if let Some(table) = tables.get(name) {
            return table.source.downcast_ref::<Source<T>>().cloned().ok_or_else(|| {
                Error::invalid_operation(format!(
                    "table `{}` holds {}, not {}",
                    name,
                    table.element,
                    type_name::<T>()
                ))
            });
        }

        let source = self.inner.materialite.new_source(comparator);
        tracing::debug!(table = name, element = type_name::<T>(), "table created");
        tables.insert(
            name.to_string(),
            Table {
                source: Box::new(source.clone()),
                element: type_name::<T>(),
            },
        );
        Ok(source)
    }

    /// Returns true if a table named `name` has been created.
    pub fn has_table(&self, name: &str) -> bool {
        self.inner.tables.borrow().contains_key(name)
    }

    /// Returns the names of all created tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.tables.borrow().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Runs `f` in one transaction of this context's coordinator.
    pub fn tx<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        self.inner.materialite.tx(f)
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("materialite", &self.inner.materialite)
            .field("tables", &self.table_names())
            .finish()
    }
}
