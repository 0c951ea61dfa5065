//! Shared scalar types.

use core::fmt;
use std::rc::Rc;

/// Identifier of one committed transaction.
///
/// Every diff pushed during a commit carries the same version. Versions
/// strictly increase and are never reused.
pub type Version = u64;

/// Identifier assigned by a coordinator to sources and post-commit nodes.
pub type NodeId = u64;

/// Name under which one side of a join is exposed in a `JoinResult`.
pub type Alias = Rc<str>;

/// A row identity, either numeric or textual.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimaryKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(v) => write!(f, "{}", v),
            PrimaryKey::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        PrimaryKey::Int(v)
    }
}

impl From<i32> for PrimaryKey {
    fn from(v: i32) -> Self {
        PrimaryKey::Int(v as i64)
    }
}

impl From<u32> for PrimaryKey {
    fn from(v: u32) -> Self {
        PrimaryKey::Int(v as i64)
    }
}

impl From<&str> for PrimaryKey {
    fn from(s: &str) -> Self {
        PrimaryKey::Str(s.into())
    }
}

impl From<String> for PrimaryKey {
    fn from(s: String) -> Self {
        PrimaryKey::Str(s)
    }
}

impl From<&PrimaryKey> for PrimaryKey {
    fn from(k: &PrimaryKey) -> Self {
        k.clone()
    }
}
