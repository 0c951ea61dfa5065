//! Messages sent upstream through the dataflow graph.

use core::sync::atomic::{AtomicU64, Ordering};

/// Identifier of an upstream request.
pub type RequestId = u64;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// A request travelling from a consumer toward the sources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Ask the sources to replay their full contents to the requester.
    Pull { id: RequestId },
}

impl Request {
    /// Creates a pull request with a fresh id.
    pub fn pull() -> Self {
        Request::Pull {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Returns the request id.
    #[inline]
    pub fn id(&self) -> RequestId {
        match self {
            Request::Pull { id } => *id,
        }
    }
}
