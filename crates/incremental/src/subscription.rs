//! Subscription management for materialized views.
//!
//! Subscribers receive the complete current result of a view, not its
//! diffs, every time a commit changes it.

use hashbrown::HashMap;
use std::rc::Rc;

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback invoked with a view's full result.
pub type ResultCallback<T> = Rc<dyn Fn(&[T])>;

/// A subscription to view changes.
pub struct Subscription<T> {
    id: SubscriptionId,
    callback: ResultCallback<T>,
}

impl<T> Subscription<T> {
    pub fn new<F>(id: SubscriptionId, callback: F) -> Self
    where
        F: Fn(&[T]) + 'static,
    {
        Self {
            id,
            callback: Rc::new(callback),
        }
    }

    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Tracks the subscribers of one view.
pub struct SubscriptionManager<T> {
    subscriptions: HashMap<SubscriptionId, Subscription<T>>,
    next_id: SubscriptionId,
}

impl<T> Default for SubscriptionManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionManager<T> {
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers `callback` and returns the id to unsubscribe with.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&[T]) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(id, Subscription::new(id, callback));
        id
    }

    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Returns the callbacks in subscription order.
    ///
    /// Callers invoke the returned callbacks after releasing any borrow of
    /// the manager, so a callback may subscribe or unsubscribe.
    pub fn callbacks(&self) -> Vec<ResultCallback<T>> {
        let mut subscriptions: Vec<&Subscription<T>> = self.subscriptions.values().collect();
        subscriptions.sort_by_key(|s| s.id());
        subscriptions
            .into_iter()
            .map(|s| Rc::clone(&s.callback))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}
