//! Change feed for presentation layers
//!
//! Every registry mutation publishes the full operation list, most recent
//! first. Callbacks run synchronously on the mutating thread after the
//! registry lock is released. Lists are stamped with the registry generation
//! they were copied at and delivered in that order: a list older than one
//! already delivered is dropped, so `watch` receivers always end on the
//! latest list. Callbacks must not mutate the registry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stagehand_types::Operation;
use tokio::sync::watch;

/// Callback invoked with the current operation list
pub type Subscriber = Arc<dyn Fn(&[Operation]) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Operation list copied under the registry lock
pub(crate) struct Listing {
    pub(crate) generation: u64,
    pub(crate) operations: Vec<Operation>,
}

/// Newest generation handed to callbacks and to the feed
#[derive(Debug, Default)]
struct Delivered {
    callbacks: u64,
    feed: u64,
}

pub(crate) struct Subscribers {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    /// Held for the whole delivery so lists go out one at a time
    delivered: Mutex<Delivered>,
    feed: watch::Sender<Vec<Operation>>,
}

impl Subscribers {
    pub(crate) fn new() -> Self {
        let (feed, _) = watch::channel(Vec::new());
        Self {
            next_id: AtomicU64::new(1),
            callbacks: Mutex::new(Vec::new()),
            delivered: Mutex::new(Delivered::default()),
            feed,
        }
    }

    pub(crate) fn add(&self, callback: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, callback));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub(crate) fn watch(&self) -> watch::Receiver<Vec<Operation>> {
        self.feed.subscribe()
    }

    /// Prime the feed for a new watcher without calling callbacks
    pub(crate) fn refresh(&self, listing: Listing) {
        let mut delivered = self.lock_delivered();
        if listing.generation >= delivered.feed {
            delivered.feed = listing.generation;
            self.feed.send_replace(listing.operations);
        }
    }

    /// Skip building the list when nobody is listening
    pub(crate) fn is_listening(&self) -> bool {
        self.feed.receiver_count() > 0 || !self.lock().is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn publish(&self, listing: Listing) {
        let mut delivered = self.lock_delivered();
        if listing.generation <= delivered.callbacks {
            return;
        }
        delivered.callbacks = listing.generation;

        // Clone out so callbacks may subscribe or unsubscribe
        let callbacks: Vec<Subscriber> = self
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(&listing.operations);
        }

        if listing.generation >= delivered.feed {
            delivered.feed = listing.generation;
            self.feed.send_replace(listing.operations);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Subscriber)>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_delivered(&self) -> MutexGuard<'_, Delivered> {
        self.delivered.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("callbacks", &self.len())
            .field("watchers", &self.feed.receiver_count())
            .finish()
    }
}
