//! Change feed adapter over one watched collection.
//!
//! # Responsibility
//! - Turn store watch notifications into decoded `Item` snapshots.
//! - Own the watch lifetime through an explicit `Subscription` handle.
//!
//! # Invariants
//! - Every snapshot replaces the previous one; nothing is patched.
//! - The store watch is released exactly once, on `unsubscribe()` or drop.
//! - No listener call happens after `unsubscribe()`, even for notifications
//!   the store had already queued.
//! - A transport failure keeps the last snapshot; it never clears it.

use crate::model::document::{CollectionPath, CREATED_AT_FIELD};
use crate::model::item::Item;
use crate::store::{DocumentStore, StoreResult, WatchEvent, WatchId, WatchSink};
use log::{debug, info, warn};
use std::cell::{Cell, RefCell};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::{Rc, Weak};

/// Receives each complete snapshot.
pub type SnapshotListener = Rc<dyn Fn(&[Item])>;
/// Receives transport failures reported by the store.
pub type FeedErrorListener = Rc<dyn Fn(&FeedError)>;

/// Wraps a closure as a [`SnapshotListener`].
pub fn snapshot_listener(listener: impl Fn(&[Item]) + 'static) -> SnapshotListener {
    Rc::new(listener)
}

/// Wraps a closure as a [`FeedErrorListener`].
pub fn error_listener(listener: impl Fn(&FeedError) + 'static) -> FeedErrorListener {
    Rc::new(listener)
}

/// Transport failure reported on the side channel of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    pub collection: CollectionPath,
    pub message: String,
}

impl Display for FeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "change feed `{}` stalled: {}", self.collection, self.message)
    }
}

impl Error for FeedError {}

/// Describes one collection watch before it is opened.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    collection: CollectionPath,
    order_field: String,
    owner_scope: String,
}

impl ChangeFeed {
    /// Top-level feed ordered by server creation sequence.
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            order_field: CREATED_AT_FIELD.to_string(),
            owner_scope: String::new(),
        }
    }

    /// Field used to keep result order stable across snapshots.
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_field = field.into();
        self
    }

    /// Parent id stamped on every decoded item.
    pub fn owned_by(mut self, owner_scope: impl Into<String>) -> Self {
        self.owner_scope = owner_scope.into();
        self
    }

    /// Opens the watch. Snapshots arrive once the store delivers them.
    pub fn subscribe(
        self,
        store: Rc<dyn DocumentStore>,
        on_snapshot: SnapshotListener,
        on_error: FeedErrorListener,
    ) -> StoreResult<Subscription> {
        let state = Rc::new(FeedState {
            store: store.clone(),
            feed: self,
            watch_id: Cell::new(None),
            closed: Cell::new(false),
            last_snapshot: RefCell::new(Vec::new()),
            deliveries: Cell::new(0),
            on_snapshot,
            on_error,
        });

        let weak = Rc::downgrade(&state);
        let sink: WatchSink = Rc::new(move |event: WatchEvent| FeedState::handle(&weak, event));
        let watch_id = store.watch(&state.feed.collection, &state.feed.order_field, sink)?;
        state.watch_id.set(Some(watch_id));

        info!(
            "event=feed_subscribe module=feed status=ok scoped={}",
            !state.feed.owner_scope.is_empty()
        );
        Ok(Subscription { state })
    }
}

struct FeedState {
    store: Rc<dyn DocumentStore>,
    feed: ChangeFeed,
    watch_id: Cell<Option<WatchId>>,
    closed: Cell<bool>,
    last_snapshot: RefCell<Vec<Item>>,
    deliveries: Cell<u64>,
    on_snapshot: SnapshotListener,
    on_error: FeedErrorListener,
}

impl FeedState {
    fn handle(weak: &Weak<FeedState>, event: WatchEvent) {
        let Some(state) = weak.upgrade() else {
            return;
        };
        if state.closed.get() {
            return;
        }

        match event {
            WatchEvent::Snapshot(documents) => {
                let items = documents
                    .iter()
                    .map(|document| Item::from_document(document, &state.feed.owner_scope))
                    .collect::<Vec<_>>();
                *state.last_snapshot.borrow_mut() = items.clone();
                state.deliveries.set(state.deliveries.get() + 1);
                debug!(
                    "event=feed_snapshot module=feed status=ok item_count={} delivery={}",
                    items.len(),
                    state.deliveries.get()
                );
                (state.on_snapshot)(&items);
            }
            WatchEvent::TransportError(message) => {
                warn!(
                    "event=feed_snapshot module=feed status=stalled retained_count={}",
                    state.last_snapshot.borrow().len()
                );
                let error = FeedError {
                    collection: state.feed.collection.clone(),
                    message,
                };
                (state.on_error)(&error);
            }
        }
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        if let Some(watch_id) = self.watch_id.take() {
            self.store.unwatch(watch_id);
        }
        debug!(
            "event=feed_unsubscribe module=feed status=ok deliveries={}",
            self.deliveries.get()
        );
    }
}

/// Live handle of an open change feed.
pub struct Subscription {
    state: Rc<FeedState>,
}

impl Subscription {
    /// Releases the store watch. Further calls are no-ops.
    pub fn unsubscribe(&self) {
        self.state.close();
    }

    pub fn is_active(&self) -> bool {
        !self.state.closed.get()
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.state.feed.collection
    }

    /// Last snapshot received, retained across transport failures.
    pub fn last_snapshot(&self) -> Vec<Item> {
        self.state.last_snapshot.borrow().clone()
    }

    /// Number of snapshots delivered so far.
    pub fn delivery_count(&self) -> u64 {
        self.state.deliveries.get()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state.close();
    }
}
