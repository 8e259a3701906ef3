//! Fan-out aggregation of per-parent change feeds.
//!
//! # Responsibility
//! - Open one change feed per parent and keep each parent's latest snapshot.
//! - Recombine the snapshots into the merged set and republish it.
//! - Reconcile open feeds when the parent list changes.
//!
//! # Invariants
//! - The merged set holds at most one item per `(owner_scope, id)`.
//! - A snapshot from one parent never changes items owned by another parent.
//! - An empty snapshot purges every item of that parent.
//! - After `detach_all()` no listener is called again and no watch stays open.

use crate::feed::{
    error_listener, snapshot_listener, ChangeFeed, FeedError, FeedErrorListener, Subscription,
};
use crate::model::document::{CollectionPath, CREATED_AT_FIELD};
use crate::model::item::Item;
use crate::observe::{ListenerId, Observers};
use crate::store::{DocumentStore, StoreError, StoreResult};
use log::{debug, info, warn};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};

/// Receives the complete merged set after every recombination.
pub type MergedListener = Rc<dyn Fn(&[Item])>;

/// Maps a parent id to the address of its child collection.
pub type ChildPathFn = Rc<dyn Fn(&str) -> Option<CollectionPath>>;

/// Observable source of a merged item set.
///
/// Implemented by the fan-out aggregator and by single-collection feeds so
/// a view can be driven by either.
pub trait MergedSource {
    fn on_merged(&self, listener: MergedListener) -> ListenerId;
    fn remove_listener(&self, id: ListenerId) -> bool;
    /// Latest merged set.
    fn merged(&self) -> Vec<Item>;
}

struct ParentFeed {
    parent_id: String,
    subscription: Subscription,
    snapshot: Vec<Item>,
}

struct AggregatorState {
    store: Rc<dyn DocumentStore>,
    child_path: ChildPathFn,
    order_field: String,
    parents: RefCell<Vec<ParentFeed>>,
    merged: RefCell<Vec<Item>>,
    listeners: Observers<[Item]>,
    error_listeners: Observers<FeedError>,
    detached: Cell<bool>,
}

impl AggregatorState {
    fn open_parent(state: &Rc<Self>, parent_id: &str) -> StoreResult<ParentFeed> {
        let path = (state.child_path)(parent_id)
            .ok_or_else(|| StoreError::InvalidPath(format!("child of parent `{parent_id}`")))?;

        let weak = Rc::downgrade(state);
        let snapshot_parent = parent_id.to_string();
        let on_snapshot = snapshot_listener(move |items| {
            if let Some(state) = weak.upgrade() {
                state.accept(&snapshot_parent, items);
            }
        });
        let weak = Rc::downgrade(state);
        let on_error: FeedErrorListener = error_listener(move |err| {
            if let Some(state) = weak.upgrade() {
                if !state.detached.get() {
                    state.error_listeners.emit(err, || !state.detached.get());
                }
            }
        });

        let subscription = ChangeFeed::new(path)
            .order_by(state.order_field.as_str())
            .owned_by(parent_id)
            .subscribe(state.store.clone(), on_snapshot, on_error)?;
        Ok(ParentFeed {
            parent_id: parent_id.to_string(),
            subscription,
            snapshot: Vec::new(),
        })
    }

    fn accept(&self, parent_id: &str, items: &[Item]) {
        if self.detached.get() {
            return;
        }
        {
            let mut parents = self.parents.borrow_mut();
            let Some(parent) = parents
                .iter_mut()
                .find(|parent| parent.parent_id == parent_id)
            else {
                return;
            };
            parent.snapshot = items.to_vec();
        }
        self.publish();
    }

    fn publish(&self) {
        let merged = merge_snapshots(
            self.parents
                .borrow()
                .iter()
                .map(|parent| parent.snapshot.as_slice()),
        );
        *self.merged.borrow_mut() = merged.clone();
        debug!(
            "event=aggregate_publish module=aggregate status=ok parent_count={} item_count={}",
            self.parents.borrow().len(),
            merged.len()
        );
        self.listeners
            .emit(merged.as_slice(), || !self.detached.get());
    }

    fn detach_all(&self) {
        if self.detached.replace(true) {
            return;
        }
        let closed = std::mem::take(&mut *self.parents.borrow_mut());
        for parent in &closed {
            parent.subscription.unsubscribe();
        }
        self.listeners.clear();
        self.error_listeners.clear();
        info!(
            "event=aggregate_detach module=aggregate status=ok closed_count={}",
            closed.len()
        );
    }
}

/// Concatenates per-parent snapshots, keeping the first item per key.
pub fn merge_snapshots<'a>(snapshots: impl IntoIterator<Item = &'a [Item]>) -> Vec<Item> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for snapshot in snapshots {
        for item in snapshot {
            if seen.insert((item.owner_scope.clone(), item.id.clone())) {
                merged.push(item.clone());
            }
        }
    }
    merged
}

/// One change feed per parent, recombined into a single merged set.
pub struct FanOutAggregator {
    state: Rc<AggregatorState>,
}

impl FanOutAggregator {
    /// Opens one feed per distinct parent id against `child_path(parent_id)`.
    ///
    /// # Errors
    /// - `StoreError::InvalidPath` when `child_path` yields no address.
    /// - Any error returned by the store while registering a watch.
    pub fn attach<I, P>(
        store: Rc<dyn DocumentStore>,
        parent_ids: I,
        child_path: impl Fn(&str) -> Option<CollectionPath> + 'static,
        order_field: &str,
    ) -> StoreResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let state = Rc::new(AggregatorState {
            store,
            child_path: Rc::new(child_path),
            order_field: order_field.to_string(),
            parents: RefCell::new(Vec::new()),
            merged: RefCell::new(Vec::new()),
            listeners: Observers::default(),
            error_listeners: Observers::default(),
            detached: Cell::new(false),
        });
        let aggregator = Self { state };
        aggregator.set_parents(parent_ids)?;
        Ok(aggregator)
    }

    /// Attaches with the default `createdAt` fetch order.
    pub fn attach_default<I, P>(
        store: Rc<dyn DocumentStore>,
        parent_ids: I,
        child_path: impl Fn(&str) -> Option<CollectionPath> + 'static,
    ) -> StoreResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self::attach(store, parent_ids, child_path, CREATED_AT_FIELD)
    }

    /// Reconciles open feeds with `parent_ids`.
    ///
    /// Feeds of removed parents are closed and their items purged; new
    /// parents get a feed; unchanged parents keep theirs. A no-op once
    /// detached.
    pub fn set_parents<I, P>(&self, parent_ids: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        if self.state.detached.get() {
            warn!("event=aggregate_set_parents module=aggregate status=ignored reason=detached");
            return Ok(());
        }

        let mut wanted: Vec<String> = Vec::new();
        for parent_id in parent_ids {
            let parent_id = parent_id.into();
            if !wanted.contains(&parent_id) {
                wanted.push(parent_id);
            }
        }

        let mut current = std::mem::take(&mut *self.state.parents.borrow_mut());
        let mut next = Vec::with_capacity(wanted.len());
        let mut opened = 0;
        for parent_id in &wanted {
            if let Some(position) = current
                .iter()
                .position(|parent| &parent.parent_id == parent_id)
            {
                next.push(current.swap_remove(position));
                continue;
            }
            match AggregatorState::open_parent(&self.state, parent_id) {
                Ok(parent) => {
                    next.push(parent);
                    opened += 1;
                }
                Err(err) => {
                    // Feeds reconciled so far stay open; untouched parents keep theirs.
                    next.extend(current);
                    *self.state.parents.borrow_mut() = next;
                    return Err(err);
                }
            }
        }

        let purged_items = current.iter().any(|parent| !parent.snapshot.is_empty());
        let closed = current.len();
        for parent in &current {
            parent.subscription.unsubscribe();
        }
        drop(current);
        *self.state.parents.borrow_mut() = next;

        info!(
            "event=aggregate_set_parents module=aggregate status=ok opened={opened} closed={closed} parent_count={}",
            wanted.len()
        );
        if purged_items {
            self.state.publish();
        }
        Ok(())
    }

    /// Registers a side-channel listener for feed transport failures.
    pub fn on_error(&self, listener: FeedErrorListener) -> ListenerId {
        self.state.error_listeners.add(listener)
    }

    /// Closes every child feed. Safe to call repeatedly and from listeners.
    pub fn detach_all(&self) {
        self.state.detach_all();
    }

    /// Cheap handle that can detach this aggregator from inside a callback.
    pub fn detach_handle(&self) -> DetachHandle {
        DetachHandle {
            state: Rc::downgrade(&self.state),
        }
    }

    pub fn is_detached(&self) -> bool {
        self.state.detached.get()
    }

    /// Parent ids with an open feed, in registration order.
    pub fn parent_ids(&self) -> Vec<String> {
        self.state
            .parents
            .borrow()
            .iter()
            .map(|parent| parent.parent_id.clone())
            .collect()
    }
}

impl MergedSource for FanOutAggregator {
    fn on_merged(&self, listener: MergedListener) -> ListenerId {
        self.state.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.state.listeners.remove(id)
    }

    fn merged(&self) -> Vec<Item> {
        self.state.merged.borrow().clone()
    }
}

impl Drop for FanOutAggregator {
    fn drop(&mut self) {
        self.state.detach_all();
    }
}

/// Weak detach capability handed to callbacks.
#[derive(Clone)]
pub struct DetachHandle {
    state: Weak<AggregatorState>,
}

impl DetachHandle {
    pub fn detach_all(&self) {
        if let Some(state) = self.state.upgrade() {
            state.detach_all();
        }
    }
}

/// Single top-level collection exposed through the merged-set surface.
pub struct LiveCollection {
    subscription: Subscription,
    state: Rc<CollectionState>,
}

struct CollectionState {
    items: RefCell<Vec<Item>>,
    listeners: Observers<[Item]>,
    closed: Cell<bool>,
}

impl LiveCollection {
    pub fn open(
        store: Rc<dyn DocumentStore>,
        collection: CollectionPath,
        order_field: &str,
    ) -> StoreResult<Self> {
        let state = Rc::new(CollectionState {
            items: RefCell::new(Vec::new()),
            listeners: Observers::default(),
            closed: Cell::new(false),
        });
        let weak = Rc::downgrade(&state);
        let subscription = ChangeFeed::new(collection)
            .order_by(order_field)
            .subscribe(
                store,
                snapshot_listener(move |items| {
                    let Some(state) = weak.upgrade() else {
                        return;
                    };
                    if state.closed.get() {
                        return;
                    }
                    *state.items.borrow_mut() = merge_snapshots([items]);
                    let current = state.items.borrow().clone();
                    state.listeners.emit(current.as_slice(), || !state.closed.get());
                }),
                error_listener(|err| {
                    warn!(
                        "event=collection_stalled module=aggregate status=error collection={}",
                        err.collection
                    );
                }),
            )?;
        Ok(Self {
            subscription,
            state,
        })
    }

    /// Closes the underlying feed. Idempotent.
    pub fn close(&self) {
        if self.state.closed.replace(true) {
            return;
        }
        self.subscription.unsubscribe();
        self.state.listeners.clear();
    }
}

impl MergedSource for LiveCollection {
    fn on_merged(&self, listener: MergedListener) -> ListenerId {
        self.state.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.state.listeners.remove(id)
    }

    fn merged(&self) -> Vec<Item> {
        self.state.items.borrow().clone()
    }
}
