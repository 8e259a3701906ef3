//! In-process document store.
//!
//! # Responsibility
//! - Back tests, demos and offline sessions with the full watch/mutate contract.
//! - Simulate transport and mutation failures on demand.
//!
//! # Invariants
//! - `created_at` values are assigned from one monotonic counter.
//! - A mutation that changes nothing queues no notification.

use super::watchers::{sort_documents, WatchRegistry};
use super::{
    apply_mutation, validate_document_id, DocumentStore, Mutation, StoreError, StoreResult,
    WatchEvent, WatchId, WatchSink,
};
use crate::model::document::{CollectionPath, Document, Fields};
use log::{debug, warn};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

type Collection = BTreeMap<String, Document>;

/// Single-threaded in-memory store with queued notification delivery.
#[derive(Default)]
pub struct MemoryStore {
    collections: RefCell<BTreeMap<CollectionPath, Collection>>,
    sequence: Cell<i64>,
    watchers: WatchRegistry,
    rejection: RefCell<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers every queued notification and returns how many reached a sink.
    pub fn deliver_pending(&self) -> usize {
        self.watchers.deliver_pending()
    }

    pub fn pending_count(&self) -> usize {
        self.watchers.pending_count()
    }

    /// Number of watches currently registered.
    pub fn active_watch_count(&self) -> usize {
        self.watchers.active_count()
    }

    /// Queues a transport failure for every watch on `collection`.
    pub fn fail_transport(&self, collection: &CollectionPath, message: &str) {
        for (id, _) in self.watchers.watches_on(collection) {
            self.watchers
                .enqueue(id, WatchEvent::TransportError(message.to_string()));
        }
    }

    /// Makes the next mutation fail with `StoreError::Rejected`.
    pub fn reject_next_mutation(&self, message: &str) {
        *self.rejection.borrow_mut() = Some(message.to_string());
    }

    /// Current documents of `collection`, ordered by `order_field`.
    pub fn documents(&self, collection: &CollectionPath, order_field: &str) -> Vec<Document> {
        let mut documents = self
            .collections
            .borrow()
            .get(collection)
            .map(|docs| docs.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        sort_documents(&mut documents, order_field);
        documents
    }

    /// Returns one document by id.
    pub fn get(&self, collection: &CollectionPath, document_id: &str) -> Option<Document> {
        self.collections
            .borrow()
            .get(collection)
            .and_then(|docs| docs.get(document_id))
            .cloned()
    }

    /// Seeds one document without going through the rejection hook.
    pub fn seed(
        &self,
        collection: &CollectionPath,
        document_id: &str,
        fields: Fields,
    ) -> StoreResult<()> {
        let pending_rejection = self.rejection.borrow_mut().take();
        let result = self.mutate(collection, document_id, Mutation::Set(fields));
        *self.rejection.borrow_mut() = pending_rejection;
        result
    }

    fn next_sequence(&self) -> i64 {
        let next = self.sequence.get() + 1;
        self.sequence.set(next);
        next
    }

    fn notify(&self, collection: &CollectionPath) {
        for (id, order_field) in self.watchers.watches_on(collection) {
            let snapshot = self.documents(collection, &order_field);
            self.watchers.enqueue(id, WatchEvent::Snapshot(snapshot));
        }
    }
}

impl DocumentStore for MemoryStore {
    fn watch(
        &self,
        collection: &CollectionPath,
        order_field: &str,
        sink: WatchSink,
    ) -> StoreResult<WatchId> {
        let id = self.watchers.register(collection, order_field, sink);
        let snapshot = self.documents(collection, order_field);
        self.watchers.enqueue(id, WatchEvent::Snapshot(snapshot));
        debug!(
            "event=store_watch module=store status=ok backend=memory watch_id={}",
            id.0
        );
        Ok(id)
    }

    fn unwatch(&self, id: WatchId) -> bool {
        self.watchers.remove(id)
    }

    fn mutate(
        &self,
        collection: &CollectionPath,
        document_id: &str,
        mutation: Mutation,
    ) -> StoreResult<()> {
        validate_document_id(collection, document_id)?;
        if let Some(message) = self.rejection.borrow_mut().take() {
            warn!(
                "event=store_mutate module=store status=error backend=memory op={} error_code=rejected",
                mutation.label()
            );
            return Err(StoreError::Rejected(message));
        }

        let op = mutation.label();
        let changed = {
            let mut collections = self.collections.borrow_mut();
            let docs = collections.entry(collection.clone()).or_default();
            let current = docs.get(document_id).map(|doc| &doc.fields);
            let (next, changed) = apply_mutation(collection, document_id, current, mutation)?;
            match next {
                Some(fields) => match docs.get_mut(document_id) {
                    Some(existing) => existing.fields = fields,
                    None => {
                        let created_at = self.next_sequence();
                        docs.insert(
                            document_id.to_string(),
                            Document::new(document_id, created_at, fields),
                        );
                    }
                },
                None => {
                    docs.remove(document_id);
                }
            }
            changed
        };

        debug!(
            "event=store_mutate module=store status=ok backend=memory op={op} changed={changed}"
        );
        if changed {
            self.notify(collection);
        }
        Ok(())
    }
}
