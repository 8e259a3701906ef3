//! Watch registry and queued notification delivery shared by store backends.

use super::{WatchEvent, WatchId, WatchSink};
use crate::model::document::{CollectionPath, Document};
use log::debug;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

struct WatchEntry {
    collection: CollectionPath,
    order_field: String,
    sink: WatchSink,
}

#[derive(Default)]
pub(crate) struct WatchRegistry {
    next_id: Cell<u64>,
    entries: RefCell<BTreeMap<WatchId, WatchEntry>>,
    pending: RefCell<VecDeque<(WatchId, WatchEvent)>>,
}

impl WatchRegistry {
    pub(crate) fn register(
        &self,
        collection: &CollectionPath,
        order_field: &str,
        sink: WatchSink,
    ) -> WatchId {
        let id = WatchId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.entries.borrow_mut().insert(
            id,
            WatchEntry {
                collection: collection.clone(),
                order_field: order_field.to_string(),
                sink,
            },
        );
        id
    }

    pub(crate) fn remove(&self, id: WatchId) -> bool {
        let removed = self.entries.borrow_mut().remove(&id).is_some();
        if removed {
            self.pending
                .borrow_mut()
                .retain(|(pending_id, _)| *pending_id != id);
        }
        removed
    }

    /// Returns `(watch, order_field)` for every watch on `collection`.
    pub(crate) fn watches_on(&self, collection: &CollectionPath) -> Vec<(WatchId, String)> {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, entry)| &entry.collection == collection)
            .map(|(id, entry)| (*id, entry.order_field.clone()))
            .collect()
    }

    pub(crate) fn enqueue(&self, id: WatchId, event: WatchEvent) {
        self.pending.borrow_mut().push_back((id, event));
    }

    /// Delivers the notifications queued before this call.
    ///
    /// Notifications queued by sinks during delivery wait for the next call.
    /// A watch released mid-batch receives nothing further.
    pub(crate) fn deliver_pending(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.borrow_mut());
        let mut delivered = 0;
        for (id, event) in batch {
            let sink = self.entries.borrow().get(&id).map(|entry| entry.sink.clone());
            let Some(sink) = sink else {
                debug!(
                    "event=watch_deliver module=store status=dropped watch_id={}",
                    id.0
                );
                continue;
            };
            sink(event);
            delivered += 1;
        }
        delivered
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Orders documents ascending by `order_field`; missing values sort last,
/// ties are broken by document id.
pub(crate) fn sort_documents(documents: &mut [Document], order_field: &str) {
    documents.sort_by(|left, right| {
        compare_order_values(
            left.order_value(order_field).as_ref(),
            right.order_value(order_field).as_ref(),
        )
        .then_with(|| left.id.cmp(&right.id))
    });
}

fn compare_order_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(left), Some(right)) => match (left, right) {
            (Value::Number(a), Value::Number(b)) => {
                let a = a.as_f64().unwrap_or(f64::MAX);
                let b = b.as_f64().unwrap_or(f64::MAX);
                a.total_cmp(&b)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => type_rank(left)
                .cmp(&type_rank(right))
                .then_with(|| left.to_string().cmp(&right.to_string())),
        },
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::{sort_documents, WatchRegistry};
    use crate::model::document::{CollectionPath, Document, Fields};
    use crate::store::WatchEvent;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn doc(id: &str, created_at: i64, body: serde_json::Value) -> Document {
        let fields: Fields = body.as_object().cloned().unwrap_or_default();
        Document::new(id, created_at, fields)
    }

    #[test]
    fn sort_puts_missing_values_last_and_breaks_ties_by_id() {
        let mut docs = vec![
            doc("c", 1, json!({})),
            doc("b", 2, json!({"rank": 1})),
            doc("a", 3, json!({"rank": 1})),
            doc("d", 4, json!({"rank": 0})),
        ];
        sort_documents(&mut docs, "rank");
        let ids: Vec<&str> = docs.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn removed_watch_drops_queued_events() {
        let registry = WatchRegistry::default();
        let seen = Rc::new(RefCell::new(0));
        let seen_in_sink = seen.clone();
        let path = CollectionPath::parse("notes").unwrap();
        let id = registry.register(
            &path,
            "createdAt",
            Rc::new(move |_: WatchEvent| *seen_in_sink.borrow_mut() += 1),
        );

        registry.enqueue(id, WatchEvent::Snapshot(Vec::new()));
        assert!(registry.remove(id));
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.deliver_pending(), 0);
        assert_eq!(*seen.borrow(), 0);
        assert!(!registry.remove(id));
    }
}
