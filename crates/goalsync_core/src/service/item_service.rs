//! Item intent service.
//!
//! # Responsibility
//! - Provide create/complete/delete/reschedule/priority/rename entry points.
//! - Translate intents into `Set`/`Merge`/`Delete` store mutations.
//!
//! # Invariants
//! - The service never reads or patches the merged set; the resulting store
//!   notification is the only path back into views.
//! - Failed mutations surface as `Err`; there is no local state to roll back.
//! - Titles are trimmed and must not be empty.

use crate::model::document::{CollectionPath, Fields};
use crate::model::item::{fields, format_date, Item, ItemId, Priority};
use crate::store::{DocumentStore, Mutation, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ItemServiceResult<T> = Result<T, ItemServiceError>;

/// Service error for item intents.
#[derive(Debug)]
pub enum ItemServiceError {
    /// Title is empty after trimming.
    EmptyTitle,
    /// Backing store failure.
    Store(StoreError),
}

impl Display for ItemServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "item title must not be empty"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ItemServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::EmptyTitle => None,
        }
    }
}

impl From<StoreError> for ItemServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Intent facade over a document store.
pub struct ItemService<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> ItemService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates one item in `collection` and returns the store-assigned id.
    ///
    /// The draft's `id`, `owner_scope` and `created_at` are ignored.
    pub fn create_item(
        &self,
        collection: &CollectionPath,
        draft: &Item,
    ) -> ItemServiceResult<ItemId> {
        let title = normalize_title(&draft.title)?;
        let mut item = draft.clone();
        item.title = title;
        let id = self.store.insert(collection, item.to_fields()).inspect_err(|err| {
            warn!("event=item_create module=service status=error error={err}");
        })?;
        info!(
            "event=item_create module=service status=ok kind={}",
            item.kind.label()
        );
        Ok(id)
    }

    pub fn mark_done(&self, collection: &CollectionPath, item_id: &str) -> ItemServiceResult<()> {
        self.set_completed(collection, item_id, true)
    }

    pub fn set_completed(
        &self,
        collection: &CollectionPath,
        item_id: &str,
        completed: bool,
    ) -> ItemServiceResult<()> {
        self.merge(
            "item_set_completed",
            collection,
            item_id,
            [(fields::COMPLETED, Value::from(completed))],
        )
    }

    /// Flips `completed` relative to the item as currently rendered.
    ///
    /// Returns the value written.
    pub fn toggle_completed(
        &self,
        collection: &CollectionPath,
        item: &Item,
    ) -> ItemServiceResult<bool> {
        let next = !item.completed;
        self.set_completed(collection, &item.id, next)?;
        Ok(next)
    }

    /// Replaces both schedule fields; `None` clears a field.
    pub fn reschedule(
        &self,
        collection: &CollectionPath,
        item_id: &str,
        date: Option<NaiveDate>,
        time: Option<DateTime<Utc>>,
    ) -> ItemServiceResult<()> {
        self.merge(
            "item_reschedule",
            collection,
            item_id,
            [
                (
                    fields::SCHEDULED_DATE,
                    date.map_or(Value::Null, |date| Value::from(format_date(date))),
                ),
                (
                    fields::SCHEDULED_TIME,
                    time.map_or(Value::Null, |time| Value::from(time.to_rfc3339())),
                ),
            ],
        )
    }

    pub fn set_priority(
        &self,
        collection: &CollectionPath,
        item_id: &str,
        priority: Option<Priority>,
    ) -> ItemServiceResult<()> {
        self.merge(
            "item_set_priority",
            collection,
            item_id,
            [(
                fields::PRIORITY,
                priority.map_or(Value::Null, |priority| Value::from(priority.label())),
            )],
        )
    }

    pub fn rename(
        &self,
        collection: &CollectionPath,
        item_id: &str,
        title: &str,
    ) -> ItemServiceResult<()> {
        let title = normalize_title(title)?;
        self.merge(
            "item_rename",
            collection,
            item_id,
            [(fields::TITLE, Value::from(title))],
        )
    }

    /// Deletes one item. Deleting an absent item is not an error.
    pub fn delete_item(&self, collection: &CollectionPath, item_id: &str) -> ItemServiceResult<()> {
        self.store
            .mutate(collection, item_id, Mutation::Delete)
            .inspect_err(|err| {
                warn!("event=item_delete module=service status=error error={err}");
            })?;
        info!("event=item_delete module=service status=ok");
        Ok(())
    }

    fn merge<const N: usize>(
        &self,
        event: &str,
        collection: &CollectionPath,
        item_id: &str,
        patch: [(&str, Value); N],
    ) -> ItemServiceResult<()> {
        let patch: Fields = patch
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        match self.store.mutate(collection, item_id, Mutation::Merge(patch)) {
            Ok(()) => {
                info!("event={event} module=service status=ok");
                Ok(())
            }
            Err(err) => {
                warn!("event={event} module=service status=error error={err}");
                Err(err.into())
            }
        }
    }
}

fn normalize_title(title: &str) -> ItemServiceResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ItemServiceError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{ItemService, ItemServiceError};
    use crate::model::document::CollectionPath;
    use crate::model::item::Item;
    use crate::store::MemoryStore;

    #[test]
    fn create_rejects_blank_titles() {
        let service = ItemService::new(MemoryStore::new());
        let path = CollectionPath::parse("tasks").unwrap();
        let result = service.create_item(&path, &Item::new("", "   "));
        assert!(matches!(result, Err(ItemServiceError::EmptyTitle)));
        assert!(service.store().documents(&path, "createdAt").is_empty());
    }

    #[test]
    fn create_trims_title_and_assigns_id() {
        let service = ItemService::new(MemoryStore::new());
        let path = CollectionPath::parse("tasks").unwrap();
        let id = service
            .create_item(&path, &Item::new("ignored", "  Water plants "))
            .unwrap();
        assert_ne!(id, "ignored");
        let stored = service.store().get(&path, &id).unwrap();
        assert_eq!(stored.fields["title"], "Water plants");
    }
}
