//! Backing store boundary.
//!
//! # Responsibility
//! - Define the `watch`/`mutate` contract the engine consumes.
//! - Provide in-process (`MemoryStore`) and SQLite (`SqliteStore`) backends.
//!
//! # Invariants
//! - Every watch notification carries the complete collection (full replace).
//! - Notifications are queued and only delivered by `deliver_pending()`, so
//!   delivery is always asynchronous relative to the write that caused it.
//! - After `unwatch`, queued notifications for that watch are dropped.

use crate::db::DbError;
use crate::model::document::{CollectionPath, Document, Fields};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub mod memory;
pub mod sqlite;
mod watchers;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level error for watch registration and mutations.
#[derive(Debug)]
pub enum StoreError {
    InvalidPath(String),
    NotFound {
        collection: CollectionPath,
        document_id: String,
    },
    /// The store refused the write (permission, validation, transport).
    Rejected(String),
    InvalidData(String),
    Db(DbError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(path) => write!(f, "invalid collection path `{path}`"),
            Self::NotFound {
                collection,
                document_id,
            } => write!(f, "document not found: {collection}/{document_id}"),
            Self::Rejected(message) => write!(f, "mutation rejected: {message}"),
            Self::InvalidData(message) => write!(f, "invalid stored document: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Point mutation against one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Replaces the whole body, creating the document when missing.
    Set(Fields),
    /// Shallow field patch; the document must exist.
    Merge(Fields),
    /// Removes the document. Deleting a missing document is a no-op.
    Delete,
}

impl Mutation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Merge(_) => "merge",
            Self::Delete => "delete",
        }
    }
}

/// One notification pushed to a watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// Complete current member list, ordered by the watch's order field.
    Snapshot(Vec<Document>),
    /// The push channel failed; the previous snapshot stays authoritative.
    TransportError(String),
}

/// Receiver for watch notifications.
pub type WatchSink = Rc<dyn Fn(WatchEvent)>;

/// Handle of one registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(pub(crate) u64);

/// Realtime document store as seen by the engine.
pub trait DocumentStore {
    /// Registers a full-collection watch. The current contents are queued as
    /// the first notification.
    fn watch(
        &self,
        collection: &CollectionPath,
        order_field: &str,
        sink: WatchSink,
    ) -> StoreResult<WatchId>;

    /// Releases a watch and drops its queued notifications.
    ///
    /// Returns `false` when the watch was already released.
    fn unwatch(&self, id: WatchId) -> bool;

    /// Applies one point mutation.
    fn mutate(
        &self,
        collection: &CollectionPath,
        document_id: &str,
        mutation: Mutation,
    ) -> StoreResult<()>;

    /// Creates a document with a store-generated id and returns that id.
    fn insert(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String> {
        let document_id = uuid::Uuid::new_v4().to_string();
        self.mutate(collection, &document_id, Mutation::Set(fields))?;
        Ok(document_id)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for Rc<S> {
    fn watch(
        &self,
        collection: &CollectionPath,
        order_field: &str,
        sink: WatchSink,
    ) -> StoreResult<WatchId> {
        (**self).watch(collection, order_field, sink)
    }

    fn unwatch(&self, id: WatchId) -> bool {
        (**self).unwatch(id)
    }

    fn mutate(
        &self,
        collection: &CollectionPath,
        document_id: &str,
        mutation: Mutation,
    ) -> StoreResult<()> {
        (**self).mutate(collection, document_id, mutation)
    }

    fn insert(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String> {
        (**self).insert(collection, fields)
    }
}

pub(crate) fn validate_document_id(
    collection: &CollectionPath,
    document_id: &str,
) -> StoreResult<()> {
    let trimmed = document_id.trim();
    if trimmed.is_empty() || trimmed.contains('/') || trimmed != document_id {
        return Err(StoreError::InvalidPath(format!("{collection}/{document_id}")));
    }
    Ok(())
}

/// Applies `mutation` to an optional current body.
///
/// Returns the new body (`None` when deleted) and whether anything changed.
pub(crate) fn apply_mutation(
    collection: &CollectionPath,
    document_id: &str,
    current: Option<&Fields>,
    mutation: Mutation,
) -> StoreResult<(Option<Fields>, bool)> {
    match mutation {
        Mutation::Set(fields) => {
            let changed = current != Some(&fields);
            Ok((Some(fields), changed))
        }
        Mutation::Merge(patch) => {
            let Some(current) = current else {
                return Err(StoreError::NotFound {
                    collection: collection.clone(),
                    document_id: document_id.to_string(),
                });
            };
            let mut merged = current.clone();
            for (key, value) in patch {
                merged.insert(key, value);
            }
            let changed = &merged != current;
            Ok((Some(merged), changed))
        }
        Mutation::Delete => Ok((None, current.is_some())),
    }
}
