//! SQLite-backed local document cache.
//!
//! # Responsibility
//! - Persist documents as JSON bodies keyed by `(collection, doc_id)`.
//! - Offer the same queued watch semantics as `MemoryStore`.
//!
//! # Invariants
//! - Each write runs in its own transaction; notifications are queued only
//!   after commit.
//! - A stored body that is not a JSON object decodes as an empty body.

use super::watchers::{sort_documents, WatchRegistry};
use super::{
    apply_mutation, validate_document_id, DocumentStore, Mutation, StoreResult, WatchEvent,
    WatchId, WatchSink,
};
use crate::db::{open_db, open_db_in_memory};
use crate::model::document::{CollectionPath, Document, Fields};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Document store persisted in a local SQLite database.
pub struct SqliteStore {
    conn: Connection,
    watchers: WatchRegistry,
}

impl SqliteStore {
    /// Opens a cache file, applying migrations.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection that already has migrations applied.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            watchers: WatchRegistry::default(),
        }
    }

    pub fn deliver_pending(&self) -> usize {
        self.watchers.deliver_pending()
    }

    pub fn pending_count(&self) -> usize {
        self.watchers.pending_count()
    }

    pub fn active_watch_count(&self) -> usize {
        self.watchers.active_count()
    }

    /// Loads `collection` ordered by `order_field`.
    pub fn documents(
        &self,
        collection: &CollectionPath,
        order_field: &str,
    ) -> StoreResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_id, created_seq, body
             FROM documents
             WHERE collection = ?1
             ORDER BY created_seq ASC, doc_id ASC;",
        )?;
        let mut rows = stmt.query([collection.as_str()])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let doc_id: String = row.get("doc_id")?;
            let created_seq: i64 = row.get("created_seq")?;
            let body: String = row.get("body")?;
            documents.push(Document::new(doc_id, created_seq, decode_body(&body)));
        }
        sort_documents(&mut documents, order_field);
        Ok(documents)
    }

    fn load_fields(
        &self,
        collection: &CollectionPath,
        document_id: &str,
    ) -> StoreResult<Option<Fields>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2;",
                params![collection.as_str(), document_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body.map(|body| decode_body(&body)))
    }

    fn notify(&self, collection: &CollectionPath) {
        for (id, order_field) in self.watchers.watches_on(collection) {
            match self.documents(collection, &order_field) {
                Ok(snapshot) => self.watchers.enqueue(id, WatchEvent::Snapshot(snapshot)),
                Err(err) => {
                    warn!(
                        "event=store_notify module=store status=error backend=sqlite error={err}"
                    );
                    self.watchers
                        .enqueue(id, WatchEvent::TransportError(err.to_string()));
                }
            }
        }
    }
}

impl DocumentStore for SqliteStore {
    fn watch(
        &self,
        collection: &CollectionPath,
        order_field: &str,
        sink: WatchSink,
    ) -> StoreResult<WatchId> {
        let snapshot = self.documents(collection, order_field)?;
        let id = self.watchers.register(collection, order_field, sink);
        self.watchers.enqueue(id, WatchEvent::Snapshot(snapshot));
        debug!("event=store_watch module=store status=ok backend=sqlite");
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
        let op = mutation.label();

        let tx = self.conn.unchecked_transaction()?;
        let current = self.load_fields(collection, document_id)?;
        let (next, changed) = apply_mutation(collection, document_id, current.as_ref(), mutation)?;
        if changed {
            match (current.is_some(), next) {
                (_, None) => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2;",
                        params![collection.as_str(), document_id],
                    )?;
                }
                (true, Some(fields)) => {
                    tx.execute(
                        "UPDATE documents
                         SET body = ?3, updated_at = (strftime('%s', 'now') * 1000)
                         WHERE collection = ?1 AND doc_id = ?2;",
                        params![collection.as_str(), document_id, encode_body(&fields)],
                    )?;
                }
                (false, Some(fields)) => {
                    tx.execute(
                        "UPDATE store_sequence SET last_seq = last_seq + 1 WHERE id = 1;",
                        [],
                    )?;
                    let created_seq: i64 = tx.query_row(
                        "SELECT last_seq FROM store_sequence WHERE id = 1;",
                        [],
                        |row| row.get(0),
                    )?;
                    tx.execute(
                        "INSERT INTO documents (collection, doc_id, created_seq, body)
                         VALUES (?1, ?2, ?3, ?4);",
                        params![
                            collection.as_str(),
                            document_id,
                            created_seq,
                            encode_body(&fields)
                        ],
                    )?;
                }
            }
        }
        tx.commit()?;

        debug!("event=store_mutate module=store status=ok backend=sqlite op={op} changed={changed}");
        if changed {
            self.notify(collection);
        }
        Ok(())
    }
}

fn encode_body(fields: &Fields) -> String {
    serde_json::Value::Object(fields.clone()).to_string()
}

fn decode_body(body: &str) -> Fields {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(fields)) => fields,
        _ => {
            warn!("event=store_decode module=store status=degraded backend=sqlite reason=non_object_body");
            Fields::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_body, SqliteStore};
    use crate::model::document::{CollectionPath, Fields};
    use crate::store::{DocumentStore, Mutation};
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn non_object_body_decodes_as_empty() {
        assert!(decode_body("[1, 2]").is_empty());
        assert!(decode_body("{not json").is_empty());
    }

    #[test]
    fn set_merge_delete_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let path = CollectionPath::parse("categories/c1/goals").unwrap();

        store
            .mutate(&path, "g1", Mutation::Set(fields(json!({"title": "Read"}))))
            .unwrap();
        store
            .mutate(&path, "g1", Mutation::Merge(fields(json!({"completed": true}))))
            .unwrap();

        let docs = store.documents(&path, "createdAt").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fields["title"], json!("Read"));
        assert_eq!(docs[0].fields["completed"], json!(true));
        assert_eq!(docs[0].created_at, 1);

        store.mutate(&path, "g1", Mutation::Delete).unwrap();
        assert!(store.documents(&path, "createdAt").unwrap().is_empty());
    }
}
