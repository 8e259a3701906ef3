use goalsync_core::db::migrations::latest_version;
use goalsync_core::db::{open_db, open_db_in_memory, DbError};
use goalsync_core::feed::{error_listener, snapshot_listener};
use goalsync_core::{
    ChangeFeed, CollectionPath, DocumentStore, Fields, Item, Mutation, SqliteStore, StoreError,
};
use rusqlite::Connection;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

fn notes() -> CollectionPath {
    CollectionPath::parse("notes").unwrap()
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn table_exists(conn: &Connection, table_name: &str) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table_name],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        == 1
}

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert!(table_exists(&conn, "documents"));
    assert!(table_exists(&conn, "store_sequence"));
}

#[test]
fn newer_schema_version_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        SqliteStore::open(&path),
        Err(StoreError::Db(DbError::UnsupportedSchemaVersion { .. }))
    ));
}

#[test]
fn documents_survive_reopen_with_stable_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.sqlite3");

    let store = SqliteStore::open(&path).unwrap();
    store
        .mutate(&notes(), "n1", Mutation::Set(fields(json!({"title": "First"}))))
        .unwrap();
    store
        .mutate(&notes(), "n2", Mutation::Set(fields(json!({"title": "Second"}))))
        .unwrap();
    store
        .mutate(&notes(), "n1", Mutation::Merge(fields(json!({"completed": true}))))
        .unwrap();
    drop(store);

    let reopened = SqliteStore::open(&path).unwrap();
    let documents = reopened.documents(&notes(), "createdAt").unwrap();
    let ids: Vec<&str> = documents.iter().map(|doc| doc.id.as_str()).collect();
    assert_eq!(ids, vec!["n1", "n2"]);
    assert_eq!(documents[0].fields["completed"], json!(true));
    assert!(documents[0].created_at < documents[1].created_at);

    let id = reopened
        .insert(&notes(), fields(json!({"title": "Third"})))
        .unwrap();
    let documents = reopened.documents(&notes(), "createdAt").unwrap();
    assert_eq!(documents.last().unwrap().id, id);
}

#[test]
fn deleted_sequence_numbers_are_not_reused() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .mutate(&notes(), "a", Mutation::Set(fields(json!({"title": "A"}))))
        .unwrap();
    store.mutate(&notes(), "a", Mutation::Delete).unwrap();
    store
        .mutate(&notes(), "b", Mutation::Set(fields(json!({"title": "B"}))))
        .unwrap();
    assert_eq!(store.documents(&notes(), "createdAt").unwrap()[0].created_at, 2);
}

#[test]
fn change_feed_over_sqlite_receives_queued_snapshots() {
    let store = Rc::new(SqliteStore::open_in_memory().unwrap());
    store
        .mutate(&notes(), "n1", Mutation::Set(fields(json!({"title": "Draft"}))))
        .unwrap();

    let seen: Rc<RefCell<Vec<Vec<Item>>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let subscription = ChangeFeed::new(notes())
        .subscribe(
            store.clone(),
            snapshot_listener(move |items| sink.borrow_mut().push(items.to_vec())),
            error_listener(|_| {}),
        )
        .unwrap();

    store
        .mutate(&notes(), "n1", Mutation::Merge(fields(json!({"title": "Final"}))))
        .unwrap();
    assert!(seen.borrow().is_empty());
    assert_eq!(store.deliver_pending(), 2);

    let seen = seen.borrow();
    assert_eq!(seen[0][0].title, "Draft");
    assert_eq!(seen[1][0].title, "Final");
    subscription.unsubscribe();
    assert_eq!(store.active_watch_count(), 0);
}

#[test]
fn unchanged_write_queues_no_notification() {
    let store = Rc::new(SqliteStore::open_in_memory().unwrap());
    store
        .mutate(&notes(), "n1", Mutation::Set(fields(json!({"title": "Same"}))))
        .unwrap();
    let _subscription = ChangeFeed::new(notes())
        .subscribe(store.clone(), snapshot_listener(|_| {}), error_listener(|_| {}))
        .unwrap();
    assert_eq!(store.pending_count(), 1);

    store
        .mutate(&notes(), "n1", Mutation::Set(fields(json!({"title": "Same"}))))
        .unwrap();
    assert_eq!(store.pending_count(), 1);
}

#[test]
fn merge_on_missing_document_is_not_found() {
    let store = SqliteStore::open_in_memory().unwrap();
    let error = store
        .mutate(&notes(), "ghost", Mutation::Merge(fields(json!({"title": "x"}))))
        .unwrap_err();
    assert!(matches!(error, StoreError::NotFound { .. }));
}

#[test]
fn malformed_body_decodes_as_empty_item() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO documents (collection, doc_id, created_seq, body) VALUES ('notes', 'bad', 1, '[1,2]');",
        [],
    )
    .unwrap();
    let store = SqliteStore::from_connection(conn);

    let documents = store.documents(&notes(), "createdAt").unwrap();
    let item = Item::from_document(&documents[0], "");
    assert_eq!(item.id, "bad");
    assert_eq!(item.title, "");
}
