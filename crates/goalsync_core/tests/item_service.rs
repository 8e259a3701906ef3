use chrono::{DateTime, NaiveDate, Utc};
use goalsync_core::{
    CollectionPath, Item, ItemKind, ItemService, ItemServiceError, MemoryStore, Priority,
    StoreError,
};
use serde_json::{json, Value};
use std::rc::Rc;

fn tasks() -> CollectionPath {
    CollectionPath::parse("tasks").unwrap()
}

fn stored(store: &MemoryStore, id: &str) -> Item {
    let document = store.get(&tasks(), id).unwrap();
    Item::from_document(&document, "")
}

fn service_with_task() -> (ItemService<Rc<MemoryStore>>, String) {
    let store = Rc::new(MemoryStore::new());
    let service = ItemService::new(store);
    let mut draft = Item::new("", "Pay rent");
    draft.kind = ItemKind::Task;
    draft.scheduled_date = NaiveDate::from_ymd_opt(2024, 2, 1);
    let id = service.create_item(&tasks(), &draft).unwrap();
    (service, id)
}

#[test]
fn create_item_persists_every_field() {
    let store = Rc::new(MemoryStore::new());
    let service = ItemService::new(store.clone());
    let mut draft = Item::new("", "Plan trip");
    draft.kind = ItemKind::Goal;
    draft.note = Some("book early".to_string());
    draft.is_recurring = true;
    draft.priority = Some(Priority::High);

    let id = service.create_item(&tasks(), &draft).unwrap();
    let item = stored(&store, &id);
    assert_eq!(item.title, "Plan trip");
    assert_eq!(item.kind, ItemKind::Goal);
    assert_eq!(item.note.as_deref(), Some("book early"));
    assert!(item.is_recurring);
    assert_eq!(item.priority, Some(Priority::High));
    assert!(item.created_at > 0);
}

#[test]
fn toggle_completed_writes_the_flipped_value() {
    let (service, id) = service_with_task();
    let item = stored(service.store(), &id);

    assert!(service.toggle_completed(&tasks(), &item).unwrap());
    let item = stored(service.store(), &id);
    assert!(item.completed);

    assert!(!service.toggle_completed(&tasks(), &item).unwrap());
    assert!(!stored(service.store(), &id).completed);
}

#[test]
fn reschedule_sets_and_clears_both_fields() {
    let (service, id) = service_with_task();
    let time = DateTime::<Utc>::from_timestamp(1_706_781_600, 0).unwrap();

    service
        .reschedule(&tasks(), &id, NaiveDate::from_ymd_opt(2024, 2, 3), Some(time))
        .unwrap();
    let item = stored(service.store(), &id);
    assert_eq!(item.scheduled_date, NaiveDate::from_ymd_opt(2024, 2, 3));
    assert_eq!(item.scheduled_time, Some(time));

    service.reschedule(&tasks(), &id, None, None).unwrap();
    let document = service.store().get(&tasks(), &id).unwrap();
    assert_eq!(document.fields["scheduledDate"], Value::Null);
    let item = Item::from_document(&document, "");
    assert_eq!(item.scheduled_date, None);
    assert_eq!(item.scheduled_time, None);
}

#[test]
fn merge_intents_touch_only_their_fields() {
    let (service, id) = service_with_task();

    service.set_priority(&tasks(), &id, Some(Priority::Highest)).unwrap();
    service.rename(&tasks(), &id, "  Pay rent today ").unwrap();

    let item = stored(service.store(), &id);
    assert_eq!(item.priority, Some(Priority::Highest));
    assert_eq!(item.title, "Pay rent today");
    assert_eq!(item.scheduled_date, NaiveDate::from_ymd_opt(2024, 2, 1));

    service.set_priority(&tasks(), &id, None).unwrap();
    assert_eq!(stored(service.store(), &id).priority, None);
}

#[test]
fn rename_rejects_blank_title_without_writing() {
    let (service, id) = service_with_task();
    let result = service.rename(&tasks(), &id, "   ");
    assert!(matches!(result, Err(ItemServiceError::EmptyTitle)));
    assert_eq!(stored(service.store(), &id).title, "Pay rent");
}

#[test]
fn mutations_on_missing_items_surface_not_found() {
    let (service, _) = service_with_task();
    let error = service.mark_done(&tasks(), "ghost").unwrap_err();
    match error {
        ItemServiceError::Store(StoreError::NotFound { document_id, .. }) => {
            assert_eq!(document_id, "ghost")
        }
        other => panic!("unexpected error: {other}"),
    }
    // Deleting an absent item is a no-op.
    service.delete_item(&tasks(), "ghost").unwrap();
}

#[test]
fn rejected_mutation_is_returned_and_nothing_changes() {
    let (service, id) = service_with_task();
    service.store().reject_next_mutation("permission denied");

    let error = service.delete_item(&tasks(), &id).unwrap_err();
    assert!(matches!(error, ItemServiceError::Store(StoreError::Rejected(_))));
    assert!(error.to_string().contains("permission denied"));
    assert!(service.store().get(&tasks(), &id).is_some());

    service.delete_item(&tasks(), &id).unwrap();
    assert!(service.store().get(&tasks(), &id).is_none());
}

#[test]
fn service_never_delivers_notifications_itself() {
    let (service, id) = service_with_task();
    let before = service.store().pending_count();
    service.mark_done(&tasks(), &id).unwrap();
    assert_eq!(service.store().pending_count(), before);
    assert_eq!(service.store().documents(&tasks(), "createdAt").len(), 1);
    assert_eq!(json!(true), service.store().get(&tasks(), &id).unwrap().fields["completed"]);
}
