//! FFI view and intent API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the view pipeline and bucketing to Dart via FRB.
//! - Route item intents into the local SQLite document cache.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - Failures are reported in response envelopes, never as panics.
//! - Dates cross the boundary as `YYYY-MM-DD`, instants as epoch milliseconds.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use goalsync_core::bucket::BucketPredicate;
use goalsync_core::model::item::format_date;
use goalsync_core::{
    bucket, core_version as core_version_inner, default_predicates,
    init_logging as init_logging_inner, ping as ping_inner, transform, CollectionPath, Item,
    ItemKind, ItemService, ItemServiceError, Priority, SqliteStore, ViewOptions,
};
use log::warn;
use std::path::PathBuf;
use std::sync::OnceLock;

const CACHE_DB_FILE_NAME: &str = "goalsync_cache.sqlite3";
const CACHE_ORDER_FIELD: &str = "createdAt";
static CACHE_DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes core logging once per process.
///
/// # FFI contract
/// - `level`: `trace|debug|info|warn|error`, case-insensitive.
/// - `log_dir`: absolute directory for rolling logs.
/// - Idempotent for the same `level + log_dir`; other reconfiguration fails.
/// - Returns an empty string on success and the error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Item as exchanged with the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDto {
    pub id: String,
    /// Parent/category id; empty for top-level items.
    pub owner_scope: String,
    /// `task|routine|goal|milestone|objective|note`.
    pub kind: String,
    pub title: String,
    pub note: Option<String>,
    /// `YYYY-MM-DD`.
    pub scheduled_date: Option<String>,
    pub scheduled_time_epoch_ms: Option<i64>,
    pub is_all_day: bool,
    pub is_recurring: bool,
    /// `normal|high|highest`; anything else is unset.
    pub priority: Option<String>,
    pub completed: bool,
    pub created_at: i64,
}

/// One row of the rendered view sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRowDto {
    pub item: ItemDto,
    pub group_key: Option<String>,
}

/// Envelope for `view_transform`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTransformResponse {
    pub ok: bool,
    pub rows: Vec<ViewRowDto>,
    pub message: String,
}

/// Bucket membership by item id, in predicate order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDto {
    pub name: String,
    pub item_ids: Vec<String>,
}

/// Envelope for `view_buckets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewBucketsResponse {
    pub ok: bool,
    pub buckets: Vec<BucketDto>,
    /// Reference day the buckets were computed for.
    pub reference_date: String,
    pub message: String,
}

/// Envelope for item intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemActionResponse {
    pub ok: bool,
    /// Created item id for `item_create`.
    pub item_id: Option<String>,
    pub message: String,
}

impl ItemActionResponse {
    fn success(message: impl Into<String>, item_id: Option<String>) -> Self {
        Self {
            ok: true,
            item_id,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            item_id: None,
            message: message.into(),
        }
    }
}

/// Filters, sorts and groups `items` for display.
///
/// # FFI contract
/// - `sort_by`: `none|lexical|time|date`; `group_by`: `none|day|priority`.
/// - Blank `search_text` disables filtering.
/// - Unknown labels return `ok=false` and no rows.
#[flutter_rust_bridge::frb(sync)]
pub fn view_transform(
    items: Vec<ItemDto>,
    sort_by: String,
    group_by: String,
    search_text: String,
) -> ViewTransformResponse {
    let options = match ViewOptions::from_labels(&sort_by, &group_by, search_text) {
        Ok(options) => options,
        Err(err) => {
            return ViewTransformResponse {
                ok: false,
                rows: Vec::new(),
                message: format!("view_transform failed: {err}"),
            }
        }
    };
    let items = items.iter().map(from_dto).collect::<Vec<_>>();
    let rows = transform(&items, &options)
        .into_iter()
        .map(|row| ViewRowDto {
            item: to_dto(&row.item),
            group_key: row.group_key,
        })
        .collect::<Vec<_>>();
    ViewTransformResponse {
        ok: true,
        message: format!("{} row(s).", rows.len()),
        rows,
    }
}

/// Partitions `items` into named buckets at the given instant.
///
/// # FFI contract
/// - `now_epoch_ms` + `utc_offset_minutes` define the reference instant;
///   "today" is its calendar day in that offset.
/// - Empty `bucket_names` selects `today|overdue|done`.
/// - Unknown bucket names or an invalid instant return `ok=false`.
#[flutter_rust_bridge::frb(sync)]
pub fn view_buckets(
    items: Vec<ItemDto>,
    now_epoch_ms: i64,
    utc_offset_minutes: i32,
    bucket_names: Vec<String>,
) -> ViewBucketsResponse {
    let failure = |message: String| ViewBucketsResponse {
        ok: false,
        buckets: Vec::new(),
        reference_date: String::new(),
        message,
    };

    let Some(reference) = reference_instant(now_epoch_ms, utc_offset_minutes) else {
        return failure(format!(
            "view_buckets failed: invalid instant {now_epoch_ms} with offset {utc_offset_minutes}"
        ));
    };
    let predicates = if bucket_names.is_empty() {
        default_predicates()
    } else {
        let mut resolved = Vec::with_capacity(bucket_names.len());
        for name in &bucket_names {
            match BucketPredicate::named(name) {
                Some(predicate) => resolved.push(predicate),
                None => return failure(format!("view_buckets failed: unknown bucket `{name}`")),
            }
        }
        resolved
    };

    let items = items.iter().map(from_dto).collect::<Vec<_>>();
    let buckets = bucket(&items, &reference, &predicates)
        .iter()
        .map(|bucket| BucketDto {
            name: bucket.name.clone(),
            item_ids: bucket.items.iter().map(|item| item.id.clone()).collect(),
        })
        .collect::<Vec<_>>();
    ViewBucketsResponse {
        ok: true,
        message: format!("{} bucket(s).", buckets.len()),
        buckets,
        reference_date: format_date(reference.date_naive()),
    }
}

/// Lists the cached items of one collection in fetch order.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Returns an empty list when the collection path is invalid or the
///   cache cannot be opened.
#[flutter_rust_bridge::frb(sync)]
pub fn collection_items(collection: String, owner_scope: String) -> Vec<ItemDto> {
    let Some(path) = CollectionPath::parse(&collection) else {
        warn!("event=ffi_collection_items module=ffi status=error reason=invalid_path");
        return Vec::new();
    };
    let store = match SqliteStore::open(resolve_cache_db_path()) {
        Ok(store) => store,
        Err(err) => {
            warn!("event=ffi_collection_items module=ffi status=error error={err}");
            return Vec::new();
        }
    };
    match store.documents(&path, CACHE_ORDER_FIELD) {
        Ok(documents) => documents
            .iter()
            .map(|document| to_dto(&Item::from_document(document, &owner_scope)))
            .collect(),
        Err(err) => {
            warn!("event=ffi_collection_items module=ffi status=error error={err}");
            Vec::new()
        }
    }
}

/// Creates one item in `collection`.
#[flutter_rust_bridge::frb(sync)]
pub fn item_create(
    collection: String,
    title: String,
    kind: String,
    scheduled_date: Option<String>,
) -> ItemActionResponse {
    let date = match parse_optional_date(scheduled_date.as_deref()) {
        Ok(date) => date,
        Err(message) => {
            return ItemActionResponse::failure(format!("item_create failed: {message}"))
        }
    };
    let mut draft = Item::new(String::new(), title);
    draft.kind = ItemKind::parse(&kind).unwrap_or_default();
    draft.scheduled_date = date;
    match with_item_service(&collection, |service, path| service.create_item(path, &draft)) {
        Ok(item_id) => ItemActionResponse::success("Item created.", Some(item_id)),
        Err(err) => ItemActionResponse::failure(format!("item_create failed: {err}")),
    }
}

/// Sets or clears the completed flag.
#[flutter_rust_bridge::frb(sync)]
pub fn item_set_completed(
    collection: String,
    item_id: String,
    completed: bool,
) -> ItemActionResponse {
    match with_item_service(&collection, |service, path| {
        service.set_completed(path, &item_id, completed)
    }) {
        Ok(()) => ItemActionResponse::success("Item updated.", None),
        Err(err) => ItemActionResponse::failure(format!("item_set_completed failed: {err}")),
    }
}

/// Replaces the schedule of one item; `None` clears a field.
#[flutter_rust_bridge::frb(sync)]
pub fn item_reschedule(
    collection: String,
    item_id: String,
    scheduled_date: Option<String>,
    scheduled_time_epoch_ms: Option<i64>,
) -> ItemActionResponse {
    let date = match parse_optional_date(scheduled_date.as_deref()) {
        Ok(date) => date,
        Err(message) => {
            return ItemActionResponse::failure(format!("item_reschedule failed: {message}"))
        }
    };
    let time = match scheduled_time_epoch_ms {
        Some(millis) => match DateTime::<Utc>::from_timestamp_millis(millis) {
            Some(time) => Some(time),
            None => {
                return ItemActionResponse::failure(format!(
                    "item_reschedule failed: invalid instant {millis}"
                ))
            }
        },
        None => None,
    };
    match with_item_service(&collection, |service, path| {
        service.reschedule(path, &item_id, date, time)
    }) {
        Ok(()) => ItemActionResponse::success("Item rescheduled.", None),
        Err(err) => ItemActionResponse::failure(format!("item_reschedule failed: {err}")),
    }
}

/// Sets the priority; `None` or an unknown label clears it.
#[flutter_rust_bridge::frb(sync)]
pub fn item_set_priority(
    collection: String,
    item_id: String,
    priority: Option<String>,
) -> ItemActionResponse {
    let priority = priority.as_deref().and_then(Priority::parse);
    match with_item_service(&collection, |service, path| {
        service.set_priority(path, &item_id, priority)
    }) {
        Ok(()) => ItemActionResponse::success("Priority updated.", None),
        Err(err) => ItemActionResponse::failure(format!("item_set_priority failed: {err}")),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn item_rename(collection: String, item_id: String, title: String) -> ItemActionResponse {
    match with_item_service(&collection, |service, path| {
        service.rename(path, &item_id, &title)
    }) {
        Ok(()) => ItemActionResponse::success("Item renamed.", None),
        Err(err) => ItemActionResponse::failure(format!("item_rename failed: {err}")),
    }
}

/// Deletes one item. Deleting an absent item succeeds.
#[flutter_rust_bridge::frb(sync)]
pub fn item_delete(collection: String, item_id: String) -> ItemActionResponse {
    match with_item_service(&collection, |service, path| {
        service.delete_item(path, &item_id)
    }) {
        Ok(()) => ItemActionResponse::success("Item deleted.", None),
        Err(err) => ItemActionResponse::failure(format!("item_delete failed: {err}")),
    }
}

fn resolve_cache_db_path() -> PathBuf {
    CACHE_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("GOALSYNC_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(CACHE_DB_FILE_NAME)
        })
        .clone()
}

fn with_item_service<T>(
    collection: &str,
    f: impl FnOnce(&ItemService<SqliteStore>, &CollectionPath) -> Result<T, ItemServiceError>,
) -> Result<T, String> {
    let path = CollectionPath::parse(collection)
        .ok_or_else(|| format!("invalid collection path `{collection}`"))?;
    let store = SqliteStore::open(resolve_cache_db_path())
        .map_err(|err| format!("cache DB open failed: {err}"))?;
    let service = ItemService::new(store);
    f(&service, &path).map_err(|err| err.to_string())
}

fn parse_optional_date(value: Option<&str>) -> Result<Option<NaiveDate>, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("invalid date `{text}`; expected YYYY-MM-DD")),
    }
}

fn reference_instant(now_epoch_ms: i64, utc_offset_minutes: i32) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?;
    DateTime::<Utc>::from_timestamp_millis(now_epoch_ms).map(|now| now.with_timezone(&offset))
}

fn from_dto(dto: &ItemDto) -> Item {
    Item {
        id: dto.id.clone(),
        owner_scope: dto.owner_scope.clone(),
        kind: ItemKind::parse(&dto.kind).unwrap_or_default(),
        title: dto.title.clone(),
        note: dto.note.clone(),
        scheduled_date: dto
            .scheduled_date
            .as_deref()
            .and_then(|text| NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()),
        scheduled_time: dto
            .scheduled_time_epoch_ms
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        is_all_day: dto.is_all_day,
        is_recurring: dto.is_recurring,
        priority: dto.priority.as_deref().and_then(Priority::parse),
        completed: dto.completed,
        created_at: dto.created_at,
    }
}

fn to_dto(item: &Item) -> ItemDto {
    ItemDto {
        id: item.id.clone(),
        owner_scope: item.owner_scope.clone(),
        kind: item.kind.label().to_string(),
        title: item.title.clone(),
        note: item.note.clone(),
        scheduled_date: item.scheduled_date.map(format_date),
        scheduled_time_epoch_ms: item.scheduled_time.map(|time| time.timestamp_millis()),
        is_all_day: item.is_all_day,
        is_recurring: item.is_recurring,
        priority: item.priority.map(|priority| priority.label().to_string()),
        completed: item.completed,
        created_at: item.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        collection_items, core_version, init_logging, item_create, item_delete, item_rename,
        item_reschedule, item_set_completed, item_set_priority, ping, view_buckets,
        view_transform, ItemDto,
    };
    use std::time::{SystemTime, UNIX_EPOCH};

    fn dto(id: &str, title: &str) -> ItemDto {
        ItemDto {
            id: id.to_string(),
            owner_scope: String::new(),
            kind: "task".to_string(),
            title: title.to_string(),
            note: None,
            scheduled_date: None,
            scheduled_time_epoch_ms: None,
            is_all_day: false,
            is_recurring: false,
            priority: None,
            completed: false,
            created_at: 0,
        }
    }

    fn unique_collection(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{prefix}-{nanos}")
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_bad_input() {
        assert!(!init_logging("info".to_string(), String::new()).is_empty());
        assert!(!init_logging("verbose".to_string(), "tmp/logs".to_string()).is_empty());
    }

    #[test]
    fn view_transform_filters_and_sorts() {
        let items = vec![dto("1", "Run 5k"), dto("2", "Walk dog"), dto("3", "Morning run")];
        let response = view_transform(
            items,
            "lexical".to_string(),
            "none".to_string(),
            "run".to_string(),
        );
        assert!(response.ok, "{}", response.message);
        let titles: Vec<&str> = response.rows.iter().map(|row| row.item.title.as_str()).collect();
        assert_eq!(titles, vec!["Morning run", "Run 5k"]);
    }

    #[test]
    fn view_transform_rejects_unknown_labels() {
        let response = view_transform(
            Vec::new(),
            "random".to_string(),
            "none".to_string(),
            String::new(),
        );
        assert!(!response.ok);
        assert!(response.message.contains("random"));
    }

    #[test]
    fn view_buckets_uses_the_given_offset_for_today() {
        let mut late = dto("late", "late");
        late.scheduled_date = Some("2024-01-02".to_string());
        // 2024-01-01T23:30:00Z is already 2024-01-02 at UTC+01:00.
        let now = 1_704_151_800_000;

        let response = view_buckets(vec![late.clone()], now, 60, Vec::new());
        assert!(response.ok, "{}", response.message);
        assert_eq!(response.reference_date, "2024-01-02");
        assert_eq!(response.buckets[0].name, "today");
        assert_eq!(response.buckets[0].item_ids, vec!["late".to_string()]);

        let utc = view_buckets(vec![late], now, 0, Vec::new());
        assert!(utc.buckets[0].item_ids.is_empty());
    }

    #[test]
    fn view_buckets_rejects_unknown_names() {
        let response = view_buckets(Vec::new(), 0, 0, vec!["someday".to_string()]);
        assert!(!response.ok);
    }

    #[test]
    fn item_intents_round_trip_through_the_cache() {
        let collection = unique_collection("ffi-tasks");
        let created = item_create(
            collection.clone(),
            "  Stretch ".to_string(),
            "routine".to_string(),
            Some("2024-01-02".to_string()),
        );
        assert!(created.ok, "{}", created.message);
        let item_id = created.item_id.unwrap();

        assert!(item_set_completed(collection.clone(), item_id.clone(), true).ok);
        let priority = Some("HIGH".to_string());
        assert!(item_set_priority(collection.clone(), item_id.clone(), priority).ok);
        let renamed = "Stretch more".to_string();
        assert!(item_rename(collection.clone(), item_id.clone(), renamed).ok);
        let time = Some(1_700_000_000_000);
        assert!(item_reschedule(collection.clone(), item_id.clone(), None, time).ok);

        let items = collection_items(collection.clone(), String::new());
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.title, "Stretch more");
        assert_eq!(item.kind, "routine");
        assert!(item.completed);
        assert_eq!(item.priority.as_deref(), Some("high"));
        assert_eq!(item.scheduled_date, None);
        assert_eq!(item.scheduled_time_epoch_ms, Some(1_700_000_000_000));

        assert!(item_delete(collection.clone(), item_id).ok);
        assert!(collection_items(collection, String::new()).is_empty());
    }

    #[test]
    fn item_intents_report_failures() {
        let collection = unique_collection("ffi-missing");
        let missing = item_set_completed(collection.clone(), "nope".to_string(), true);
        assert!(!missing.ok);
        assert!(missing.message.contains("not found"));

        let blank = item_create(collection.clone(), "  ".to_string(), "task".to_string(), None);
        assert!(!blank.ok);

        let bad_date = item_create(
            collection,
            "x".to_string(),
            "task".to_string(),
            Some("02/01/2024".to_string()),
        );
        assert!(!bad_date.ok);
        assert!(bad_date.message.contains("YYYY-MM-DD"));

        assert!(!item_delete("bad//path".to_string(), "x".to_string()).ok);
    }
}
