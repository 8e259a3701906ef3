//! Item domain model.
//!
//! # Responsibility
//! - Define the generic record behind task/routine/goal/milestone/objective/note rows.
//! - Decode store documents leniently and encode items back to wire fields.
//!
//! # Invariants
//! - `id` is stable and unique inside its collection.
//! - `owner_scope` is empty for top-level items.
//! - A malformed or missing field decodes as absent/default, never as an error.

use crate::model::document::{Document, Fields};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque stable identifier assigned by the backing store.
pub type ItemId = String;

/// Priority tier. An unset priority is modeled as `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
    Highest,
}

impl Priority {
    /// Wire and group label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
            Self::Highest => "highest",
        }
    }

    /// Parses a wire label case-insensitively. Unknown labels are unset.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "highest" => Some(Self::Highest),
            _ => None,
        }
    }
}

/// Which screen family an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Task,
    Routine,
    Goal,
    Milestone,
    Objective,
    Note,
}

impl ItemKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Routine => "routine",
            Self::Goal => "goal",
            Self::Milestone => "milestone",
            Self::Objective => "objective",
            Self::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "task" => Some(Self::Task),
            "routine" => Some(Self::Routine),
            "goal" => Some(Self::Goal),
            "milestone" => Some(Self::Milestone),
            "objective" => Some(Self::Objective),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

/// Wire field names used by store documents.
pub mod fields {
    pub const KIND: &str = "kind";
    pub const TITLE: &str = "title";
    pub const NOTE: &str = "note";
    pub const SCHEDULED_DATE: &str = "scheduledDate";
    pub const SCHEDULED_TIME: &str = "scheduledTime";
    pub const IS_ALL_DAY: &str = "isAllDay";
    pub const IS_RECURRING: &str = "isRecurring";
    pub const PRIORITY: &str = "priority";
    pub const COMPLETED: &str = "completed";
}

/// Canonical record rendered by every list screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Parent/category id. Empty for top-level items.
    pub owner_scope: String,
    pub kind: ItemKind,
    pub title: String,
    pub note: Option<String>,
    /// Calendar day without time of day.
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub is_all_day: bool,
    pub is_recurring: bool,
    pub priority: Option<Priority>,
    pub completed: bool,
    /// Server sequence used for fetch ordering only.
    pub created_at: i64,
}

impl Item {
    /// Creates an open, unscheduled top-level task.
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_scope: String::new(),
            kind: ItemKind::Task,
            title: title.into(),
            note: None,
            scheduled_date: None,
            scheduled_time: None,
            is_all_day: false,
            is_recurring: false,
            priority: None,
            completed: false,
            created_at: 0,
        }
    }

    /// Merge key inside a fan-out aggregator.
    pub fn key(&self) -> (&str, &str) {
        (self.owner_scope.as_str(), self.id.as_str())
    }

    /// Decodes one store document.
    ///
    /// Wrongly typed fields are treated as absent so one bad record cannot
    /// abort a snapshot.
    pub fn from_document(document: &Document, owner_scope: &str) -> Self {
        let body = &document.fields;
        Self {
            id: document.id.clone(),
            owner_scope: owner_scope.to_string(),
            kind: read_str(body, fields::KIND)
                .and_then(ItemKind::parse)
                .unwrap_or_default(),
            title: read_str(body, fields::TITLE).unwrap_or_default().to_string(),
            note: read_str(body, fields::NOTE).map(str::to_string),
            scheduled_date: body.get(fields::SCHEDULED_DATE).and_then(parse_date_value),
            scheduled_time: body.get(fields::SCHEDULED_TIME).and_then(parse_time_value),
            is_all_day: read_bool(body, fields::IS_ALL_DAY),
            is_recurring: read_bool(body, fields::IS_RECURRING),
            priority: read_str(body, fields::PRIORITY).and_then(Priority::parse),
            completed: read_bool(body, fields::COMPLETED),
            created_at: document.created_at,
        }
    }

    /// Encodes the mutable fields of this item as a document body.
    ///
    /// `id`, `owner_scope` and `created_at` belong to the store address and
    /// metadata, so they are not part of the body.
    pub fn to_fields(&self) -> Fields {
        let mut body = Fields::new();
        body.insert(fields::KIND.to_string(), Value::from(self.kind.label()));
        body.insert(fields::TITLE.to_string(), Value::from(self.title.as_str()));
        body.insert(
            fields::NOTE.to_string(),
            self.note.as_deref().map_or(Value::Null, Value::from),
        );
        body.insert(
            fields::SCHEDULED_DATE.to_string(),
            self.scheduled_date
                .map_or(Value::Null, |date| Value::from(format_date(date))),
        );
        body.insert(
            fields::SCHEDULED_TIME.to_string(),
            self.scheduled_time
                .map_or(Value::Null, |time| Value::from(time.to_rfc3339())),
        );
        body.insert(fields::IS_ALL_DAY.to_string(), Value::from(self.is_all_day));
        body.insert(
            fields::IS_RECURRING.to_string(),
            Value::from(self.is_recurring),
        );
        body.insert(
            fields::PRIORITY.to_string(),
            self.priority
                .map_or(Value::Null, |priority| Value::from(priority.label())),
        );
        body.insert(fields::COMPLETED.to_string(), Value::from(self.completed));
        body
    }
}

/// Formats a calendar day as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (its date part is used).
pub fn parse_date_value(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|timestamp| timestamp.date_naive())
}

/// Accepts an RFC 3339 string or epoch milliseconds.
pub fn parse_time_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|timestamp| timestamp.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

fn read_str<'a>(body: &'a Fields, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

fn read_bool(body: &Fields, key: &str) -> bool {
    body.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{parse_time_value, Item, Priority};
    use crate::model::document::{Document, Fields};
    use serde_json::json;

    fn document(body: serde_json::Value) -> Document {
        let fields: Fields = body.as_object().cloned().unwrap_or_default();
        Document::new("doc-1", 3, fields)
    }

    #[test]
    fn priority_parse_is_case_insensitive() {
        assert_eq!(Priority::parse("HIGHEST"), Some(Priority::Highest));
        assert_eq!(Priority::parse(" high "), Some(Priority::High));
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn time_value_accepts_epoch_millis() {
        let parsed = parse_time_value(&json!(1_700_000_000_000_i64)).unwrap();
        assert_eq!(parsed.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn from_document_treats_wrong_types_as_absent() {
        let doc = document(json!({
            "title": 42,
            "scheduledDate": "not a date",
            "completed": "yes",
            "priority": 3
        }));

        let item = Item::from_document(&doc, "cat-a");
        assert_eq!(item.id, "doc-1");
        assert_eq!(item.owner_scope, "cat-a");
        assert_eq!(item.title, "");
        assert_eq!(item.scheduled_date, None);
        assert!(!item.completed);
        assert_eq!(item.priority, None);
        assert_eq!(item.created_at, 3);
    }

    #[test]
    fn to_fields_then_from_document_preserves_content() {
        let mut item = Item::new("doc-1", "Run 5k");
        item.note = Some("slow pace".to_string());
        item.scheduled_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2);
        item.priority = Some(Priority::High);
        item.is_recurring = true;
        item.created_at = 3;

        let doc = Document::new("doc-1", 3, item.to_fields());
        assert_eq!(Item::from_document(&doc, ""), item);
    }
}
