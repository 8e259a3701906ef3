//! Raw store documents and collection addresses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// Field name that orders a watch by server-assigned creation sequence.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// JSON object body of one stored document.
pub type Fields = Map<String, Value>;

/// One document as currently known by a backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Monotonic server-assigned sequence. Only used for fetch ordering.
    pub created_at: i64,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, created_at: i64, fields: Fields) -> Self {
        Self {
            id: id.into(),
            created_at,
            fields,
        }
    }

    /// Returns the value used to order this document for `order_field`.
    ///
    /// `createdAt` resolves to the server sequence, everything else to the
    /// top-level JSON field.
    pub fn order_value(&self, order_field: &str) -> Option<Value> {
        if order_field == CREATED_AT_FIELD {
            return Some(Value::from(self.created_at));
        }
        self.fields.get(order_field).cloned()
    }
}

/// Slash separated collection address, e.g. `categories/abc/goals`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Normalizes surrounding slashes and whitespace.
    ///
    /// Returns `None` for an empty path, one with empty segments, or one
    /// with an even segment count (that addresses a document).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|segment| segment.trim().is_empty()) || segments.len() % 2 == 0 {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Builds `<parent>/<id>/<child>` style nested addresses.
    pub fn child(&self, document_id: &str, collection: &str) -> Option<Self> {
        Self::parse(&format!("{}/{document_id}/{collection}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
