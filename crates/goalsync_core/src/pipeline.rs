//! Sort/group/filter pipeline producing the rendered view sequence.
//!
//! # Responsibility
//! - Filter items by search text, order them, and annotate group keys.
//! - Parse and serialize the per-screen view selection.
//!
//! # Invariants
//! - Inputs are never mutated; every call returns a new sequence.
//! - All orderings are stable; equal items keep input order.
//! - Grouping wins over sorting: `sort_by` only orders items inside a group.
//! - `transform` is deterministic for identical inputs and options.

use crate::model::item::{format_date, Item, Priority};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::error::Error;
use std::fmt::{Display, Formatter};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Group key of items without a scheduled date under [`GroupBy::ByDay`].
pub const NO_DATE_GROUP_KEY: &str = "no_date";
/// Group key of items without a priority under [`GroupBy::ByPriority`].
pub const UNSET_PRIORITY_GROUP_KEY: &str = "unset";

static LEADING_SYMBOLS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\p{L}\p{N}]+").expect("valid leading symbol regex"));

/// Item ordering selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    None,
    Lexical,
    Time,
    Date,
}

impl SortBy {
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lexical => "lexical",
            Self::Time => "time",
            Self::Date => "date",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ViewOptionsError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "lexical" => Ok(Self::Lexical),
            "time" => Ok(Self::Time),
            "date" => Ok(Self::Date),
            _ => Err(ViewOptionsError::UnknownSort(value.to_string())),
        }
    }
}

/// Section grouping selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupBy {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "day")]
    ByDay,
    #[serde(rename = "priority")]
    ByPriority,
}

impl GroupBy {
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ByDay => "day",
            Self::ByPriority => "priority",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ViewOptionsError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "day" => Ok(Self::ByDay),
            "priority" => Ok(Self::ByPriority),
            _ => Err(ViewOptionsError::UnknownGroup(value.to_string())),
        }
    }
}

/// Error for unknown view selection labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOptionsError {
    UnknownSort(String),
    UnknownGroup(String),
}

impl Display for ViewOptionsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSort(value) => {
                write!(f, "unknown sort `{value}`; expected none|lexical|time|date")
            }
            Self::UnknownGroup(value) => {
                write!(f, "unknown grouping `{value}`; expected none|day|priority")
            }
        }
    }
}

impl Error for ViewOptionsError {}

/// Per-screen view selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewOptions {
    pub sort_by: SortBy,
    pub group_by: GroupBy,
    pub search_text: String,
}

impl ViewOptions {
    /// Builds options from host-provided labels.
    pub fn from_labels(
        sort_by: &str,
        group_by: &str,
        search_text: impl Into<String>,
    ) -> Result<Self, ViewOptionsError> {
        Ok(Self {
            sort_by: SortBy::parse(sort_by)?,
            group_by: GroupBy::parse(group_by)?,
            search_text: search_text.into(),
        })
    }

    pub fn with_sort(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn with_group(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn with_search(mut self, search_text: impl Into<String>) -> Self {
        self.search_text = search_text.into();
        self
    }
}

/// One row of the view sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedItem {
    pub item: Item,
    /// Section key; `None` when no grouping is selected.
    pub group_key: Option<String>,
}

/// Filters, orders and annotates `items` according to `options`.
pub fn transform(items: &[Item], options: &ViewOptions) -> Vec<AnnotatedItem> {
    let filtering = !options.search_text.trim().is_empty();
    let needle = options.search_text.to_lowercase();
    let mut rows: Vec<&Item> = items
        .iter()
        .filter(|item| !filtering || item.title.to_lowercase().contains(&needle))
        .collect();

    match options.sort_by {
        SortBy::None => {}
        SortBy::Lexical => rows.sort_by_cached_key(|item| CollationKey::new(&item.title)),
        SortBy::Time => rows.sort_by(|left, right| {
            missing_last(left.scheduled_time.as_ref(), right.scheduled_time.as_ref())
        }),
        SortBy::Date => rows.sort_by(|left, right| {
            missing_last(left.scheduled_date.as_ref(), right.scheduled_date.as_ref())
        }),
    }

    match options.group_by {
        GroupBy::None => {}
        GroupBy::ByDay => rows.sort_by(|left, right| {
            missing_last(left.scheduled_date.as_ref(), right.scheduled_date.as_ref())
        }),
        GroupBy::ByPriority => {
            rows.sort_by_key(|item| priority_rank(item.priority));
        }
    }

    rows.into_iter()
        .map(|item| AnnotatedItem {
            group_key: group_key(item, options.group_by),
            item: item.clone(),
        })
        .collect()
}

/// Section key of `item` under `group_by`.
pub fn group_key(item: &Item, group_by: GroupBy) -> Option<String> {
    match group_by {
        GroupBy::None => None,
        GroupBy::ByDay => Some(
            item.scheduled_date
                .map_or_else(|| NO_DATE_GROUP_KEY.to_string(), format_date),
        ),
        GroupBy::ByPriority => Some(
            item.priority
                .map_or(UNSET_PRIORITY_GROUP_KEY, Priority::label)
                .to_string(),
        ),
    }
}

/// Folds a sequence into contiguous sections sharing one group key.
pub fn group_runs(rows: &[AnnotatedItem]) -> Vec<(Option<String>, Vec<Item>)> {
    let mut runs: Vec<(Option<String>, Vec<Item>)> = Vec::new();
    for row in rows {
        match runs.last_mut() {
            Some((key, items)) if *key == row.group_key => items.push(row.item.clone()),
            _ => runs.push((row.group_key.clone(), vec![row.item.clone()])),
        }
    }
    runs
}

/// Removes the leading run of characters that are neither letters nor digits.
pub fn strip_leading_symbols(title: &str) -> &str {
    match LEADING_SYMBOLS_RE.find(title) {
        Some(found) => &title[found.end()..],
        None => title,
    }
}

/// Multi-level sort key of a title with its leading symbols stripped.
///
/// Levels compare in field order: base letters ignoring accents and case,
/// then accents, then case with lowercase first. Canonically equivalent
/// titles produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CollationKey {
    base: String,
    /// Combining marks keyed by the base letter they follow; an earlier
    /// accent weighs more, as in root collation.
    accents: Vec<(Reverse<usize>, char)>,
    uppercase: Vec<bool>,
}

impl CollationKey {
    fn new(title: &str) -> Self {
        let mut base = String::new();
        let mut accents = Vec::new();
        let mut uppercase = Vec::new();
        for ch in strip_leading_symbols(title).nfd() {
            if is_combining_mark(ch) {
                accents.push((Reverse(uppercase.len()), ch));
                continue;
            }
            uppercase.push(ch.is_uppercase());
            base.extend(ch.to_lowercase());
        }
        Self {
            base,
            accents,
            uppercase,
        }
    }
}

fn missing_last<T: Ord>(left: Option<&T>, right: Option<&T>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => left.cmp(right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn priority_rank(priority: Option<Priority>) -> u8 {
    match priority {
        Some(Priority::Highest) => 0,
        Some(Priority::High) => 1,
        Some(Priority::Normal) => 2,
        None => 3,
    }
}
