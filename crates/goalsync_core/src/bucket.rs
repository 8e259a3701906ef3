//! Predicate bucketing against one reference instant.
//!
//! # Responsibility
//! - Partition an item set into named buckets with pure predicates.
//! - Provide the predicates shared by the list screens.
//!
//! # Invariants
//! - Every predicate sees the same reference instant within one call.
//! - Output order is predicate order; items keep input order in each bucket.
//! - Exclusivity is not enforced: an item may land in zero or many buckets.

use crate::clock::{today, ReferenceInstant};
use crate::model::item::{Item, Priority};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

pub const TODAY: &str = "today";
pub const OVERDUE: &str = "overdue";
pub const DONE: &str = "done";
pub const UPCOMING: &str = "upcoming";
pub const UNSCHEDULED: &str = "unscheduled";
pub const RECURRING: &str = "recurring";
pub const HIGH_PRIORITY: &str = "high_priority";

/// Names accepted by [`BucketPredicate::named`].
pub const KNOWN_BUCKETS: &[&str] = &[
    TODAY,
    OVERDUE,
    DONE,
    UPCOMING,
    UNSCHEDULED,
    RECURRING,
    HIGH_PRIORITY,
];

type PredicateFn = Rc<dyn Fn(&Item, &ReferenceInstant) -> bool>;

/// Named membership test.
#[derive(Clone)]
pub struct BucketPredicate {
    name: String,
    test: PredicateFn,
}

impl Debug for BucketPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketPredicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl BucketPredicate {
    pub fn new(
        name: impl Into<String>,
        test: impl Fn(&Item, &ReferenceInstant) -> bool + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            test: Rc::new(test),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, item: &Item, reference: &ReferenceInstant) -> bool {
        (self.test)(item, reference)
    }

    /// Open items scheduled on the reference day.
    pub fn today() -> Self {
        Self::new(TODAY, |item, reference| {
            !item.completed && item.scheduled_date == Some(today(reference))
        })
    }

    /// Open items scheduled before the reference day.
    pub fn overdue() -> Self {
        Self::new(OVERDUE, |item, reference| {
            !item.completed
                && item
                    .scheduled_date
                    .is_some_and(|date| date < today(reference))
        })
    }

    pub fn done() -> Self {
        Self::new(DONE, |item, _| item.completed)
    }

    /// Open items scheduled after the reference day.
    pub fn upcoming() -> Self {
        Self::new(UPCOMING, |item, reference| {
            !item.completed
                && item
                    .scheduled_date
                    .is_some_and(|date| date > today(reference))
        })
    }

    pub fn unscheduled() -> Self {
        Self::new(UNSCHEDULED, |item, _| {
            !item.completed && item.scheduled_date.is_none()
        })
    }

    pub fn recurring() -> Self {
        Self::new(RECURRING, |item, _| item.is_recurring)
    }

    pub fn high_priority() -> Self {
        Self::new(HIGH_PRIORITY, |item, _| {
            !item.completed && matches!(item.priority, Some(Priority::High | Priority::Highest))
        })
    }

    /// Resolves one of [`KNOWN_BUCKETS`].
    pub fn named(name: &str) -> Option<Self> {
        match name.trim() {
            TODAY => Some(Self::today()),
            OVERDUE => Some(Self::overdue()),
            DONE => Some(Self::done()),
            UPCOMING => Some(Self::upcoming()),
            UNSCHEDULED => Some(Self::unscheduled()),
            RECURRING => Some(Self::recurring()),
            HIGH_PRIORITY => Some(Self::high_priority()),
            _ => None,
        }
    }
}

/// `today`, `overdue` and `done`, in that order.
pub fn default_predicates() -> Vec<BucketPredicate> {
    vec![
        BucketPredicate::today(),
        BucketPredicate::overdue(),
        BucketPredicate::done(),
    ]
}

/// One named bucket of a [`BucketMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub items: Vec<Item>,
}

/// Bucket name to members, iterated in predicate order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketMap {
    buckets: Vec<Bucket>,
}

impl BucketMap {
    pub fn get(&self, name: &str) -> Option<&[Item]> {
        self.buckets
            .iter()
            .find(|bucket| bucket.name == name)
            .map(|bucket| bucket.items.as_slice())
    }

    /// Members of `name`, empty when the bucket is not part of the map.
    pub fn items(&self, name: &str) -> &[Item] {
        self.get(name).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str, item_id: &str) -> bool {
        self.items(name).iter().any(|item| item.id == item_id)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|bucket| bucket.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Member counts per bucket, used for badges and logging.
    pub fn counts(&self) -> Vec<(String, usize)> {
        self.buckets
            .iter()
            .map(|bucket| (bucket.name.clone(), bucket.items.len()))
            .collect()
    }
}

/// Evaluates every predicate against every item using `reference`.
///
/// Predicates sharing a name are merged into one bucket at the position of
/// the first occurrence.
pub fn bucket(
    items: &[Item],
    reference: &ReferenceInstant,
    predicates: &[BucketPredicate],
) -> BucketMap {
    let mut buckets: Vec<Bucket> = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let members = items
            .iter()
            .filter(|item| predicate.matches(item, reference))
            .cloned();
        match buckets
            .iter_mut()
            .find(|bucket| bucket.name == predicate.name)
        {
            Some(existing) => {
                for item in members {
                    if !existing.items.iter().any(|known| known.key() == item.key()) {
                        existing.items.push(item);
                    }
                }
            }
            None => buckets.push(Bucket {
                name: predicate.name.clone(),
                items: members.collect(),
            }),
        }
    }
    BucketMap { buckets }
}

#[cfg(test)]
mod tests {
    use super::{bucket, default_predicates, BucketPredicate, DONE, OVERDUE, TODAY};
    use crate::model::item::{Item, Priority};
    use chrono::{DateTime, NaiveDate};

    fn reference() -> chrono::DateTime<chrono::FixedOffset> {
        DateTime::parse_from_rfc3339("2024-01-02T10:00:00+01:00").unwrap()
    }

    fn dated(id: &str, day: u32) -> Item {
        let mut item = Item::new(id, id);
        item.scheduled_date = NaiveDate::from_ymd_opt(2024, 1, day);
        item
    }

    #[test]
    fn default_buckets_split_open_and_done_items() {
        let mut done_today = dated("done-today", 2);
        done_today.completed = true;
        let items = vec![
            dated("today", 2),
            dated("overdue", 1),
            dated("future", 5),
            Item::new("undated", "undated"),
            done_today,
        ];

        let map = bucket(&items, &reference(), &default_predicates());

        assert_eq!(map.names().collect::<Vec<_>>(), vec![TODAY, OVERDUE, DONE]);
        assert!(map.contains(TODAY, "today"));
        assert!(!map.contains(TODAY, "done-today"));
        assert!(map.contains(OVERDUE, "overdue"));
        assert!(map.contains(DONE, "done-today"));
        assert_eq!(map.items(TODAY).len(), 1);
        assert_eq!(map.items(OVERDUE).len(), 1);
    }

    #[test]
    fn overlapping_predicates_are_not_made_exclusive() {
        let mut item = dated("a", 2);
        item.priority = Some(Priority::Highest);
        let predicates = vec![BucketPredicate::today(), BucketPredicate::high_priority()];

        let map = bucket(&[item], &reference(), &predicates);
        assert!(map.contains("today", "a"));
        assert!(map.contains("high_priority", "a"));
    }

    #[test]
    fn empty_buckets_are_still_reported() {
        let map = bucket(&[], &reference(), &default_predicates());
        assert_eq!(map.len(), 3);
        assert!(map.items(DONE).is_empty());
        assert!(map.get("missing").is_none());
    }

    #[test]
    fn named_resolves_known_buckets_only() {
        assert_eq!(BucketPredicate::named("upcoming").unwrap().name(), "upcoming");
        assert!(BucketPredicate::named("someday").is_none());
    }
}
