//! Injected reference clock.
//!
//! # Responsibility
//! - Supply the single "now" captured once per recompute pass.
//! - Let tests pin that instant deterministically.

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use std::cell::Cell;

/// Reference instant shared by every predicate of one recompute pass.
pub type ReferenceInstant = DateTime<FixedOffset>;

/// Supplier of the current instant.
pub trait Clock {
    fn now(&self) -> ReferenceInstant;
}

/// Calendar day of `reference` in its own UTC offset.
pub fn today(reference: &ReferenceInstant) -> NaiveDate {
    reference.date_naive()
}

/// Wall clock in the host's local offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> ReferenceInstant {
        Local::now().fixed_offset()
    }
}

/// Clock pinned to one instant; can be advanced by tests and demos.
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: Cell<ReferenceInstant>,
}

impl FixedClock {
    pub fn new(instant: ReferenceInstant) -> Self {
        Self {
            instant: Cell::new(instant),
        }
    }

    /// Parses an RFC 3339 timestamp such as `2024-01-02T09:00:00+02:00`.
    pub fn parse(rfc3339: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(rfc3339).ok().map(Self::new)
    }

    pub fn set(&self, instant: ReferenceInstant) {
        self.instant.set(instant);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> ReferenceInstant {
        self.instant.get()
    }
}
