//! Live aggregation and view-transform engine for goalsync.
//! Change feeds flow into aggregators, buckets and the view pipeline.

pub mod aggregate;
pub mod bucket;
pub mod clock;
pub mod config;
pub mod db;
pub mod feed;
pub mod logging;
pub mod model;
pub mod observe;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod view;

pub use aggregate::{DetachHandle, FanOutAggregator, LiveCollection, MergedListener, MergedSource};
pub use bucket::{bucket, default_predicates, Bucket, BucketMap, BucketPredicate};
pub use clock::{Clock, FixedClock, ReferenceInstant, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use feed::{ChangeFeed, FeedError, Subscription};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::document::{CollectionPath, Document, Fields};
pub use model::item::{Item, ItemId, ItemKind, Priority};
pub use observe::ListenerId;
pub use pipeline::{
    group_runs, transform, AnnotatedItem, GroupBy, SortBy, ViewOptions, ViewOptionsError,
};
pub use service::item_service::{ItemService, ItemServiceError, ItemServiceResult};
pub use store::{
    DocumentStore, MemoryStore, Mutation, SqliteStore, StoreError, StoreResult, WatchEvent,
};
pub use view::{LiveView, ViewState};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
