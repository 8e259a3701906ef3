//! Domain model shared by feeds, buckets and view pipelines.
//!
//! # Responsibility
//! - Define the canonical `Item` record rendered by every screen.
//! - Define the raw `Document` shape exchanged with backing stores.
//!
//! # Invariants
//! - An item is identified by `(owner_scope, id)` inside one merged set.
//! - Decoding a document into an item never fails.

pub mod document;
pub mod item;
