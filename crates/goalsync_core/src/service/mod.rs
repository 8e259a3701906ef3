//! Intent services.
//!
//! # Responsibility
//! - Turn view-binding intents into point mutations on the backing store.
//! - Keep the host layer decoupled from document field names.

pub mod item_service;
