//! Flutter-facing boundary for the goalsync engine.
//! Functions in `api` are exported through flutter_rust_bridge.

pub mod api;
