//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire a store, a fan-out aggregator and a live view end to end.
//! - Print buckets and the view sequence deterministically.

use chrono::{DateTime, FixedOffset};
use goalsync_core::{
    group_runs, init_logging, CollectionPath, EngineConfig, FanOutAggregator, FixedClock,
    ItemService, LiveView, MemoryStore, ViewState,
};
use serde_json::json;
use std::error::Error;
use std::rc::Rc;

const DEMO_NOW: &str = "2024-01-02T09:00:00+00:00";
const CATEGORIES: [&str; 2] = ["health", "home"];

fn main() {
    if let Err(err) = run() {
        eprintln!("goalsync_cli error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    println!("goalsync_core ping={}", goalsync_core::ping());
    println!("goalsync_core version={}", goalsync_core::core_version());

    let config = EngineConfig::from_env()?;
    if let Some(log_dir) = config.log_dir.as_deref() {
        init_logging(&config.log_level, log_dir)?;
    }

    let store = Rc::new(MemoryStore::new());
    seed(&store)?;

    let reference: DateTime<FixedOffset> = DateTime::parse_from_rfc3339(DEMO_NOW)?;
    let clock = Rc::new(FixedClock::new(reference));
    let aggregator = Rc::new(FanOutAggregator::attach(
        store.clone(),
        CATEGORIES,
        goals_of,
        &config.order_field,
    )?);
    let view = LiveView::with_predicates(
        aggregator.clone(),
        clock,
        config.predicates(),
        config.default_view.clone(),
    );
    store.deliver_pending();
    if let Some(state) = view.state() {
        print_state("initial", &state);
    }

    let service = ItemService::new(store.clone());
    let health = goals_of("health").ok_or("invalid demo path")?;
    service.mark_done(&health, "stretch")?;
    store.deliver_pending();
    if let Some(state) = view.state() {
        print_state("after mark_done", &state);
    }

    view.close();
    aggregator.detach_all();
    println!("open watches after detach={}", store.active_watch_count());
    Ok(())
}

fn goals_of(category: &str) -> Option<CollectionPath> {
    CollectionPath::parse(&format!("categories/{category}/goals"))
}

fn seed(store: &MemoryStore) -> Result<(), Box<dyn Error>> {
    let rows = [
        (
            "health",
            "stretch",
            json!({"title": "🧘 Stretch", "scheduledDate": "2024-01-02", "priority": "high"}),
        ),
        ("health", "run", json!({"title": "Run 5k", "scheduledDate": "2024-01-01"})),
        ("home", "plants", json!({"title": "Water plants", "scheduledDate": "2024-01-02"})),
        ("home", "taxes", json!({"title": "File taxes", "completed": true})),
    ];
    for (category, id, body) in rows {
        let path = goals_of(category).ok_or("invalid demo path")?;
        let fields = body.as_object().cloned().unwrap_or_default();
        store.seed(&path, id, fields)?;
    }
    Ok(())
}

fn print_state(label: &str, state: &ViewState) {
    println!("== {label} (revision {}, reference {})", state.revision, state.reference);
    for (name, count) in state.buckets.counts() {
        println!("bucket {name}={count}");
    }
    for (group_key, items) in group_runs(&state.sequence) {
        println!("[{}]", group_key.as_deref().unwrap_or("all"));
        for item in items {
            let mark = if item.completed { "x" } else { " " };
            println!("  [{mark}] {}/{} {}", item.owner_scope, item.id, item.title);
        }
    }
}
