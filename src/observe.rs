//! Where per-row successes and failures are reported.

use std::cell::RefCell;

use serde::Serialize;

use crate::store::StoreAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Listing or fetching a customer's sources failed.
    SourceLookup,
    /// Default source reassignment.
    DefaultSource,
    /// Detaching a duplicate source.
    Detach,
    /// Per-donor reconciliation summary.
    Reconciliation,
    /// Legacy record rewrite.
    Migration,
    /// Task lifecycle.
    Task,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceLookup => "source_lookup",
            Self::DefaultSource => "default_source",
            Self::Detach => "detach",
            Self::Reconciliation => "reconciliation",
            Self::Migration => "migration",
            Self::Task => "task",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait ObservabilitySink {
    fn record(&self, category: EventCategory, message: &str);
}

/// Forwards events to the tracing subscriber only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, category: EventCategory, message: &str) {
        tracing::info!(target: "healthcheck::events", %category, "{message}");
    }
}

/// Persists events in the store's event log and mirrors them to tracing.
pub struct StoreSink<'a> {
    store: &'a dyn StoreAdapter,
}

impl<'a> StoreSink<'a> {
    pub fn new(store: &'a dyn StoreAdapter) -> Self {
        Self { store }
    }
}

impl ObservabilitySink for StoreSink<'_> {
    fn record(&self, category: EventCategory, message: &str) {
        TracingSink.record(category, message);
        if let Err(err) = self.store.record_event(category.as_str(), message) {
            tracing::warn!(%category, error = %err, "failed to persist event");
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: RefCell<Vec<(EventCategory, String)>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<(EventCategory, String)> {
        self.events.borrow().clone()
    }

    pub fn count(&self, category: EventCategory) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|(c, _)| *c == category)
            .count()
    }

    pub fn messages(&self, category: EventCategory) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl ObservabilitySink for MemorySink {
    fn record(&self, category: EventCategory, message: &str) {
        self.events.borrow_mut().push((category, message.to_string()));
    }
}
