//! Lazy placeholder resolution
//!
//! Not-yet-materialized values are represented by placeholder markers that
//! fault in through the coordinator on first read. The read-marker ->
//! resolve -> cache sequence runs under a per-entry exclusive lock: two
//! racing threads must not resolve independently and let one clobber the
//! other's result with stale data. Lock granularity is per entry so
//! unrelated lookups never serialize.

use crate::coordinator::{Coordinator, CoordinatorError};
use crate::value::Value;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Identifies one not-yet-materialized value.
pub type PlaceholderId = u64;

#[derive(Debug, Default)]
struct Slot {
    resolved: Option<Value>,
}

/// Cache of resolved placeholder values with per-entry resolve locks.
#[derive(Default)]
pub struct PlaceholderTable {
    entries: DashMap<PlaceholderId, Arc<Mutex<Slot>>>,
}

impl PlaceholderTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: PlaceholderId) -> Arc<Mutex<Slot>> {
        self.entries
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone()
    }

    /// Resolve a placeholder, faulting in through the coordinator at most
    /// once. A losing racer observes the winner's cached value.
    pub fn resolve(
        &self,
        id: PlaceholderId,
        coordinator: &dyn Coordinator,
    ) -> Result<Value, CoordinatorError> {
        let slot = self.slot(id);
        let mut guard = slot.lock();
        if let Some(value) = &guard.resolved {
            trace!(id, "placeholder already resolved");
            return Ok(value.clone());
        }
        let value = coordinator.resolve_placeholder(id)?;
        guard.resolved = Some(value.clone());
        Ok(value)
    }

    /// Whether an entry has been resolved (statistics only).
    pub fn is_resolved(&self, id: PlaceholderId) -> bool {
        self.entries
            .get(&id)
            .map(|slot| slot.lock().resolved.is_some())
            .unwrap_or(false)
    }
}
