//! Managed instance registry
//!
//! Tracks which instances participate in coordination. The managed flag is
//! set exactly once and then read by arbitrarily many threads, so reads and
//! writes go through acquire/release-ordered storage.

use crate::value::InstanceId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Concurrent set-once registry of managed instances.
#[derive(Debug, Default)]
pub struct ManagedRegistry {
    entries: DashMap<InstanceId, Arc<AtomicBool>>,
}

impl ManagedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an instance managed. Returns false if it already was; the flag
    /// never transitions back.
    pub fn manage(&self, instance: InstanceId) -> bool {
        let slot = self
            .entries
            .entry(instance)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();
        !slot.swap(true, Ordering::AcqRel)
    }

    /// Read the managed flag with acquire ordering.
    pub fn is_managed(&self, instance: InstanceId) -> bool {
        self.entries
            .get(&instance)
            .map(|slot| slot.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Number of managed instances, for statistics only.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
