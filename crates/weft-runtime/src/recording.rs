//! Recording coordinator test double
//!
//! Records every capability call in order so tests can assert notification
//! cardinality and transaction completeness. Instances become managed by
//! explicit registration.

use crate::coordinator::{Coordinator, CoordinatorError};
use crate::registry::ManagedRegistry;
use crate::value::{InstanceId, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// One recorded capability call.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    BeginLock { name: String, level: i32 },
    CommitLock { name: String },
    MonitorEnter { instance: InstanceId, level: i32 },
    MonitorExit { instance: InstanceId },
    FieldChanged {
        owner: String,
        field: String,
        value: Value,
        index: i64,
    },
    LogicalInvoke {
        instance: InstanceId,
        operation: String,
        args: Vec<Value>,
    },
    CheckWriteAccess { instance: InstanceId },
}

/// A coordinator that manages registered instances and records all calls.
#[derive(Default)]
pub struct RecordingCoordinator {
    registry: ManagedRegistry,
    recognized: Mutex<Vec<String>>,
    placeholders: Mutex<FxHashMap<u64, Value>>,
    events: Mutex<Vec<CoordinatorEvent>>,
    deny_writes: Mutex<bool>,
}

impl RecordingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an instance under coordination.
    pub fn manage(&self, instance: InstanceId) {
        self.registry.manage(instance);
    }

    /// Register a class name as a recognized instrumented type.
    pub fn recognize(&self, class_name: &str) {
        self.recognized.lock().push(class_name.to_string());
    }

    /// Seed a placeholder value for fault-in.
    pub fn seed_placeholder(&self, id: u64, value: Value) {
        self.placeholders.lock().insert(id, value);
    }

    /// Make subsequent write-access checks fail.
    pub fn deny_writes(&self) {
        *self.deny_writes.lock() = true;
    }

    /// Snapshot of the recorded call sequence.
    pub fn events(&self) -> Vec<CoordinatorEvent> {
        self.events.lock().clone()
    }

    /// Recorded logical invocations only, in order.
    pub fn logical_invokes(&self) -> Vec<CoordinatorEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, CoordinatorEvent::LogicalInvoke { .. }))
            .collect()
    }

    fn record(&self, event: CoordinatorEvent) {
        self.events.lock().push(event);
    }
}

impl Coordinator for RecordingCoordinator {
    fn is_managed(&self, instance: InstanceId) -> bool {
        self.registry.is_managed(instance)
    }

    fn is_recognized_type(&self, class_name: &str) -> bool {
        self.recognized.lock().iter().any(|c| c == class_name)
    }

    fn begin_lock(&self, name: &str, level: i32) -> Result<(), CoordinatorError> {
        self.record(CoordinatorEvent::BeginLock {
            name: name.to_string(),
            level,
        });
        Ok(())
    }

    fn commit_lock(&self, name: &str) -> Result<(), CoordinatorError> {
        self.record(CoordinatorEvent::CommitLock {
            name: name.to_string(),
        });
        Ok(())
    }

    fn monitor_enter(&self, instance: InstanceId, level: i32) -> Result<(), CoordinatorError> {
        self.record(CoordinatorEvent::MonitorEnter { instance, level });
        Ok(())
    }

    fn monitor_exit(&self, instance: InstanceId) -> Result<(), CoordinatorError> {
        self.record(CoordinatorEvent::MonitorExit { instance });
        Ok(())
    }

    fn field_changed(
        &self,
        owner: &str,
        field: &str,
        value: &Value,
        index: i64,
    ) -> Result<(), CoordinatorError> {
        self.record(CoordinatorEvent::FieldChanged {
            owner: owner.to_string(),
            field: field.to_string(),
            value: value.clone(),
            index,
        });
        Ok(())
    }

    fn logical_invoke(
        &self,
        instance: InstanceId,
        operation: &str,
        args: &[Value],
    ) -> Result<(), CoordinatorError> {
        self.record(CoordinatorEvent::LogicalInvoke {
            instance,
            operation: operation.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }

    fn check_write_access(&self, instance: InstanceId) -> Result<(), CoordinatorError> {
        self.record(CoordinatorEvent::CheckWriteAccess { instance });
        if *self.deny_writes.lock() {
            return Err(CoordinatorError::WriteAccessDenied(instance));
        }
        Ok(())
    }

    fn resolve_placeholder(&self, id: u64) -> Result<Value, CoordinatorError> {
        self.placeholders
            .lock()
            .get(&id)
            .cloned()
            .ok_or(CoordinatorError::Unresolvable(id))
    }

    fn resolve_reference(&self, _instance: InstanceId, _field: &str) -> Result<(), CoordinatorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let c = RecordingCoordinator::new();
        c.begin_lock("^a", 2).unwrap();
        c.commit_lock("^a").unwrap();
        let events = c.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CoordinatorEvent::BeginLock { .. }));
        assert!(matches!(events[1], CoordinatorEvent::CommitLock { .. }));
    }

    #[test]
    fn managed_only_after_registration() {
        let c = RecordingCoordinator::new();
        assert!(!c.is_managed(9));
        c.manage(9);
        assert!(c.is_managed(9));
    }

    #[test]
    fn denied_writes_error() {
        let c = RecordingCoordinator::new();
        c.deny_writes();
        assert!(c.check_write_access(1).is_err());
    }
}
