//! The Coordinator capability interface
//!
//! Injected code reaches the distributed coordination layer exclusively
//! through this trait. Failures propagate to the instrumented caller,
//! except at call sites documented as best-effort, which swallow and log.

use crate::value::{InstanceId, Value};
use thiserror::Error;

/// Failures surfaced by coordination call-outs.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The calling context holds no lock appropriate for the write
    #[error("write access denied for instance {0}")]
    WriteAccessDenied(InstanceId),

    /// A lock operation failed in the coordination layer
    #[error("lock operation failed on {name}: {reason}")]
    Lock { name: String, reason: String },

    /// A placeholder could not be resolved
    #[error("placeholder {0} could not be resolved")]
    Unresolvable(u64),

    /// The instance is not under coordination
    #[error("instance {0} is not managed")]
    NotManaged(InstanceId),
}

/// Capability interface consumed by injected code.
///
/// Every operation must be reachable for a non-participating instance via a
/// single cheap guard check with no other observable cost; implementations
/// therefore treat unknown instances as unmanaged rather than erroring.
pub trait Coordinator: Send + Sync {
    /// Whether an instance participates in coordination.
    fn is_managed(&self, instance: InstanceId) -> bool;

    /// Whether a class name is a recognized instrumented type; the guard
    /// used by dual-path field access at polymorphic call sites.
    fn is_recognized_type(&self, class_name: &str) -> bool;

    /// Open a named transaction boundary.
    fn begin_lock(&self, name: &str, level: i32) -> Result<(), CoordinatorError>;

    /// Close a named transaction boundary.
    fn commit_lock(&self, name: &str) -> Result<(), CoordinatorError>;

    /// Autolock entry around a monitor region.
    fn monitor_enter(&self, instance: InstanceId, level: i32) -> Result<(), CoordinatorError>;

    /// Autolock exit.
    fn monitor_exit(&self, instance: InstanceId) -> Result<(), CoordinatorError>;

    /// Field-change notification. `index` is the array index for element
    /// stores, or `-1` for scalar fields.
    fn field_changed(
        &self,
        owner: &str,
        field: &str,
        value: &Value,
        index: i64,
    ) -> Result<(), CoordinatorError>;

    /// One coarse-grained logical operation notification.
    fn logical_invoke(
        &self,
        instance: InstanceId,
        operation: &str,
        args: &[Value],
    ) -> Result<(), CoordinatorError>;

    /// Fails unless the calling context holds an appropriate lock.
    fn check_write_access(&self, instance: InstanceId) -> Result<(), CoordinatorError>;

    /// Fetch the value behind a placeholder marker.
    fn resolve_placeholder(&self, id: u64) -> Result<Value, CoordinatorError>;

    /// Ensure a reference field of a managed instance is materialized.
    fn resolve_reference(&self, instance: InstanceId, field: &str) -> Result<(), CoordinatorError>;
}

/// The non-participating fallback: nothing is managed, every operation is
/// a cheap no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCoordinator;

impl Coordinator for NullCoordinator {
    fn is_managed(&self, _instance: InstanceId) -> bool {
        false
    }

    fn is_recognized_type(&self, _class_name: &str) -> bool {
        false
    }

    fn begin_lock(&self, _name: &str, _level: i32) -> Result<(), CoordinatorError> {
        Ok(())
    }

    fn commit_lock(&self, _name: &str) -> Result<(), CoordinatorError> {
        Ok(())
    }

    fn monitor_enter(&self, _instance: InstanceId, _level: i32) -> Result<(), CoordinatorError> {
        Ok(())
    }

    fn monitor_exit(&self, _instance: InstanceId) -> Result<(), CoordinatorError> {
        Ok(())
    }

    fn field_changed(
        &self,
        _owner: &str,
        _field: &str,
        _value: &Value,
        _index: i64,
    ) -> Result<(), CoordinatorError> {
        Ok(())
    }

    fn logical_invoke(
        &self,
        _instance: InstanceId,
        _operation: &str,
        _args: &[Value],
    ) -> Result<(), CoordinatorError> {
        Ok(())
    }

    fn check_write_access(&self, _instance: InstanceId) -> Result<(), CoordinatorError> {
        Ok(())
    }

    fn resolve_placeholder(&self, id: u64) -> Result<Value, CoordinatorError> {
        Err(CoordinatorError::Unresolvable(id))
    }

    fn resolve_reference(
        &self,
        _instance: InstanceId,
        _field: &str,
    ) -> Result<(), CoordinatorError> {
        Ok(())
    }
}
