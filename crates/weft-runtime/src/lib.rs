//! Weft runtime support
//!
//! The [`Coordinator`] trait is the only boundary injected code depends on
//! at run time: locking, transaction boundaries, change notification and
//! placeholder resolution. Everything here is an explicit, passed-in
//! service; there are no process-wide singletons.
//!
//! The [`interp`] module executes transformed method bodies against a toy
//! heap so integration tests can observe the coordination behavior of
//! produced definitions.

#![warn(rust_2018_idioms)]

pub mod coordinator;
pub mod interp;
pub mod placeholder;
pub mod recording;
pub mod registry;
pub mod value;

pub use coordinator::{Coordinator, CoordinatorError, NullCoordinator};
pub use interp::{ExecError, Machine};
pub use placeholder::{PlaceholderId, PlaceholderTable};
pub use recording::{CoordinatorEvent, RecordingCoordinator};
pub use registry::ManagedRegistry;
pub use value::{InstanceId, Value};
