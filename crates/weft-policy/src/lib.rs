//! Instrumentation policy and per-class spec resolution
//!
//! A [`PolicySet`] is the declarative input describing which classes adapt
//! and how. [`resolve`](resolve::PolicyResolver::resolve) turns one class
//! definition plus the policy into an immutable [`ClassSpec`] consumed by
//! the transformation pipeline. Classification is total: an adaptable
//! class member matching no rule is a fatal error, never a silent default.

#![warn(rust_2018_idioms)]

pub mod config;
pub mod model;
pub mod naming;
pub mod resolve;

pub use config::{
    ClassPolicy, FastPathConfig, LockConfig, LogicalOpConfig, ManagedHelperConfig, PolicySet,
};
pub use model::{
    AdaptTier, ClassSpec, LibraryVariant, LockDef, LockLevel, LogicalOpSpec, WrapperKind,
};
pub use naming::{
    auto_lock, getter_name, named_lock, names, setter_name, split_sig_key, NamingRegistry,
};
pub use resolve::{PolicyError, PolicyResolver};
