//! Load-time class adaptation pipeline
//!
//! Takes a [`ClassDef`](weft_classfile::ClassDef) plus its resolved
//! [`ClassSpec`](weft_policy::ClassSpec) and rewrites the definition so
//! state changes and operation calls replicate through the coordinator:
//! field access interception, logical operation substitution, lock and
//! transaction boundaries, managed-helper threading, exception handler
//! ordering, and the identity rename/merge engine used to splice support
//! types into foreign classes.
//!
//! [`adapter::transform_class`] is the assembled per-class pass; the
//! individual rules compose through the [`chain`] visitor protocol and are
//! usable on their own.

#![warn(rust_2018_idioms)]

pub mod adapter;
pub mod callouts;
pub mod chain;
pub mod error;
pub mod fields;
pub mod handlers;
pub mod locks;
pub mod logical;
pub mod merge;
pub mod rename;

pub use adapter::transform_class;
pub use chain::{drive, BodyCollector, DiscardResult, InsnVisitor, Multicast, PassCtx, Retarget};
pub use error::TransformError;
pub use fields::FieldInterceptor;
pub use handlers::order_handlers;
pub use locks::{redirect_fast_path, unsupported_body, wrap_auto, wrap_named, AutolockVisitor};
pub use logical::{extend_helper, substitute, HelperExtension, Substitution};
pub use merge::merge_shadow;
pub use rename::{references_identity, ChangeContext, ChangeSet};
