//! Transformation errors
//!
//! Every failure aborts the transform of the affected class. Composition
//! invariant violations (an unmatched retarget, crossing handler ranges)
//! surface at the end of the pass that detected them; structural violations
//! surface immediately.

use thiserror::Error;
use weft_classfile::{BodyError, DescError, MethodRef};
use weft_policy::PolicyError;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Body(#[from] BodyError),

    #[error(transparent)]
    Descriptor(#[from] DescError),

    /// Two handler ranges overlap without proper nesting
    #[error("handler ranges cross in {class}.{method}: ({a_start},{a_end}) vs ({b_start},{b_end})")]
    CrossingHandlers {
        class: String,
        method: String,
        a_start: usize,
        a_end: usize,
        b_start: usize,
        b_end: usize,
    },

    /// A retargeting sink finished its pass without matching its pattern
    #[error("retarget of {from} never matched in {class}.{method}")]
    RetargetUnmatched {
        class: String,
        method: String,
        from: MethodRef,
    },

    /// Policy names a method the class no longer declares at transform time
    #[error("transform target {class}.{method} not found")]
    MissingMethod { class: String, method: String },

    /// A rule requires a concrete body but the method is abstract
    #[error("cannot rewrite abstract method {class}.{method}")]
    AbstractTarget { class: String, method: String },

    /// A donor type must declare exactly one constructor
    #[error("shadow type {class} declares {count} constructors, expected exactly one")]
    ShadowConstructorCount { class: String, count: usize },

    /// The donor constructor body does not start with a plain super call
    #[error("shadow constructor of {class} has an unsupported preamble")]
    ShadowConstructorShape { class: String },

    /// A wrapper rule that needs parameters got an incompatible descriptor
    #[error("logical rule {rule} does not fit descriptor {desc} of {class}.{method}")]
    RuleShape {
        class: String,
        method: String,
        rule: &'static str,
        desc: String,
    },
}
