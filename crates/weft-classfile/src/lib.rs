//! Weft class and method body model
//!
//! This crate provides the editable representation of a class definition:
//! an ordered instruction stream with named branch labels, an exception
//! handler table, and local variable metadata, plus the type descriptor
//! utilities and emission helpers the transformation pipeline builds on.

#![warn(rust_2018_idioms)]

pub mod class;
pub mod emit;
pub mod types;
pub mod validate;

pub use class::{
    ClassDef, Const, FieldDef, FieldRef, Handler, Insn, IntOp, InvokeKind, JumpCond, Label,
    LabelAlloc, LocalSlot, MethodBody, MethodDef, MethodRef,
};
pub use types::{flags, DescError, MethodSig, TypeTag};
pub use validate::{label_positions, validate_class, validate_method, BodyError};
