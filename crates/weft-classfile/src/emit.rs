//! Emission helpers
//!
//! Free functions for the instruction sequences every rewrite rule needs:
//! pushing the receiver, pushing argument lists with correct slot accounting
//! for wide types, and type-directed returns. Rewrite rules go through these
//! rather than open-coding operand layout.

use crate::class::Insn;
use crate::types::{MethodSig, TypeTag};

/// Push the receiver (`this`, slot 0).
pub fn push_this() -> Insn {
    Insn::LoadLocal(0)
}

/// Slot index of each parameter, honoring wide types.
///
/// `first` is the slot of the first parameter: 1 for instance methods,
/// 0 for statics.
pub fn param_slots(sig: &MethodSig, first: u16) -> Vec<(u16, TypeTag)> {
    let mut out = Vec::with_capacity(sig.params.len());
    let mut slot = first;
    for tag in &sig.params {
        out.push((slot, tag.clone()));
        slot += tag.width();
    }
    out
}

/// Load every parameter in declaration order.
pub fn push_arguments(sig: &MethodSig, first: u16, out: &mut Vec<Insn>) {
    for (slot, _) in param_slots(sig, first) {
        out.push(Insn::LoadLocal(slot));
    }
}

/// The return instruction for a method's return type.
pub fn return_for(ret: &Option<TypeTag>) -> Insn {
    Insn::Return(ret.clone())
}

/// A zero/null/false default constant for a type.
pub fn default_const(tag: &TypeTag) -> Insn {
    match tag {
        TypeTag::Float | TypeTag::Double => Insn::Const(crate::class::Const::Float(0.0)),
        TypeTag::Reference(_) | TypeTag::Array(_) => Insn::Const(crate::class::Const::Null),
        _ => Insn::Const(crate::class::Const::Int(0)),
    }
}
