//! Structural validation
//!
//! Checks the verifier-level invariants the pipeline must preserve: every
//! referenced label defined exactly once, handler ranges well formed, local
//! slot references in bounds. Violations are fatal and reported on first
//! detection.

use crate::class::{Insn, Label, MethodBody, MethodDef};
use crate::types::{DescError, MethodSig};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Structural violations in a method body
#[derive(Debug, Error)]
pub enum BodyError {
    /// A label instruction appears more than once
    #[error("label {0} defined more than once")]
    DuplicateLabel(Label),

    /// A referenced label has no defining instruction
    #[error("undefined label {label} referenced by {referent}")]
    UndefinedLabel { label: Label, referent: String },

    /// Handler start does not precede its end
    #[error("handler #{index} range is inverted or empty ({start}..{end})")]
    BadHandlerRange {
        index: usize,
        start: Label,
        end: Label,
    },

    /// Local variable slot beyond `max_locals`
    #[error("local slot {index} out of bounds (max_locals {max})")]
    LocalOutOfBounds { index: u16, max: u16 },

    /// Malformed type descriptor
    #[error("bad descriptor: {0}")]
    BadDescriptor(#[from] DescError),

    /// Abstract/native method carrying a body, or the reverse
    #[error("method {0} body presence inconsistent with access flags")]
    BodyMismatch(String),
}

/// Map each defined label to its instruction index, rejecting duplicates.
pub fn label_positions(body: &MethodBody) -> Result<FxHashMap<Label, usize>, BodyError> {
    let mut positions = FxHashMap::default();
    for (idx, insn) in body.insns.iter().enumerate() {
        if let Insn::Label(label) = insn {
            if positions.insert(*label, idx).is_some() {
                return Err(BodyError::DuplicateLabel(*label));
            }
        }
    }
    Ok(positions)
}

/// Validate one method body against a parsed descriptor.
pub fn validate_method(method: &MethodDef) -> Result<(), BodyError> {
    let sig = MethodSig::parse(&method.desc)?;

    let body = match &method.body {
        Some(body) => body,
        None => return Ok(()),
    };

    let positions = label_positions(body)?;
    let lookup = |label: Label, referent: &str| -> Result<usize, BodyError> {
        positions
            .get(&label)
            .copied()
            .ok_or_else(|| BodyError::UndefinedLabel {
                label,
                referent: referent.to_string(),
            })
    };

    for insn in &body.insns {
        match insn {
            Insn::Jump { target, .. } => {
                lookup(*target, "branch")?;
            }
            Insn::LoadLocal(idx) | Insn::StoreLocal(idx) => {
                if *idx >= body.max_locals {
                    return Err(BodyError::LocalOutOfBounds {
                        index: *idx,
                        max: body.max_locals,
                    });
                }
            }
            _ => {}
        }
    }

    for (index, handler) in body.handlers.iter().enumerate() {
        let start = lookup(handler.start, "handler start")?;
        let end = lookup(handler.end, "handler end")?;
        lookup(handler.target, "handler target")?;
        if start >= end {
            return Err(BodyError::BadHandlerRange {
                index,
                start: handler.start,
                end: handler.end,
            });
        }
    }

    for slot in &body.locals {
        lookup(slot.start, "local range start")?;
        lookup(slot.end, "local range end")?;
        if slot.index >= body.max_locals {
            return Err(BodyError::LocalOutOfBounds {
                index: slot.index,
                max: body.max_locals,
            });
        }
    }

    // The receiver plus parameters must fit in the declared local table.
    let is_static = method.access & crate::types::flags::ACC_STATIC != 0;
    let param_slots = sig.param_slots() + if is_static { 0 } else { 1 };
    if param_slots > body.max_locals {
        return Err(BodyError::LocalOutOfBounds {
            index: param_slots.saturating_sub(1),
            max: body.max_locals,
        });
    }

    Ok(())
}

/// Validate every method of a class definition.
pub fn validate_class(class: &crate::class::ClassDef) -> Result<(), BodyError> {
    for method in &class.methods {
        let abstract_or_native = method.access
            & (crate::types::flags::ACC_ABSTRACT | crate::types::flags::ACC_NATIVE)
            != 0;
        if abstract_or_native == method.body.is_some() {
            return Err(BodyError::BodyMismatch(method.sig_key()));
        }
        validate_method(method)?;
    }
    Ok(())
}
