//! Field access interception
//!
//! Rewrites field reads and writes inside physically adapted methods.
//! Classification is along three axes: whether the field is a root or
//! portable, whether its declaring class lies within the adaptation
//! boundary, and whether the concrete instance type is known statically at
//! the call site.
//!
//! Accesses to the class's own root/portable fields rewrite unconditionally
//! to the generated accessor pair. Accesses to a peer boundary class go
//! through a guarded dual path, since the concrete instance observed at run
//! time may predate instrumentation: the recognized-type guard selects the
//! accessor call, the fallback executes the original access. Everything
//! else passes through unchanged.

use crate::callouts;
use crate::chain::{InsnVisitor, PassCtx};
use crate::error::TransformError;
use weft_classfile::{FieldRef, Handler, Insn, InvokeKind, JumpCond, LocalSlot, MethodRef, TypeTag};
use weft_policy::{getter_name, setter_name, ClassSpec};

enum Access {
    /// Rewrite to the generated accessor, no guard
    Direct,
    /// Guarded dual path against the declaring peer class
    Guarded,
    /// Leave the instruction alone
    Passthrough,
}

/// Chain link replacing field instructions per the class spec.
#[derive(Debug)]
pub struct FieldInterceptor<'a, V> {
    spec: &'a ClassSpec,
    next: V,
}

impl<'a, V: InsnVisitor> FieldInterceptor<'a, V> {
    pub fn new(spec: &'a ClassSpec, next: V) -> Self {
        Self { spec, next }
    }

    pub fn into_inner(self) -> V {
        self.next
    }

    fn classify(&self, fr: &FieldRef) -> Access {
        if weft_policy::naming::is_synthetic_name(&fr.name) {
            return Access::Passthrough;
        }
        if fr.owner == self.spec.name {
            if self.spec.is_root(&fr.name) || self.spec.is_portable_field(&fr.name) {
                return Access::Direct;
            }
            return Access::Passthrough;
        }
        if self.spec.in_boundary(&fr.owner) {
            return Access::Guarded;
        }
        Access::Passthrough
    }

    fn getter_ref(fr: &FieldRef) -> MethodRef {
        MethodRef::new(
            fr.owner.clone(),
            getter_name(&fr.name),
            format!("(){}", fr.desc),
        )
    }

    fn setter_ref(fr: &FieldRef) -> MethodRef {
        MethodRef::new(
            fr.owner.clone(),
            setter_name(&fr.name),
            format!("({})V", fr.desc),
        )
    }

    /// Guarded read: stack holds the receiver reference.
    fn emit_guarded_get(
        &mut self,
        fr: FieldRef,
        ctx: &mut PassCtx,
    ) -> Result<(), TransformError> {
        let l_raw = ctx.fresh_label();
        let l_done = ctx.fresh_label();
        self.next.insn(Insn::Dup, ctx)?;
        self.next.insn(
            Insn::Invoke {
                kind: InvokeKind::Static,
                target: callouts::is_recognized(),
            },
            ctx,
        )?;
        self.next.insn(
            Insn::Jump {
                cond: JumpCond::IfZero,
                target: l_raw,
            },
            ctx,
        )?;
        self.next.insn(
            Insn::Invoke {
                kind: InvokeKind::Virtual,
                target: Self::getter_ref(&fr),
            },
            ctx,
        )?;
        self.next.insn(
            Insn::Jump {
                cond: JumpCond::Always,
                target: l_done,
            },
            ctx,
        )?;
        self.next.insn(Insn::Label(l_raw), ctx)?;
        self.next.insn(Insn::GetField(fr), ctx)?;
        self.next.insn(Insn::Label(l_done), ctx)
    }

    /// Guarded write: stack holds receiver then value. The value spills to a
    /// fresh local so both branches can reload it over the bare receiver.
    fn emit_guarded_put(
        &mut self,
        fr: FieldRef,
        ctx: &mut PassCtx,
    ) -> Result<(), TransformError> {
        let width = TypeTag::parse(&fr.desc)?.width();
        let tmp = ctx.new_local(width);
        let l_raw = ctx.fresh_label();
        let l_done = ctx.fresh_label();
        self.next.insn(Insn::StoreLocal(tmp), ctx)?;
        self.next.insn(Insn::Dup, ctx)?;
        self.next.insn(
            Insn::Invoke {
                kind: InvokeKind::Static,
                target: callouts::is_recognized(),
            },
            ctx,
        )?;
        self.next.insn(
            Insn::Jump {
                cond: JumpCond::IfZero,
                target: l_raw,
            },
            ctx,
        )?;
        self.next.insn(Insn::LoadLocal(tmp), ctx)?;
        self.next.insn(
            Insn::Invoke {
                kind: InvokeKind::Virtual,
                target: Self::setter_ref(&fr),
            },
            ctx,
        )?;
        self.next.insn(
            Insn::Jump {
                cond: JumpCond::Always,
                target: l_done,
            },
            ctx,
        )?;
        self.next.insn(Insn::Label(l_raw), ctx)?;
        self.next.insn(Insn::LoadLocal(tmp), ctx)?;
        self.next.insn(Insn::PutField(fr), ctx)?;
        self.next.insn(Insn::Label(l_done), ctx)
    }
}

impl<'a, V: InsnVisitor> InsnVisitor for FieldInterceptor<'a, V> {
    fn insn(&mut self, insn: Insn, ctx: &mut PassCtx) -> Result<(), TransformError> {
        match insn {
            Insn::GetField(fr) => match self.classify(&fr) {
                Access::Direct => self.next.insn(
                    Insn::Invoke {
                        kind: InvokeKind::Virtual,
                        target: Self::getter_ref(&fr),
                    },
                    ctx,
                ),
                Access::Guarded => self.emit_guarded_get(fr, ctx),
                Access::Passthrough => self.next.insn(Insn::GetField(fr), ctx),
            },
            Insn::PutField(fr) => match self.classify(&fr) {
                Access::Direct => self.next.insn(
                    Insn::Invoke {
                        kind: InvokeKind::Virtual,
                        target: Self::setter_ref(&fr),
                    },
                    ctx,
                ),
                Access::Guarded => self.emit_guarded_put(fr, ctx),
                Access::Passthrough => self.next.insn(Insn::PutField(fr), ctx),
            },
            // Static accesses rewrite only for the class's own roots; peer
            // statics resolve statically, so no guard is ever needed.
            Insn::GetStatic(fr)
                if fr.owner == self.spec.name && self.spec.is_root(&fr.name) =>
            {
                self.next.insn(
                    Insn::Invoke {
                        kind: InvokeKind::Static,
                        target: Self::getter_ref(&fr),
                    },
                    ctx,
                )
            }
            Insn::PutStatic(fr)
                if fr.owner == self.spec.name && self.spec.is_root(&fr.name) =>
            {
                self.next.insn(
                    Insn::Invoke {
                        kind: InvokeKind::Static,
                        target: Self::setter_ref(&fr),
                    },
                    ctx,
                )
            }
            other => self.next.insn(other, ctx),
        }
    }

    fn handler(&mut self, handler: Handler, ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.next.handler(handler, ctx)
    }

    fn local(&mut self, local: LocalSlot, ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.next.local(local, ctx)
    }

    fn finish(&mut self, ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.next.finish(ctx)
    }
}
