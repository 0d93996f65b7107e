//! Lock and transaction boundary insertion
//!
//! Named locks wrap a whole method: begin call-outs precede the original
//! body, and a commit fires on every exit path, normal returns and thrown
//! exceptions alike, through a synthesized catch-all handler that commits
//! and rethrows. Autolocks instead shadow the method's monitor instructions
//! with coordinator enter/exit call-outs.
//!
//! Also here: replacement bodies for introspection operations with no
//! distributed equivalent, and the managed-mode redirect that disables
//! optimistic lock-free read paths, which are unsafe under coordination
//! because a remote update may be in flight but not yet visible locally.

use crate::callouts;
use crate::chain::{InsnVisitor, PassCtx};
use crate::error::TransformError;
use weft_classfile::{
    emit, Const, Handler, Insn, InvokeKind, JumpCond, LabelAlloc, LocalSlot, MethodBody,
    MethodDef, MethodRef, MethodSig,
};
use weft_policy::{auto_lock, named_lock, LockDef};

fn begin_seq(wire_name: &str, level: i32, out: &mut Vec<Insn>) {
    out.push(Insn::Const(Const::Str(wire_name.to_string())));
    out.push(Insn::Const(Const::Int(level as i64)));
    out.push(Insn::Invoke {
        kind: InvokeKind::Static,
        target: callouts::begin_lock(),
    });
}

fn commit_seq(wire_name: &str, out: &mut Vec<Insn>) {
    out.push(Insn::Const(Const::Str(wire_name.to_string())));
    out.push(Insn::Invoke {
        kind: InvokeKind::Static,
        target: callouts::commit_lock(),
    });
}

/// Wrap a body in begin/commit boundaries for the given named locks.
///
/// Locks begin in declaration order and commit in reverse, on the normal
/// return paths and on the catch-all rethrow path.
pub fn wrap_named(body: &mut MethodBody, locks: &[&LockDef]) {
    if locks.is_empty() {
        return;
    }
    let begins: Vec<(String, i32)> = locks
        .iter()
        .map(|lock| (named_lock(&lock.name), lock.level.as_i32()))
        .collect();
    wrap_exits(body, &begins);
}

/// Wrap an autolocked method in begin/commit boundaries under its `@` wire
/// name, the method-level counterpart of the monitor shadowing below.
pub fn wrap_auto(body: &mut MethodBody, class: &str, sig_key: &str, level: i32) {
    wrap_exits(body, &[(auto_lock(class, sig_key), level)]);
}

fn wrap_exits(body: &mut MethodBody, begins: &[(String, i32)]) {
    let mut labels = LabelAlloc::above(body);
    let l_try = labels.fresh();
    let l_end = labels.fresh();
    let l_catch = labels.fresh();

    let mut insns = Vec::with_capacity(body.insns.len() + 8);
    for (name, level) in begins {
        begin_seq(name, *level, &mut insns);
    }
    insns.push(Insn::Label(l_try));
    for insn in body.insns.drain(..) {
        if let Insn::Return(ret) = insn {
            for (name, _) in begins.iter().rev() {
                commit_seq(name, &mut insns);
            }
            insns.push(Insn::Return(ret));
        } else {
            insns.push(insn);
        }
    }
    insns.push(Insn::Label(l_end));
    insns.push(Insn::Label(l_catch));
    for (name, _) in begins.iter().rev() {
        commit_seq(name, &mut insns);
    }
    insns.push(Insn::Throw);

    let order = body
        .handlers
        .iter()
        .map(|h| h.order + 1)
        .max()
        .unwrap_or(0);
    body.handlers.push(Handler {
        start: l_try,
        end: l_end,
        target: l_catch,
        catch_type: None,
        order,
    });
    body.insns = insns;
}

/// Chain link shadowing monitor regions with autolock call-outs.
#[derive(Debug)]
pub struct AutolockVisitor<V> {
    level: i32,
    next: V,
}

impl<V: InsnVisitor> AutolockVisitor<V> {
    pub fn new(level: i32, next: V) -> Self {
        Self { level, next }
    }

    pub fn into_inner(self) -> V {
        self.next
    }
}

impl<V: InsnVisitor> InsnVisitor for AutolockVisitor<V> {
    fn insn(&mut self, insn: Insn, ctx: &mut PassCtx) -> Result<(), TransformError> {
        match insn {
            Insn::MonitorEnter => {
                self.next.insn(Insn::Dup, ctx)?;
                self.next
                    .insn(Insn::Const(Const::Int(self.level as i64)), ctx)?;
                self.next.insn(
                    Insn::Invoke {
                        kind: InvokeKind::Static,
                        target: callouts::monitor_enter(),
                    },
                    ctx,
                )?;
                self.next.insn(Insn::MonitorEnter, ctx)
            }
            Insn::MonitorExit => {
                self.next.insn(Insn::Dup, ctx)?;
                self.next.insn(
                    Insn::Invoke {
                        kind: InvokeKind::Static,
                        target: callouts::monitor_exit(),
                    },
                    ctx,
                )?;
                self.next.insn(Insn::MonitorExit, ctx)
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

/// Body that unconditionally signals the operation is unsupported.
pub fn unsupported_body(min_locals: u16) -> MethodBody {
    MethodBody {
        insns: vec![
            Insn::New("java/lang/UnsupportedOperationException".to_string()),
            Insn::Dup,
            Insn::Invoke {
                kind: InvokeKind::Special,
                target: MethodRef::new("java/lang/UnsupportedOperationException", "<init>", "()V"),
            },
            Insn::Throw,
        ],
        max_locals: min_locals,
        ..Default::default()
    }
}

/// Prepend the managed-mode redirect onto an optimistic fast path.
///
/// When the receiver is managed the call forwards to the lock-taking
/// counterpart; otherwise the original body runs unchanged.
pub fn redirect_fast_path(
    class: &str,
    method: &MethodDef,
    full_path: &str,
) -> Result<MethodBody, TransformError> {
    let body = method.body.as_ref().ok_or(TransformError::AbstractTarget {
        class: class.to_string(),
        method: method.sig_key(),
    })?;
    let sig = MethodSig::parse(&method.desc)?;
    let mut labels = LabelAlloc::above(body);
    let l_orig = labels.fresh();

    let mut insns = Vec::with_capacity(body.insns.len() + 8);
    insns.push(emit::push_this());
    insns.push(Insn::Invoke {
        kind: InvokeKind::Static,
        target: callouts::is_managed(),
    });
    insns.push(Insn::Jump {
        cond: JumpCond::IfZero,
        target: l_orig,
    });
    insns.push(emit::push_this());
    emit::push_arguments(&sig, 1, &mut insns);
    insns.push(Insn::Invoke {
        kind: InvokeKind::Virtual,
        target: MethodRef::new(class, full_path, method.desc.clone()),
    });
    insns.push(emit::return_for(&sig.ret));
    insns.push(Insn::Label(l_orig));
    insns.extend(body.insns.iter().cloned());

    Ok(MethodBody {
        insns,
        handlers: body.handlers.clone(),
        locals: body.locals.clone(),
        max_locals: body.max_locals,
    })
}
