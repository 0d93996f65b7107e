//! Instruction-stream visitor chain
//!
//! Rewrite rules compose as a chain of [`InsnVisitor`] links: each link
//! observes one instruction at a time and forwards zero or more instructions
//! to the next link. A [`BodyCollector`] terminates every chain. The
//! [`Multicast`] link fans one source stream into several independently
//! configured destination sinks in a single pass.
//!
//! Pass-scoped allocation (fresh labels, fresh local slots) goes through the
//! [`PassCtx`] threaded along every call, so links never need to coordinate
//! slot ranges among themselves.

use crate::error::TransformError;
use weft_classfile::{Handler, Insn, InvokeKind, Label, LabelAlloc, LocalSlot, MethodBody, MethodRef};

/// Per-pass allocators shared by every link of one chain invocation.
#[derive(Debug)]
pub struct PassCtx {
    labels: LabelAlloc,
    next_local: u16,
}

impl PassCtx {
    /// Allocators positioned above everything the source body uses.
    pub fn for_body(body: &MethodBody) -> Self {
        Self {
            labels: LabelAlloc::above(body),
            next_local: body.max_locals,
        }
    }

    pub fn fresh_label(&mut self) -> Label {
        self.labels.fresh()
    }

    /// Reserve a local slot block, returning its base index.
    pub fn new_local(&mut self, width: u16) -> u16 {
        let idx = self.next_local;
        self.next_local += width;
        idx
    }

    /// High-water mark for the output body.
    pub fn max_locals(&self) -> u16 {
        self.next_local
    }
}

/// One link in the rewrite chain.
pub trait InsnVisitor {
    fn insn(&mut self, insn: Insn, ctx: &mut PassCtx) -> Result<(), TransformError>;

    fn handler(&mut self, handler: Handler, ctx: &mut PassCtx) -> Result<(), TransformError>;

    fn local(&mut self, local: LocalSlot, ctx: &mut PassCtx) -> Result<(), TransformError>;

    /// Called once after the whole stream; composition invariants that can
    /// only be judged at end of pass are raised here.
    fn finish(&mut self, ctx: &mut PassCtx) -> Result<(), TransformError>;
}

/// Stream a source body through a chain.
pub fn drive<V: InsnVisitor>(body: &MethodBody, sink: &mut V) -> Result<PassCtx, TransformError> {
    let mut ctx = PassCtx::for_body(body);
    for insn in &body.insns {
        sink.insn(insn.clone(), &mut ctx)?;
    }
    for handler in &body.handlers {
        sink.handler(handler.clone(), &mut ctx)?;
    }
    for local in &body.locals {
        sink.local(local.clone(), &mut ctx)?;
    }
    sink.finish(&mut ctx)?;
    Ok(ctx)
}

/// Terminal link accumulating the output body.
#[derive(Debug, Default)]
pub struct BodyCollector {
    insns: Vec<Insn>,
    handlers: Vec<Handler>,
    locals: Vec<LocalSlot>,
}

impl BodyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected body, sized to the pass's local high-water mark.
    pub fn into_body(self, ctx: &PassCtx) -> MethodBody {
        MethodBody {
            insns: self.insns,
            handlers: self.handlers,
            locals: self.locals,
            max_locals: ctx.max_locals(),
        }
    }
}

impl InsnVisitor for BodyCollector {
    fn insn(&mut self, insn: Insn, _ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.insns.push(insn);
        Ok(())
    }

    fn handler(&mut self, handler: Handler, _ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.handlers.push(handler);
        Ok(())
    }

    fn local(&mut self, local: LocalSlot, _ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.locals.push(local);
        Ok(())
    }

    fn finish(&mut self, _ctx: &mut PassCtx) -> Result<(), TransformError> {
        Ok(())
    }
}

/// Fans one source stream into several destination sinks, preserving order.
#[derive(Debug)]
pub struct Multicast<S> {
    sinks: Vec<S>,
}

impl<S: InsnVisitor> Multicast<S> {
    pub fn new(sinks: Vec<S>) -> Self {
        Self { sinks }
    }

    pub fn into_sinks(self) -> Vec<S> {
        self.sinks
    }
}

impl<S: InsnVisitor> InsnVisitor for Multicast<S> {
    fn insn(&mut self, insn: Insn, ctx: &mut PassCtx) -> Result<(), TransformError> {
        for sink in &mut self.sinks {
            sink.insn(insn.clone(), ctx)?;
        }
        Ok(())
    }

    fn handler(&mut self, handler: Handler, ctx: &mut PassCtx) -> Result<(), TransformError> {
        for sink in &mut self.sinks {
            sink.handler(handler.clone(), ctx)?;
        }
        Ok(())
    }

    fn local(&mut self, local: LocalSlot, ctx: &mut PassCtx) -> Result<(), TransformError> {
        for sink in &mut self.sinks {
            sink.local(local.clone(), ctx)?;
        }
        Ok(())
    }

    fn finish(&mut self, ctx: &mut PassCtx) -> Result<(), TransformError> {
        for sink in &mut self.sinks {
            sink.finish(ctx)?;
        }
        Ok(())
    }
}

/// Substitutes one named/typed callee for another wherever it matches.
///
/// A pass in which the pattern never matches is a configuration defect and
/// fails at [`InsnVisitor::finish`], never silently.
#[derive(Debug)]
pub struct Retarget<V> {
    class: String,
    method: String,
    from: MethodRef,
    to: MethodRef,
    /// Instructions emitted before the substituted call, e.g. extra argument
    /// pushes when the replacement carries additional parameters
    prepend: Vec<Insn>,
    matched: bool,
    inner: V,
}

impl<V: InsnVisitor> Retarget<V> {
    pub fn new(
        class: impl Into<String>,
        method: impl Into<String>,
        from: MethodRef,
        to: MethodRef,
        prepend: Vec<Insn>,
        inner: V,
    ) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
            from,
            to,
            prepend,
            matched: false,
            inner,
        }
    }

    pub fn into_inner(self) -> V {
        self.inner
    }
}

impl<V: InsnVisitor> InsnVisitor for Retarget<V> {
    fn insn(&mut self, insn: Insn, ctx: &mut PassCtx) -> Result<(), TransformError> {
        match insn {
            Insn::Invoke { kind, ref target } if *target == self.from => {
                self.matched = true;
                for extra in &self.prepend {
                    self.inner.insn(extra.clone(), ctx)?;
                }
                self.inner.insn(
                    Insn::Invoke {
                        kind,
                        target: self.to.clone(),
                    },
                    ctx,
                )
            }
            other => self.inner.insn(other, ctx),
        }
    }

    fn handler(&mut self, handler: Handler, ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.inner.handler(handler, ctx)
    }

    fn local(&mut self, local: LocalSlot, ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.inner.local(local, ctx)
    }

    fn finish(&mut self, ctx: &mut PassCtx) -> Result<(), TransformError> {
        if !self.matched {
            return Err(TransformError::RetargetUnmatched {
                class: self.class.clone(),
                method: self.method.clone(),
                from: self.from.clone(),
            });
        }
        self.inner.finish(ctx)
    }
}

/// Converts every value-returning exit into a value-discarding exit.
#[derive(Debug)]
pub struct DiscardResult<V> {
    inner: V,
}

impl<V: InsnVisitor> DiscardResult<V> {
    pub fn new(inner: V) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> V {
        self.inner
    }
}

impl<V: InsnVisitor> InsnVisitor for DiscardResult<V> {
    fn insn(&mut self, insn: Insn, ctx: &mut PassCtx) -> Result<(), TransformError> {
        match insn {
            Insn::Return(Some(_)) => {
                self.inner.insn(Insn::Pop, ctx)?;
                self.inner.insn(Insn::Return(None), ctx)
            }
            other => self.inner.insn(other, ctx),
        }
    }

    fn handler(&mut self, handler: Handler, ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.inner.handler(handler, ctx)
    }

    fn local(&mut self, local: LocalSlot, ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.inner.local(local, ctx)
    }

    fn finish(&mut self, ctx: &mut PassCtx) -> Result<(), TransformError> {
        self.inner.finish(ctx)
    }
}

/// Boxed-link adapter so heterogeneous chains can share one multicast.
impl InsnVisitor for Box<dyn InsnVisitor + '_> {
    fn insn(&mut self, insn: Insn, ctx: &mut PassCtx) -> Result<(), TransformError> {
        (**self).insn(insn, ctx)
    }

    fn handler(&mut self, handler: Handler, ctx: &mut PassCtx) -> Result<(), TransformError> {
        (**self).handler(handler, ctx)
    }

    fn local(&mut self, local: LocalSlot, ctx: &mut PassCtx) -> Result<(), TransformError> {
        (**self).local(local, ctx)
    }

    fn finish(&mut self, ctx: &mut PassCtx) -> Result<(), TransformError> {
        (**self).finish(ctx)
    }
}

/// Used by tests and rules that need the matched `InvokeKind` unchanged.
pub fn invoke(kind: InvokeKind, target: MethodRef) -> Insn {
    Insn::Invoke { kind, target }
}
