//! Logical operation substitution
//!
//! A method tagged as a logical operation keeps its original logic under a
//! mangled alias; a synthesized replacement of the original name delegates
//! to the alias and, when the receiver is managed, issues exactly one
//! coordinator notification per externally visible call. The wrapper shape
//! varies by [`WrapperKind`]: unconditional, success-conditional, key
//! normalization through an existing map entry, per-element fan-out for
//! bulk operations, and the no-previous-value variant whose suppressed
//! return must never be observed by callers.
//!
//! Internal helpers listed as managed helpers are mangled with a trailing
//! boolean so their call sites can thread the caller's managed state
//! through; call-site rewriting happens through the multicast retarget
//! sink, which fails the pass if the helper call never appears.

use crate::callouts;
use crate::error::TransformError;
use weft_classfile::{
    emit, flags, Const, Insn, InvokeKind, Label, LabelAlloc, MethodBody, MethodDef, MethodRef,
    MethodSig, TypeTag,
};
use weft_policy::{split_sig_key, LogicalOpSpec, NamingRegistry, WrapperKind};

/// Output of substituting one logical operation.
#[derive(Debug)]
pub struct Substitution {
    /// Original logic under its mangled name
    pub alias: MethodDef,
    /// Replacement carrying the original name and descriptor
    pub wrapper: MethodDef,
}

/// Output of mangling one managed helper.
#[derive(Debug)]
pub struct HelperExtension {
    /// The helper under its mangled name with the trailing flag parameter
    pub helper: MethodDef,
    /// Call pattern the callers must retarget from
    pub from: MethodRef,
    /// Replacement callee
    pub to: MethodRef,
    /// Pushes the receiver's managed state as the extra argument
    pub prepend: Vec<Insn>,
}

struct WrapperEmit {
    insns: Vec<Insn>,
    labels: LabelAlloc,
    max_locals: u16,
}

impl WrapperEmit {
    fn new(param_end: u16) -> Self {
        Self {
            insns: Vec::new(),
            labels: LabelAlloc::new(),
            max_locals: param_end,
        }
    }

    fn local(&mut self, width: u16) -> u16 {
        let idx = self.max_locals;
        self.max_locals += width;
        idx
    }

    fn push(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    fn label(&mut self) -> Label {
        self.labels.fresh()
    }

    fn invoke_static(&mut self, target: MethodRef) {
        self.push(Insn::Invoke {
            kind: InvokeKind::Static,
            target,
        });
    }

    fn jump_if_zero(&mut self, target: Label) {
        self.push(Insn::Jump {
            cond: weft_classfile::JumpCond::IfZero,
            target,
        });
    }

    fn jump(&mut self, target: Label) {
        self.push(Insn::Jump {
            cond: weft_classfile::JumpCond::Always,
            target,
        });
    }

    /// `this; args...; invokespecial alias`
    fn delegate(&mut self, class: &str, alias: &str, sig: &MethodSig, desc: &str) {
        self.push(emit::push_this());
        emit::push_arguments(sig, 1, &mut self.insns);
        self.push(Insn::Invoke {
            kind: InvokeKind::Special,
            target: MethodRef::new(class, alias, desc),
        });
    }

    /// One notification carrying the operation name and the current
    /// parameter values.
    fn notify(&mut self, op_name: &str, sig: &MethodSig) {
        self.push(emit::push_this());
        self.push(Insn::Const(Const::Str(op_name.to_string())));
        let object = TypeTag::Reference("java/lang/Object".to_string());
        self.push(Insn::Const(Const::Int(sig.params.len() as i64)));
        self.push(Insn::NewArray(object.clone()));
        for (i, (slot, _)) in emit::param_slots(sig, 1).into_iter().enumerate() {
            self.push(Insn::Dup);
            self.push(Insn::Const(Const::Int(i as i64)));
            self.push(Insn::LoadLocal(slot));
            self.push(Insn::ArrayStore(object.clone()));
        }
        self.invoke_static(callouts::logical_invoke());
    }
}

/// Replace a logical operation with its alias and wrapper pair.
pub fn substitute(
    class: &str,
    method: &MethodDef,
    op: &LogicalOpSpec,
    registry: &mut NamingRegistry,
) -> Result<Substitution, TransformError> {
    if method.body.is_none() {
        return Err(TransformError::AbstractTarget {
            class: class.to_string(),
            method: method.sig_key(),
        });
    }
    let sig = MethodSig::parse(&method.desc)?;
    let alias_name = registry.renamed_original(&method.name);

    let mut alias = method.clone();
    alias.name = alias_name.clone();
    alias.access = (method.access & !(flags::ACC_PUBLIC | flags::ACC_PROTECTED))
        | flags::ACC_PRIVATE
        | flags::ACC_SYNTHETIC;

    let body = build_wrapper(class, method, op, &alias_name, &sig)?;
    let wrapper = MethodDef {
        access: method.access,
        name: method.name.clone(),
        desc: method.desc.clone(),
        signature: method.signature.clone(),
        exceptions: method.exceptions.clone(),
        body: Some(body),
    };
    Ok(Substitution { alias, wrapper })
}

fn rule_shape(class: &str, method: &MethodDef, rule: &'static str) -> TransformError {
    TransformError::RuleShape {
        class: class.to_string(),
        method: method.name.clone(),
        rule,
        desc: method.desc.clone(),
    }
}

fn build_wrapper(
    class: &str,
    method: &MethodDef,
    op: &LogicalOpSpec,
    alias: &str,
    sig: &MethodSig,
) -> Result<MethodBody, TransformError> {
    let param_end = 1 + sig.param_slots();
    let mut w = WrapperEmit::new(param_end);

    // Managed state computed once up front, shared by every later guard.
    let flag = w.local(1);
    w.push(emit::push_this());
    w.invoke_static(callouts::is_managed());
    w.push(Insn::StoreLocal(flag));

    if op.check_write {
        let l_skip = w.label();
        w.push(Insn::LoadLocal(flag));
        w.jump_if_zero(l_skip);
        w.push(emit::push_this());
        w.invoke_static(callouts::check_write_access());
        w.push(Insn::Label(l_skip));
    }

    match &op.kind {
        WrapperKind::Always => {
            w.delegate(class, alias, sig, &method.desc);
            let l_ret = w.label();
            w.push(Insn::LoadLocal(flag));
            w.jump_if_zero(l_ret);
            w.notify(&op.sig_key, sig);
            w.push(Insn::Label(l_ret));
            w.push(emit::return_for(&sig.ret));
        }
        WrapperKind::IfTrue => {
            if !matches!(sig.ret, Some(TypeTag::Boolean) | Some(TypeTag::Int)) {
                return Err(rule_shape(class, method, "if-true"));
            }
            w.delegate(class, alias, sig, &method.desc);
            let l_ret = w.label();
            w.push(Insn::LoadLocal(flag));
            w.jump_if_zero(l_ret);
            // Result stays beneath for the return; the copy drives the guard.
            w.push(Insn::Dup);
            w.jump_if_zero(l_ret);
            w.notify(&op.sig_key, sig);
            w.push(Insn::Label(l_ret));
            w.push(emit::return_for(&sig.ret));
        }
        WrapperKind::MapPut { entry_lookup } => {
            let (lookup_name, lookup_desc) = split_sig_key(entry_lookup)
                .ok_or_else(|| rule_shape(class, method, "map-put"))?;
            if !matches!(sig.params.first(), Some(t) if t.is_reference()) {
                return Err(rule_shape(class, method, "map-put"));
            }
            // Normalize the key through the stored entry when managed.
            let l_call = w.label();
            let l_drop = w.label();
            w.push(Insn::LoadLocal(flag));
            w.jump_if_zero(l_call);
            w.push(emit::push_this());
            w.push(Insn::LoadLocal(1));
            w.push(Insn::Invoke {
                kind: InvokeKind::Virtual,
                target: MethodRef::new(class, lookup_name, lookup_desc),
            });
            w.push(Insn::Dup);
            w.push(Insn::Jump {
                cond: weft_classfile::JumpCond::IfNull,
                target: l_drop,
            });
            w.push(Insn::StoreLocal(1));
            w.jump(l_call);
            w.push(Insn::Label(l_drop));
            w.push(Insn::Pop);
            w.push(Insn::Label(l_call));

            w.delegate(class, alias, sig, &method.desc);
            let l_ret = w.label();
            w.push(Insn::LoadLocal(flag));
            w.jump_if_zero(l_ret);
            w.notify(&op.sig_key, sig);
            w.push(Insn::Label(l_ret));
            w.push(emit::return_for(&sig.ret));
        }
        WrapperKind::MapRemove { entry_lookup } => {
            let (lookup_name, lookup_desc) = split_sig_key(entry_lookup)
                .ok_or_else(|| rule_shape(class, method, "map-remove"))?;
            if !matches!(sig.params.first(), Some(t) if t.is_reference()) {
                return Err(rule_shape(class, method, "map-remove"));
            }
            // An absent entry means no notification; a present one supplies
            // the normalized key.
            let had_entry = w.local(1);
            w.push(Insn::Const(Const::Int(0)));
            w.push(Insn::StoreLocal(had_entry));
            let l_call = w.label();
            let l_drop = w.label();
            w.push(Insn::LoadLocal(flag));
            w.jump_if_zero(l_call);
            w.push(emit::push_this());
            w.push(Insn::LoadLocal(1));
            w.push(Insn::Invoke {
                kind: InvokeKind::Virtual,
                target: MethodRef::new(class, lookup_name, lookup_desc),
            });
            w.push(Insn::Dup);
            w.push(Insn::Jump {
                cond: weft_classfile::JumpCond::IfNull,
                target: l_drop,
            });
            w.push(Insn::StoreLocal(1));
            w.push(Insn::Const(Const::Int(1)));
            w.push(Insn::StoreLocal(had_entry));
            w.jump(l_call);
            w.push(Insn::Label(l_drop));
            w.push(Insn::Pop);
            w.push(Insn::Label(l_call));

            w.delegate(class, alias, sig, &method.desc);
            let l_ret = w.label();
            w.push(Insn::LoadLocal(had_entry));
            w.jump_if_zero(l_ret);
            w.notify(&op.sig_key, sig);
            w.push(Insn::Label(l_ret));
            w.push(emit::return_for(&sig.ret));
        }
        WrapperKind::EachElement { element_op } => {
            // Bulk argument must be an object array to iterate.
            if sig.params.len() != 1 || !matches!(sig.params[0], TypeTag::Array(_)) {
                return Err(rule_shape(class, method, "each-element"));
            }
            w.delegate(class, alias, sig, &method.desc);

            let l_ret = w.label();
            let l_loop = w.label();
            w.push(Insn::LoadLocal(flag));
            w.jump_if_zero(l_ret);

            let i = w.local(1);
            let object = TypeTag::Reference("java/lang/Object".to_string());
            w.push(Insn::Const(Const::Int(0)));
            w.push(Insn::StoreLocal(i));
            w.push(Insn::Label(l_loop));
            w.push(Insn::LoadLocal(i));
            w.push(Insn::LoadLocal(1));
            w.push(Insn::ArrayLen);
            w.push(Insn::Jump {
                cond: weft_classfile::JumpCond::IfIntGe,
                target: l_ret,
            });
            // One notification per element, in iteration order.
            w.push(emit::push_this());
            w.push(Insn::Const(Const::Str(element_op.clone())));
            w.push(Insn::Const(Const::Int(1)));
            w.push(Insn::NewArray(object.clone()));
            w.push(Insn::Dup);
            w.push(Insn::Const(Const::Int(0)));
            w.push(Insn::LoadLocal(1));
            w.push(Insn::LoadLocal(i));
            w.push(Insn::ArrayLoad(object.clone()));
            w.push(Insn::ArrayStore(object));
            w.invoke_static(callouts::logical_invoke());
            w.push(Insn::LoadLocal(i));
            w.push(Insn::Const(Const::Int(1)));
            w.push(Insn::Arith(weft_classfile::IntOp::Add));
            w.push(Insn::StoreLocal(i));
            w.jump(l_loop);

            w.push(Insn::Label(l_ret));
            w.push(emit::return_for(&sig.ret));
        }
        WrapperKind::NoPrevious => {
            // Unmanaged callers keep the real result; managed callers get
            // the suppressed-previous-value variant and must not rely on it.
            let l_plain = w.label();
            w.push(Insn::LoadLocal(flag));
            w.jump_if_zero(l_plain);
            w.delegate(class, alias, sig, &method.desc);
            if sig.ret.is_some() {
                w.push(Insn::Pop);
            }
            w.notify(&op.sig_key, sig);
            if let Some(ret) = &sig.ret {
                w.push(emit::default_const(ret));
            }
            w.push(emit::return_for(&sig.ret));
            w.push(Insn::Label(l_plain));
            w.delegate(class, alias, sig, &method.desc);
            w.push(emit::return_for(&sig.ret));
        }
    }

    Ok(MethodBody {
        insns: w.insns,
        handlers: Vec::new(),
        locals: Vec::new(),
        max_locals: w.max_locals,
    })
}

/// Mangle an internal helper to carry the caller's managed flag.
pub fn extend_helper(
    class: &str,
    helper: &MethodDef,
    registry: &mut NamingRegistry,
) -> Result<HelperExtension, TransformError> {
    let body = helper.body.as_ref().ok_or(TransformError::AbstractTarget {
        class: class.to_string(),
        method: helper.sig_key(),
    })?;
    let mut sig = MethodSig::parse(&helper.desc)?;
    sig.params.push(TypeTag::Boolean);
    let extended_desc = sig.descriptor();
    let mangled = registry.method(&helper.name);

    let needed = 1 + sig.param_slots();
    let mut new_body = body.clone();
    if new_body.max_locals < needed {
        new_body.max_locals = needed;
    }
    let extended = MethodDef {
        access: (helper.access & !(flags::ACC_PUBLIC | flags::ACC_PROTECTED))
            | flags::ACC_PRIVATE
            | flags::ACC_SYNTHETIC,
        name: mangled.clone(),
        desc: extended_desc.clone(),
        signature: None,
        exceptions: helper.exceptions.clone(),
        body: Some(new_body),
    };

    Ok(HelperExtension {
        helper: extended,
        from: MethodRef::new(class, helper.name.clone(), helper.desc.clone()),
        to: MethodRef::new(class, mangled, extended_desc),
        prepend: vec![
            emit::push_this(),
            Insn::Invoke {
                kind: InvokeKind::Static,
                target: callouts::is_managed(),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_classfile::{validate_method, ClassDef};

    fn list_method(name: &str, desc: &str) -> MethodDef {
        MethodDef {
            access: flags::ACC_PUBLIC,
            name: name.to_string(),
            desc: desc.to_string(),
            signature: None,
            exceptions: Vec::new(),
            body: Some(MethodBody {
                insns: vec![Insn::Const(Const::Int(1)), Insn::Return(Some(TypeTag::Boolean))],
                max_locals: 4,
                ..Default::default()
            }),
        }
    }

    fn op(key: &str, kind: WrapperKind) -> LogicalOpSpec {
        LogicalOpSpec {
            sig_key: key.to_string(),
            kind,
            check_write: true,
        }
    }

    fn registry() -> NamingRegistry {
        NamingRegistry::for_class(&ClassDef::new("t/List"))
    }

    #[test]
    fn alias_keeps_logic_wrapper_keeps_name() {
        let method = list_method("remove", "(Ljava/lang/Object;)Z");
        let sub = substitute(
            "t/List",
            &method,
            &op("remove(Ljava/lang/Object;)Z", WrapperKind::IfTrue),
            &mut registry(),
        )
        .unwrap();
        assert_eq!(sub.alias.name, "__wc_wrapped_remove");
        assert_eq!(sub.alias.body, method.body);
        assert_ne!(sub.alias.access & flags::ACC_PRIVATE, 0);
        assert_eq!(sub.wrapper.name, "remove");
        assert_eq!(sub.wrapper.desc, method.desc);
        validate_method(&sub.wrapper).unwrap();
    }

    #[test]
    fn wrapper_delegates_and_notifies() {
        let method = list_method("remove", "(Ljava/lang/Object;)Z");
        let sub = substitute(
            "t/List",
            &method,
            &op("remove(Ljava/lang/Object;)Z", WrapperKind::IfTrue),
            &mut registry(),
        )
        .unwrap();
        let insns = &sub.wrapper.body.as_ref().unwrap().insns;
        assert!(insns.contains(&Insn::Invoke {
            kind: InvokeKind::Special,
            target: MethodRef::new("t/List", "__wc_wrapped_remove", "(Ljava/lang/Object;)Z"),
        }));
        assert!(insns.contains(&Insn::Invoke {
            kind: InvokeKind::Static,
            target: callouts::logical_invoke(),
        }));
        assert!(insns.contains(&Insn::Const(Const::Str(
            "remove(Ljava/lang/Object;)Z".to_string()
        ))));
    }

    #[test]
    fn if_true_rejects_non_boolean_return() {
        let method = list_method("get", "(I)Ljava/lang/Object;");
        let err = substitute(
            "t/List",
            &method,
            &op("get(I)Ljava/lang/Object;", WrapperKind::IfTrue),
            &mut registry(),
        );
        assert!(matches!(err, Err(TransformError::RuleShape { .. })));
    }

    #[test]
    fn each_element_requires_array_param() {
        let method = list_method("addAll", "(Ljava/util/Collection;)Z");
        let err = substitute(
            "t/List",
            &method,
            &op(
                "addAll(Ljava/util/Collection;)Z",
                WrapperKind::EachElement {
                    element_op: "add(Ljava/lang/Object;)Z".to_string(),
                },
            ),
            &mut registry(),
        );
        assert!(matches!(err, Err(TransformError::RuleShape { .. })));
    }

    #[test]
    fn each_element_loops_over_array() {
        let method = list_method("addAll", "([Ljava/lang/Object;)Z");
        let sub = substitute(
            "t/List",
            &method,
            &op(
                "addAll([Ljava/lang/Object;)Z",
                WrapperKind::EachElement {
                    element_op: "add(Ljava/lang/Object;)Z".to_string(),
                },
            ),
            &mut registry(),
        )
        .unwrap();
        let insns = &sub.wrapper.body.as_ref().unwrap().insns;
        assert!(insns.contains(&Insn::ArrayLen));
        assert!(insns.contains(&Insn::Const(Const::Str(
            "add(Ljava/lang/Object;)Z".to_string()
        ))));
        validate_method(&sub.wrapper).unwrap();
    }

    #[test]
    fn helper_gains_flag_parameter() {
        let mut helper = list_method("fastRemove", "(I)V");
        helper.access = flags::ACC_PRIVATE;
        let ext = extend_helper("t/List", &helper, &mut registry()).unwrap();
        assert_eq!(ext.helper.name, "__wc_fastRemove");
        assert_eq!(ext.helper.desc, "(IZ)V");
        assert_eq!(ext.from, MethodRef::new("t/List", "fastRemove", "(I)V"));
        assert_eq!(ext.to, MethodRef::new("t/List", "__wc_fastRemove", "(IZ)V"));
        assert_eq!(ext.prepend.len(), 2);
    }
}
