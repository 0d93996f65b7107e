//! Class adaptation driver
//!
//! Assembles the individual rewrite rules into the full per-class pass.
//! The order is fixed: managed helpers mangle and their callers retarget
//! first, then per-method rewriting (field interception and autolocks for
//! physical classes, logical substitution for logical classes), then
//! method-level lock wrapping, fast-path redirects and unsupported-body
//! replacement, then synthetic member injection, and finally handler
//! ordering and structural validation over the whole result.
//!
//! Synthetic members never feed back into rewriting: injection happens
//! after every original body has been processed, and the interceptor skips
//! reserved names outright.

use crate::callouts;
use crate::chain::{drive, BodyCollector, Retarget};
use crate::error::TransformError;
use crate::fields::FieldInterceptor;
use crate::handlers::order_handlers;
use crate::locks::{redirect_fast_path, unsupported_body, wrap_auto, wrap_named, AutolockVisitor};
use crate::logical::{extend_helper, substitute};
use tracing::debug;
use weft_classfile::{
    emit, flags, validate_class, ClassDef, Const, FieldDef, FieldRef, Insn, InvokeKind, JumpCond,
    Label, LabelAlloc, MethodBody, MethodDef, MethodRef, MethodSig, TypeTag,
};
use weft_policy::{
    getter_name, names, naming, setter_name, split_sig_key, AdaptTier, ClassSpec, NamingRegistry,
};

/// Run the full adaptation pass over one class, in place.
///
/// Returns `false` when the spec classifies the class as not adaptable and
/// nothing was touched.
pub fn transform_class(class: &mut ClassDef, spec: &ClassSpec) -> Result<bool, TransformError> {
    if !spec.is_adaptable() {
        return Ok(false);
    }
    debug!(class = %class.name, tier = ?spec.tier, "adapting class");
    let mut registry = NamingRegistry::for_class(class);

    rewrite_helper_calls(class, spec, &mut registry)?;

    match spec.tier {
        AdaptTier::Physical => rewrite_physical(class, spec)?,
        AdaptTier::Logical => rewrite_logical(class, spec, &mut registry)?,
        AdaptTier::NotAdaptable => unreachable!(),
    }

    apply_method_rules(class, spec)?;
    inject_managed_members(class, spec);

    for method in &mut class.methods {
        if let Some(body) = &mut method.body {
            order_handlers(&class.name, &method.name, body)?;
        }
    }
    validate_class(class)?;
    Ok(true)
}

fn missing(class: &str, method: &str) -> TransformError {
    TransformError::MissingMethod {
        class: class.to_string(),
        method: method.to_string(),
    }
}

/// Mangle managed helpers and retarget every configured caller onto the
/// extended signature, threading the caller's managed state through.
fn rewrite_helper_calls(
    class: &mut ClassDef,
    spec: &ClassSpec,
    registry: &mut NamingRegistry,
) -> Result<(), TransformError> {
    let mut helper_keys: Vec<&String> = spec.managed_helpers.keys().collect();
    helper_keys.sort();

    for key in helper_keys {
        let (name, desc) = split_sig_key(key).ok_or_else(|| missing(&spec.name, key))?;
        let helper = class
            .method(name, desc)
            .ok_or_else(|| missing(&spec.name, key))?
            .clone();
        let ext = extend_helper(&spec.name, &helper, registry)?;

        for caller_key in &spec.managed_helpers[key] {
            let (cname, cdesc) =
                split_sig_key(caller_key).ok_or_else(|| missing(&spec.name, caller_key))?;
            let caller = class
                .method_mut(cname, cdesc)
                .ok_or_else(|| missing(&spec.name, caller_key))?;
            let body = caller
                .body
                .as_ref()
                .ok_or_else(|| TransformError::AbstractTarget {
                    class: spec.name.clone(),
                    method: caller_key.clone(),
                })?;
            let mut sink = Retarget::new(
                spec.name.clone(),
                caller_key.clone(),
                ext.from.clone(),
                ext.to.clone(),
                ext.prepend.clone(),
                BodyCollector::new(),
            );
            let ctx = drive(body, &mut sink)?;
            caller.body = Some(sink.into_inner().into_body(&ctx));
        }
        class.methods.push(ext.helper);
        class.methods.retain(|m| !(m.name == name && m.desc == desc));
    }
    Ok(())
}

/// Field interception, with autolock shadowing where configured.
fn rewrite_physical(class: &mut ClassDef, spec: &ClassSpec) -> Result<(), TransformError> {
    for method in &mut class.methods {
        if naming::is_synthetic_name(&method.name) {
            continue;
        }
        let sig_key = method.sig_key();
        let Some(body) = &method.body else { continue };

        let new_body = match spec.auto_lock(&sig_key) {
            Some(lock) => {
                let mut chain = FieldInterceptor::new(
                    spec,
                    AutolockVisitor::new(lock.level.as_i32(), BodyCollector::new()),
                );
                let ctx = drive(body, &mut chain)?;
                let mut shadowed = chain.into_inner().into_inner().into_body(&ctx);
                wrap_auto(&mut shadowed, &class.name, &sig_key, lock.level.as_i32());
                shadowed
            }
            None => {
                let mut chain = FieldInterceptor::new(spec, BodyCollector::new());
                let ctx = drive(body, &mut chain)?;
                chain.into_inner().into_body(&ctx)
            }
        };
        method.body = Some(new_body);
    }
    Ok(())
}

/// Replace each configured logical operation with its alias/wrapper pair.
fn rewrite_logical(
    class: &mut ClassDef,
    spec: &ClassSpec,
    registry: &mut NamingRegistry,
) -> Result<(), TransformError> {
    let mut keys: Vec<&String> = spec.logical_ops.keys().collect();
    keys.sort();

    for key in keys {
        let op = &spec.logical_ops[key];
        let (name, desc) = split_sig_key(key).ok_or_else(|| missing(&spec.name, key))?;
        let position = class
            .methods
            .iter()
            .position(|m| m.name == name && m.desc == desc)
            .ok_or_else(|| missing(&spec.name, key))?;

        let sub = substitute(&spec.name, &class.methods[position], op, registry)?;
        debug!(class = %spec.name, op = %key, alias = %sub.alias.name, "substituted logical operation");

        let mut wrapper = sub.wrapper;
        if let Some(body) = &mut wrapper.body {
            wrap_named(body, &spec.named_locks(key));
        }
        class.methods[position] = wrapper;
        class.methods.push(sub.alias);
    }
    Ok(())
}

/// Lock wrapping, fast-path redirects and unsupported replacements, applied
/// to whichever original methods remain under their own name.
fn apply_method_rules(class: &mut ClassDef, spec: &ClassSpec) -> Result<(), TransformError> {
    let class_name = class.name.clone();
    for method in &mut class.methods {
        if naming::is_synthetic_name(&method.name) {
            continue;
        }
        let sig_key = method.sig_key();

        if spec.unsupported.contains(&sig_key) {
            let sig = MethodSig::parse(&method.desc)?;
            method.body = Some(unsupported_body(1 + sig.param_slots()));
            continue;
        }
        if let Some(full_path) = spec.fast_paths.get(&sig_key) {
            method.body = Some(redirect_fast_path(&class_name, method, full_path)?);
        }
        // Logical wrappers carry their locks already; everything else gets
        // wrapped here.
        if !spec.logical_ops.contains_key(&sig_key) {
            if let Some(body) = &mut method.body {
                wrap_named(body, &spec.named_locks(&sig_key));
            }
        }
    }
    Ok(())
}

/// Fields the replicated-state walkers cover: the class's own roots and
/// portable instance fields, in declaration order.
fn walkable_fields(class: &ClassDef, spec: &ClassSpec) -> Vec<FieldDef> {
    class
        .fields
        .iter()
        .filter(|f| f.access & flags::ACC_STATIC == 0)
        .filter(|f| spec.is_root(&f.name) || spec.is_portable_field(&f.name))
        .cloned()
        .collect()
}

fn synthetic_method(name: &str, desc: &str, body: MethodBody) -> MethodDef {
    MethodDef {
        access: flags::ACC_PUBLIC | flags::ACC_SYNTHETIC,
        name: name.to_string(),
        desc: desc.to_string(),
        signature: None,
        exceptions: Vec::new(),
        body: Some(body),
    }
}

fn dotted(class: &str) -> String {
    class.replace('/', ".")
}

/// Inject the managed state trio, field accessors and the replicated-state
/// walkers. Skipped members that already exist are a policy conflict caught
/// earlier by resolution; here the presence check only guards re-entry.
fn inject_managed_members(class: &mut ClassDef, spec: &ClassSpec) {
    if class.field(names::MANAGED_FIELD).is_some() {
        return;
    }
    class.fields.push(FieldDef {
        access: flags::ACC_PRIVATE | flags::ACC_TRANSIENT | flags::ACC_VOLATILE,
        name: names::MANAGED_FIELD.to_string(),
        desc: names::MANAGED_FIELD_DESC.to_string(),
        signature: None,
    });
    let handle = FieldRef::new(
        class.name.clone(),
        names::MANAGED_FIELD,
        names::MANAGED_FIELD_DESC,
    );

    class.methods.push(synthetic_method(
        names::MANAGED_METHOD,
        &format!("(){}", names::MANAGED_FIELD_DESC),
        MethodBody {
            insns: vec![
                emit::push_this(),
                Insn::GetField(handle.clone()),
                Insn::Return(Some(TypeTag::Reference("weft/Handle".to_string()))),
            ],
            max_locals: 1,
            ..Default::default()
        },
    ));
    class.methods.push(synthetic_method(
        names::MANAGED_METHOD,
        &format!("({})V", names::MANAGED_FIELD_DESC),
        MethodBody {
            insns: vec![
                emit::push_this(),
                Insn::LoadLocal(1),
                Insn::PutField(handle.clone()),
                Insn::Return(None),
            ],
            max_locals: 2,
            ..Default::default()
        },
    ));
    class.methods.push(synthetic_method(
        names::IS_MANAGED_METHOD,
        "()Z",
        MethodBody {
            insns: vec![
                emit::push_this(),
                Insn::GetField(handle),
                Insn::Jump {
                    cond: JumpCond::IfNonNull,
                    target: Label(0),
                },
                Insn::Const(Const::Int(0)),
                Insn::Return(Some(TypeTag::Boolean)),
                Insn::Label(Label(0)),
                Insn::Const(Const::Int(1)),
                Insn::Return(Some(TypeTag::Boolean)),
            ],
            max_locals: 1,
            ..Default::default()
        },
    ));

    for field in &class.fields.clone() {
        if !(spec.is_root(&field.name) || spec.is_portable_field(&field.name)) {
            continue;
        }
        if field.access & flags::ACC_STATIC != 0 {
            inject_static_accessors(class, field);
        } else {
            inject_instance_accessors(class, field);
        }
    }

    let walkable = walkable_fields(class, spec);
    let getter = values_getter(class, &walkable);
    let setter = values_setter(class, &walkable, spec);
    class.methods.push(getter);
    class.methods.push(setter);
}

/// Instance accessor pair for one replicated field.
///
/// The getter resolves an unmaterialized reference before the raw read when
/// the instance is managed; the setter verifies write access and records the
/// change before the raw write.
fn inject_instance_accessors(class: &mut ClassDef, field: &FieldDef) {
    let fr = FieldRef::new(class.name.clone(), field.name.clone(), field.desc.clone());
    let tag = match TypeTag::parse(&field.desc) {
        Ok(tag) => tag,
        Err(_) => return,
    };
    let fqn = format!("{}.{}", dotted(&class.name), field.name);

    let mut get = Vec::new();
    if tag.is_reference() {
        get.push(emit::push_this());
        get.push(Insn::Invoke {
            kind: InvokeKind::Static,
            target: callouts::is_managed(),
        });
        get.push(Insn::Jump {
            cond: JumpCond::IfZero,
            target: Label(0),
        });
        get.push(emit::push_this());
        get.push(Insn::Const(Const::Str(fqn.clone())));
        get.push(Insn::Invoke {
            kind: InvokeKind::Static,
            target: callouts::resolve_reference(),
        });
        get.push(Insn::Label(Label(0)));
    }
    get.push(emit::push_this());
    get.push(Insn::GetField(fr.clone()));
    get.push(Insn::Return(Some(tag.clone())));
    class.methods.push(synthetic_method(
        &getter_name(&field.name),
        &format!("(){}", field.desc),
        MethodBody {
            insns: get,
            max_locals: 1,
            ..Default::default()
        },
    ));

    let set = vec![
        emit::push_this(),
        Insn::Invoke {
            kind: InvokeKind::Static,
            target: callouts::is_managed(),
        },
        Insn::Jump {
            cond: JumpCond::IfZero,
            target: Label(0),
        },
        emit::push_this(),
        Insn::Invoke {
            kind: InvokeKind::Static,
            target: callouts::check_write_access(),
        },
        Insn::Const(Const::Str(dotted(&class.name))),
        Insn::Const(Const::Str(field.name.clone())),
        Insn::LoadLocal(1),
        Insn::Const(Const::Int(-1)),
        Insn::Invoke {
            kind: InvokeKind::Static,
            target: callouts::field_changed(&field.desc),
        },
        Insn::Label(Label(0)),
        emit::push_this(),
        Insn::LoadLocal(1),
        Insn::PutField(fr),
        Insn::Return(None),
    ];
    class.methods.push(synthetic_method(
        &setter_name(&field.name),
        &format!("({})V", field.desc),
        MethodBody {
            insns: set,
            max_locals: 1 + tag.width(),
            ..Default::default()
        },
    ));
}

/// Static accessor pair for a class-level root. Roots are cluster-global,
/// so the setter records every write.
fn inject_static_accessors(class: &mut ClassDef, field: &FieldDef) {
    let fr = FieldRef::new(class.name.clone(), field.name.clone(), field.desc.clone());
    let tag = match TypeTag::parse(&field.desc) {
        Ok(tag) => tag,
        Err(_) => return,
    };

    let mut getter = synthetic_method(
        &getter_name(&field.name),
        &format!("(){}", field.desc),
        MethodBody {
            insns: vec![Insn::GetStatic(fr.clone()), Insn::Return(Some(tag.clone()))],
            max_locals: 0,
            ..Default::default()
        },
    );
    getter.access |= flags::ACC_STATIC;
    class.methods.push(getter);

    let mut setter = synthetic_method(
        &setter_name(&field.name),
        &format!("({})V", field.desc),
        MethodBody {
            insns: vec![
                Insn::Const(Const::Str(dotted(&class.name))),
                Insn::Const(Const::Str(field.name.clone())),
                Insn::LoadLocal(0),
                Insn::Const(Const::Int(-1)),
                Insn::Invoke {
                    kind: InvokeKind::Static,
                    target: callouts::field_changed(&field.desc),
                },
                Insn::LoadLocal(0),
                Insn::PutStatic(fr),
                Insn::Return(None),
            ],
            max_locals: tag.width(),
            ..Default::default()
        },
    );
    setter.access |= flags::ACC_STATIC;
    class.methods.push(setter);
}

/// `__wc_getallfields`: name/value pairs of every walkable field, flattened
/// into one object array.
fn values_getter(class: &ClassDef, fields: &[FieldDef]) -> MethodDef {
    let object = TypeTag::Reference("java/lang/Object".to_string());
    let mut insns = Vec::with_capacity(4 + fields.len() * 8);
    insns.push(Insn::Const(Const::Int((fields.len() * 2) as i64)));
    insns.push(Insn::NewArray(object.clone()));
    for (i, field) in fields.iter().enumerate() {
        insns.push(Insn::Dup);
        insns.push(Insn::Const(Const::Int((i * 2) as i64)));
        insns.push(Insn::Const(Const::Str(field.name.clone())));
        insns.push(Insn::ArrayStore(object.clone()));
        insns.push(Insn::Dup);
        insns.push(Insn::Const(Const::Int((i * 2 + 1) as i64)));
        insns.push(emit::push_this());
        insns.push(Insn::GetField(FieldRef::new(
            class.name.clone(),
            field.name.clone(),
            field.desc.clone(),
        )));
        insns.push(Insn::ArrayStore(object.clone()));
    }
    insns.push(Insn::Return(Some(TypeTag::Array(Box::new(object)))));
    synthetic_method(
        names::VALUES_GETTER,
        "()[Ljava/lang/Object;",
        MethodBody {
            insns,
            max_locals: 1,
            ..Default::default()
        },
    )
}

/// `__wc_setfield`: dispatch on the field name and write the raw value.
/// Names declared by an instrumented superclass are delegated upward; a name
/// unknown to the whole chain falls through silently so version skew between
/// peers cannot fault the receiver.
fn values_setter(class: &ClassDef, fields: &[FieldDef], spec: &ClassSpec) -> MethodDef {
    let mut labels = LabelAlloc::new();
    let mut insns = Vec::with_capacity(4 + fields.len() * 8);
    for field in fields {
        let l_next = labels.fresh();
        insns.push(Insn::LoadLocal(1));
        insns.push(Insn::Const(Const::Str(field.name.clone())));
        insns.push(Insn::Invoke {
            kind: InvokeKind::Virtual,
            target: MethodRef::new("java/lang/String", "equals", "(Ljava/lang/Object;)Z"),
        });
        insns.push(Insn::Jump {
            cond: JumpCond::IfZero,
            target: l_next,
        });
        insns.push(emit::push_this());
        insns.push(Insn::LoadLocal(2));
        insns.push(Insn::PutField(FieldRef::new(
            class.name.clone(),
            field.name.clone(),
            field.desc.clone(),
        )));
        insns.push(Insn::Return(None));
        insns.push(Insn::Label(l_next));
    }
    if let Some(superclass) = class.superclass.as_deref().filter(|s| spec.in_boundary(s)) {
        insns.push(emit::push_this());
        insns.push(Insn::LoadLocal(1));
        insns.push(Insn::LoadLocal(2));
        insns.push(Insn::Invoke {
            kind: InvokeKind::Special,
            target: MethodRef::new(
                superclass,
                names::VALUES_SETTER,
                "(Ljava/lang/String;Ljava/lang/Object;)V",
            ),
        });
    }
    insns.push(Insn::Return(None));
    synthetic_method(
        names::VALUES_SETTER,
        "(Ljava/lang/String;Ljava/lang/Object;)V",
        MethodBody {
            insns,
            max_locals: 3,
            ..Default::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_policy::{LockDef, LockLevel, LogicalOpSpec, WrapperKind};

    fn int_field(name: &str) -> FieldDef {
        FieldDef {
            access: flags::ACC_PRIVATE,
            name: name.to_string(),
            desc: "I".to_string(),
            signature: None,
        }
    }

    fn method(name: &str, desc: &str, insns: Vec<Insn>, max_locals: u16) -> MethodDef {
        MethodDef {
            access: flags::ACC_PUBLIC,
            name: name.to_string(),
            desc: desc.to_string(),
            signature: None,
            exceptions: Vec::new(),
            body: Some(MethodBody {
                insns,
                max_locals,
                ..Default::default()
            }),
        }
    }

    fn physical_class() -> (ClassDef, ClassSpec) {
        let mut class = ClassDef::new("t/Holder");
        class.fields.push(int_field("value"));
        class.methods.push(method(
            "bump",
            "()V",
            vec![
                emit::push_this(),
                emit::push_this(),
                Insn::GetField(FieldRef::new("t/Holder", "value", "I")),
                Insn::Const(Const::Int(1)),
                Insn::Arith(weft_classfile::IntOp::Add),
                Insn::PutField(FieldRef::new("t/Holder", "value", "I")),
                Insn::Return(None),
            ],
            1,
        ));
        let mut spec = ClassSpec::not_adaptable("t/Holder");
        spec.tier = AdaptTier::Physical;
        spec.portable.insert("value".to_string());
        (class, spec)
    }

    #[test]
    fn not_adaptable_class_untouched() {
        let mut class = ClassDef::new("t/Plain");
        let before = class.clone();
        let spec = ClassSpec::not_adaptable("t/Plain");
        assert!(!transform_class(&mut class, &spec).unwrap());
        assert_eq!(class, before);
    }

    #[test]
    fn physical_pass_injects_trio_and_accessors() {
        let (mut class, spec) = physical_class();
        assert!(transform_class(&mut class, &spec).unwrap());

        assert!(class.field(names::MANAGED_FIELD).is_some());
        assert!(class.method(names::IS_MANAGED_METHOD, "()Z").is_some());
        assert!(class.method("__wc_get_value", "()I").is_some());
        assert!(class.method("__wc_set_value", "(I)V").is_some());
        assert!(class
            .method(names::VALUES_SETTER, "(Ljava/lang/String;Ljava/lang/Object;)V")
            .is_some());

        // The original body now goes through the accessor pair.
        let bump = class.method("bump", "()V").unwrap();
        let insns = &bump.body.as_ref().unwrap().insns;
        assert!(insns.contains(&Insn::Invoke {
            kind: InvokeKind::Virtual,
            target: MethodRef::new("t/Holder", "__wc_get_value", "()I"),
        }));
        assert!(insns.contains(&Insn::Invoke {
            kind: InvokeKind::Virtual,
            target: MethodRef::new("t/Holder", "__wc_set_value", "(I)V"),
        }));
    }

    #[test]
    fn autolock_adds_boundary_and_shadows_monitors() {
        let (mut class, mut spec) = physical_class();
        class.methods.push(method(
            "drain",
            "()V",
            vec![
                emit::push_this(),
                Insn::MonitorEnter,
                emit::push_this(),
                Insn::MonitorExit,
                Insn::Return(None),
            ],
            1,
        ));
        spec.locks.insert(
            "drain()V".to_string(),
            vec![LockDef {
                name: String::new(),
                level: LockLevel::Write,
                auto: true,
            }],
        );
        transform_class(&mut class, &spec).unwrap();

        let body = class.method("drain", "()V").unwrap().body.as_ref().unwrap();
        assert!(matches!(
            body.insns.first(),
            Some(Insn::Const(Const::Str(s))) if s == "@t/Holder.drain()V"
        ));
        assert!(body
            .insns
            .iter()
            .any(|i| matches!(i, Insn::Invoke { target, .. } if target.name == "monitorEnter")));
        // Monitor shadowing sits inside the begin/commit boundary.
        assert_eq!(body.handlers.len(), 1);
    }

    #[test]
    fn by_name_setter_chains_to_instrumented_superclass() {
        let (mut class, mut spec) = physical_class();
        class.superclass = Some("t/Base".to_string());
        spec.superclass = Some("t/Base".to_string());
        spec.boundary.insert("t/Base".to_string());
        transform_class(&mut class, &spec).unwrap();

        let setter = class
            .method(names::VALUES_SETTER, "(Ljava/lang/String;Ljava/lang/Object;)V")
            .unwrap();
        assert!(setter.body.as_ref().unwrap().insns.contains(&Insn::Invoke {
            kind: InvokeKind::Special,
            target: MethodRef::new(
                "t/Base",
                names::VALUES_SETTER,
                "(Ljava/lang/String;Ljava/lang/Object;)V",
            ),
        }));
    }

    #[test]
    fn named_lock_applies_to_physical_method() {
        let (mut class, mut spec) = physical_class();
        spec.locks.insert(
            "bump()V".to_string(),
            vec![LockDef {
                name: "counter".to_string(),
                level: LockLevel::Write,
                auto: false,
            }],
        );
        transform_class(&mut class, &spec).unwrap();
        let bump = class.method("bump", "()V").unwrap();
        let body = bump.body.as_ref().unwrap();
        assert!(body
            .insns
            .iter()
            .any(|i| matches!(i, Insn::Const(Const::Str(s)) if s == "^counter")));
        assert_eq!(body.handlers.len(), 1);
    }

    #[test]
    fn logical_pass_substitutes_and_wraps() {
        let mut class = ClassDef::new("t/List");
        class.methods.push(method(
            "remove",
            "(Ljava/lang/Object;)Z",
            vec![Insn::Const(Const::Int(1)), Insn::Return(Some(TypeTag::Boolean))],
            2,
        ));
        let mut spec = ClassSpec::not_adaptable("t/List");
        spec.tier = AdaptTier::Logical;
        spec.logical_ops.insert(
            "remove(Ljava/lang/Object;)Z".to_string(),
            LogicalOpSpec {
                sig_key: "remove(Ljava/lang/Object;)Z".to_string(),
                kind: WrapperKind::IfTrue,
                check_write: true,
            },
        );
        transform_class(&mut class, &spec).unwrap();

        let wrapper = class.method("remove", "(Ljava/lang/Object;)Z").unwrap();
        assert!(wrapper
            .body
            .as_ref()
            .unwrap()
            .insns
            .contains(&Insn::Invoke {
                kind: InvokeKind::Special,
                target: MethodRef::new(
                    "t/List",
                    "__wc_wrapped_remove",
                    "(Ljava/lang/Object;)Z"
                ),
            }));
        assert!(class
            .method("__wc_wrapped_remove", "(Ljava/lang/Object;)Z")
            .is_some());
    }

    #[test]
    fn managed_helper_mangles_and_retargets_callers() {
        let mut class = ClassDef::new("t/List");
        class.methods.push(method(
            "fastRemove",
            "(I)V",
            vec![Insn::Return(None)],
            2,
        ));
        class.methods.push(method(
            "remove",
            "(Ljava/lang/Object;)Z",
            vec![
                emit::push_this(),
                Insn::Const(Const::Int(0)),
                Insn::Invoke {
                    kind: InvokeKind::Special,
                    target: MethodRef::new("t/List", "fastRemove", "(I)V"),
                },
                Insn::Const(Const::Int(1)),
                Insn::Return(Some(TypeTag::Boolean)),
            ],
            2,
        ));
        let mut spec = ClassSpec::not_adaptable("t/List");
        spec.tier = AdaptTier::Logical;
        spec.managed_helpers.insert(
            "fastRemove(I)V".to_string(),
            vec!["remove(Ljava/lang/Object;)Z".to_string()],
        );
        transform_class(&mut class, &spec).unwrap();

        // The bare helper is gone; only the extended form remains.
        assert!(class.method("fastRemove", "(I)V").is_none());
        assert!(class.method("__wc_fastRemove", "(IZ)V").is_some());
        let remove = class.method("remove", "(Ljava/lang/Object;)Z").unwrap();
        let insns = &remove.body.as_ref().unwrap().insns;
        assert!(insns.contains(&Insn::Invoke {
            kind: InvokeKind::Special,
            target: MethodRef::new("t/List", "__wc_fastRemove", "(IZ)V"),
        }));
        assert!(insns.contains(&Insn::Invoke {
            kind: InvokeKind::Static,
            target: callouts::is_managed(),
        }));
    }

    #[test]
    fn unsupported_method_replaced() {
        let (mut class, mut spec) = physical_class();
        spec.unsupported.insert("bump()V".to_string());
        transform_class(&mut class, &spec).unwrap();
        let bump = class.method("bump", "()V").unwrap();
        assert!(matches!(
            bump.body.as_ref().unwrap().insns.last(),
            Some(Insn::Throw)
        ));
    }

    #[test]
    fn fast_path_redirect_applied() {
        let mut class = ClassDef::new("t/Map");
        class.methods.push(method(
            "get",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            vec![
                Insn::Const(Const::Null),
                Insn::Return(Some(TypeTag::Reference("java/lang/Object".to_string()))),
            ],
            2,
        ));
        class.methods.push(method(
            "lockedGet",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            vec![
                Insn::Const(Const::Null),
                Insn::Return(Some(TypeTag::Reference("java/lang/Object".to_string()))),
            ],
            2,
        ));
        let mut spec = ClassSpec::not_adaptable("t/Map");
        spec.tier = AdaptTier::Logical;
        spec.fast_paths.insert(
            "get(Ljava/lang/Object;)Ljava/lang/Object;".to_string(),
            "lockedGet".to_string(),
        );
        transform_class(&mut class, &spec).unwrap();
        let get = class
            .method("get", "(Ljava/lang/Object;)Ljava/lang/Object;")
            .unwrap();
        assert!(get.body.as_ref().unwrap().insns.contains(&Insn::Invoke {
            kind: InvokeKind::Virtual,
            target: MethodRef::new("t/Map", "lockedGet", "(Ljava/lang/Object;)Ljava/lang/Object;"),
        }));
    }

    #[test]
    fn transformed_class_validates() {
        let (mut class, mut spec) = physical_class();
        spec.roots.insert("shared".to_string());
        class.fields.push(FieldDef {
            access: flags::ACC_PRIVATE | flags::ACC_STATIC,
            name: "shared".to_string(),
            desc: "I".to_string(),
            signature: None,
        });
        transform_class(&mut class, &spec).unwrap();
        validate_class(&class).unwrap();
    }
}
