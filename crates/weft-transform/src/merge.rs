//! Shadow type merging
//!
//! Splices a donor definition's fields and methods into a target. Target
//! members colliding with a donor member are renamed under the shadow
//! prefix first, with every internal self-reference in the target updated.
//! The donor's single constructor becomes a private initializer invoked
//! after the target's own constructor logic completes, on every
//! constructor path.

use crate::error::TransformError;
use crate::rename::ChangeSet;
use weft_classfile::{flags, ClassDef, Insn, InvokeKind, MethodDef, MethodRef};
use weft_policy::{names, NamingRegistry};

/// Splice `donor` into `target`.
pub fn merge_shadow(
    target: &mut ClassDef,
    donor: &ClassDef,
    registry: &mut NamingRegistry,
) -> Result<(), TransformError> {
    let ctors: Vec<&MethodDef> = donor.constructors().collect();
    if ctors.len() != 1 {
        return Err(TransformError::ShadowConstructorCount {
            class: donor.name.clone(),
            count: ctors.len(),
        });
    }
    let initializer = convert_constructor(donor, ctors[0])?;

    // Re-home every donor self-reference onto the target identity.
    let mut donor = donor.clone();
    let mut changes = ChangeSet::new();
    changes.rename(donor.name.clone(), target.name.clone());
    changes.apply(&mut donor);

    for field in &donor.fields {
        if target.field(&field.name).is_some() {
            displace_field(target, &field.name, registry);
        }
        target.fields.push(field.clone());
    }
    for method in donor.methods.iter().filter(|m| m.name != "<init>") {
        if target.method(&method.name, &method.desc).is_some() {
            displace_method(target, &method.name, &method.desc, registry);
        }
        target.methods.push(method.clone());
    }

    let mut initializer = initializer;
    changes.apply_to_method(&mut initializer);
    let init_ref = MethodRef::new(target.name.clone(), names::SHADOW_INIT, "()V");
    for method in target.methods.iter_mut().filter(|m| m.name == "<init>") {
        if let Some(body) = &mut method.body {
            let mut insns = Vec::with_capacity(body.insns.len() + 2);
            for insn in body.insns.drain(..) {
                if matches!(insn, Insn::Return(None)) {
                    insns.push(Insn::LoadLocal(0));
                    insns.push(Insn::Invoke {
                        kind: InvokeKind::Special,
                        target: init_ref.clone(),
                    });
                }
                insns.push(insn);
            }
            body.insns = insns;
        }
    }
    target.methods.push(initializer);
    Ok(())
}

/// Convert the donor constructor into the private shadow initializer,
/// stripping the superclass constructor call from its preamble.
fn convert_constructor(donor: &ClassDef, ctor: &MethodDef) -> Result<MethodDef, TransformError> {
    let shape_err = || TransformError::ShadowConstructorShape {
        class: donor.name.clone(),
    };
    if ctor.desc != "()V" {
        return Err(shape_err());
    }
    let body = ctor.body.as_ref().ok_or_else(shape_err)?;

    let super_call = body.insns.iter().position(
        |i| matches!(i, Insn::Invoke { kind: InvokeKind::Special, target } if target.name == "<init>"),
    );
    let at = super_call.ok_or_else(shape_err)?;
    if at == 0 || body.insns[at - 1] != Insn::LoadLocal(0) {
        return Err(shape_err());
    }
    let mut new_body = body.clone();
    new_body.insns.drain(at - 1..=at);

    Ok(MethodDef {
        access: flags::ACC_PRIVATE | flags::ACC_SYNTHETIC,
        name: names::SHADOW_INIT.to_string(),
        desc: "()V".to_string(),
        signature: None,
        exceptions: ctor.exceptions.clone(),
        body: Some(new_body),
    })
}

/// Rename a colliding target field and update internal references.
fn displace_field(target: &mut ClassDef, name: &str, registry: &mut NamingRegistry) {
    let new_name = registry.shadowed(name);
    if let Some(field) = target.fields.iter_mut().find(|f| f.name == name) {
        field.name = new_name.clone();
    }
    for method in &mut target.methods {
        let Some(body) = &mut method.body else { continue };
        for insn in &mut body.insns {
            match insn {
                Insn::GetField(fr) | Insn::PutField(fr) | Insn::GetStatic(fr)
                | Insn::PutStatic(fr)
                    if fr.owner == target.name && fr.name == name =>
                {
                    fr.name = new_name.clone();
                }
                _ => {}
            }
        }
    }
}

/// Rename a colliding target method and update internal call sites.
fn displace_method(target: &mut ClassDef, name: &str, desc: &str, registry: &mut NamingRegistry) {
    let new_name = registry.shadowed(name);
    if let Some(method) = target.method_mut(name, desc) {
        method.name = new_name.clone();
    }
    for method in &mut target.methods {
        let Some(body) = &mut method.body else { continue };
        for insn in &mut body.insns {
            if let Insn::Invoke { target: mr, .. } = insn {
                if mr.owner == target.name && mr.name == name && mr.desc == desc {
                    mr.name = new_name.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_classfile::{Const, FieldDef, FieldRef, JumpCond, Label, MethodBody};

    fn ctor(body_insns: Vec<Insn>) -> MethodDef {
        MethodDef {
            access: flags::ACC_PUBLIC,
            name: "<init>".to_string(),
            desc: "()V".to_string(),
            signature: None,
            exceptions: Vec::new(),
            body: Some(MethodBody {
                insns: body_insns,
                max_locals: 1,
                ..Default::default()
            }),
        }
    }

    fn plain_ctor() -> MethodDef {
        ctor(vec![
            Insn::LoadLocal(0),
            Insn::Invoke {
                kind: InvokeKind::Special,
                target: MethodRef::new("java/lang/Object", "<init>", "()V"),
            },
            Insn::Return(None),
        ])
    }

    fn donor() -> ClassDef {
        let mut d = ClassDef::new("shadow/Extra");
        d.fields.push(FieldDef {
            access: flags::ACC_PRIVATE,
            name: "state".to_string(),
            desc: "I".to_string(),
            signature: None,
        });
        d.methods.push(plain_ctor());
        d.methods.push(MethodDef {
            access: flags::ACC_PUBLIC,
            name: "touch".to_string(),
            desc: "()V".to_string(),
            signature: None,
            exceptions: Vec::new(),
            body: Some(MethodBody {
                insns: vec![
                    Insn::LoadLocal(0),
                    Insn::Const(Const::Int(1)),
                    Insn::PutField(FieldRef::new("shadow/Extra", "state", "I")),
                    Insn::Return(None),
                ],
                max_locals: 1,
                ..Default::default()
            }),
        });
        d
    }

    #[test]
    fn donor_members_splice_with_target_identity() {
        let mut target = ClassDef::new("t/Box");
        target.methods.push(plain_ctor());
        let mut registry = NamingRegistry::for_class(&target);
        merge_shadow(&mut target, &donor(), &mut registry).unwrap();

        assert!(target.field("state").is_some());
        let touch = target.method("touch", "()V").unwrap();
        let body = touch.body.as_ref().unwrap();
        // Spliced code refers to the target, not the donor.
        assert!(body
            .insns
            .contains(&Insn::PutField(FieldRef::new("t/Box", "state", "I"))));
        assert!(!crate::rename::references_identity(&target, "shadow/Extra"));
    }

    #[test]
    fn colliding_target_member_is_displaced() {
        let mut target = ClassDef::new("t/Box");
        target.methods.push(plain_ctor());
        target.fields.push(FieldDef {
            access: flags::ACC_PRIVATE,
            name: "state".to_string(),
            desc: "J".to_string(),
            signature: None,
        });
        let mut registry = NamingRegistry::for_class(&target);
        merge_shadow(&mut target, &donor(), &mut registry).unwrap();

        assert!(target.field("__wc_shadow_state").is_some());
        // The donor's field wins the original name.
        assert_eq!(target.field("state").unwrap().desc, "I");
    }

    #[test]
    fn initializer_runs_on_every_constructor_path() {
        let mut target = ClassDef::new("t/Box");
        target.methods.push(plain_ctor());
        // A second constructor with two return paths.
        target.methods.push(MethodDef {
            access: flags::ACC_PUBLIC,
            name: "<init>".to_string(),
            desc: "(I)V".to_string(),
            signature: None,
            exceptions: Vec::new(),
            body: Some(MethodBody {
                insns: vec![
                    Insn::LoadLocal(0),
                    Insn::Invoke {
                        kind: InvokeKind::Special,
                        target: MethodRef::new("java/lang/Object", "<init>", "()V"),
                    },
                    Insn::LoadLocal(1),
                    Insn::Jump {
                        cond: JumpCond::IfZero,
                        target: Label(0),
                    },
                    Insn::Return(None),
                    Insn::Label(Label(0)),
                    Insn::Return(None),
                ],
                max_locals: 2,
                ..Default::default()
            }),
        });
        let mut registry = NamingRegistry::for_class(&target);
        merge_shadow(&mut target, &donor(), &mut registry).unwrap();

        let init_ref = MethodRef::new("t/Box", "__wc_init_shadow", "()V");
        for c in target.constructors() {
            let insns = &c.body.as_ref().unwrap().insns;
            let calls = insns
                .iter()
                .filter(|i| matches!(i, Insn::Invoke { target, .. } if *target == init_ref))
                .count();
            let returns = insns
                .iter()
                .filter(|i| matches!(i, Insn::Return(None)))
                .count();
            assert_eq!(calls, returns);
        }
        assert!(target.method("__wc_init_shadow", "()V").is_some());
    }

    #[test]
    fn multiple_donor_constructors_rejected() {
        let mut d = donor();
        d.methods.push(ctor(vec![Insn::Return(None)]));
        let mut target = ClassDef::new("t/Box");
        let mut registry = NamingRegistry::for_class(&target);
        assert!(matches!(
            merge_shadow(&mut target, &d, &mut registry),
            Err(TransformError::ShadowConstructorCount { count: 2, .. })
        ));
    }

    #[test]
    fn constructor_without_super_preamble_rejected() {
        let mut d = donor();
        d.methods.retain(|m| m.name != "<init>");
        d.methods.push(ctor(vec![Insn::Return(None)]));
        let mut target = ClassDef::new("t/Box");
        let mut registry = NamingRegistry::for_class(&target);
        assert!(matches!(
            merge_shadow(&mut target, &d, &mut registry),
            Err(TransformError::ShadowConstructorShape { .. })
        ));
    }
}
