//! Identity rewriting
//!
//! Replaces every textual occurrence of a source identity with a target
//! identity: the class header, descriptors and signatures, instruction
//! operands, exception tables, and debug metadata naming locals. Nested
//! identities follow their enclosing rename (`a/B$Inner` tracks `a/B`).
//!
//! A [`ChangeSet`] is allocated per pass and consulted by every definition
//! processed in that pass, so cross-references between sibling definitions
//! resolve to the new identity rather than the stale one. It is never
//! shared across unrelated passes.

use rustc_hash::FxHashMap;
use weft_classfile::{ClassDef, Insn, MethodBody, MethodDef, MethodSig, TypeTag};

/// Record of one renamed identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeContext {
    pub original: String,
    pub renamed: String,
}

/// Accumulated renames for one pass.
#[derive(Debug, Default)]
pub struct ChangeSet {
    renames: FxHashMap<String, String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rename. Nested identities of `original` follow implicitly.
    pub fn rename(&mut self, original: impl Into<String>, renamed: impl Into<String>) {
        self.renames.insert(original.into(), renamed.into());
    }

    pub fn contexts(&self) -> impl Iterator<Item = ChangeContext> + '_ {
        self.renames.iter().map(|(o, n)| ChangeContext {
            original: o.clone(),
            renamed: n.clone(),
        })
    }

    /// Map an internal class name, honoring enclosing-identity renames.
    pub fn map_name(&self, name: &str) -> Option<String> {
        if let Some(new) = self.renames.get(name) {
            return Some(new.clone());
        }
        for (old, new) in &self.renames {
            if let Some(rest) = name.strip_prefix(old.as_str()) {
                if rest.starts_with('$') {
                    return Some(format!("{}{}", new, rest));
                }
            }
        }
        None
    }

    fn apply_name(&self, name: &mut String) {
        if let Some(new) = self.map_name(name) {
            *name = new;
        }
    }

    fn map_tag(&self, tag: &TypeTag) -> TypeTag {
        match tag {
            TypeTag::Reference(name) => match self.map_name(name) {
                Some(new) => TypeTag::Reference(new),
                None => tag.clone(),
            },
            TypeTag::Array(elem) => TypeTag::Array(Box::new(self.map_tag(elem))),
            other => other.clone(),
        }
    }

    fn apply_field_desc(&self, desc: &mut String) {
        if let Ok(tag) = TypeTag::parse(desc) {
            *desc = self.map_tag(&tag).descriptor();
        }
    }

    fn apply_method_desc(&self, desc: &mut String) {
        if let Ok(sig) = MethodSig::parse(desc) {
            let mapped = MethodSig {
                params: sig.params.iter().map(|t| self.map_tag(t)).collect(),
                ret: sig.ret.as_ref().map(|t| self.map_tag(t)),
            };
            *desc = mapped.descriptor();
        }
    }

    fn apply_signature(&self, signature: &mut Option<String>) {
        let Some(sig) = signature else { return };
        for (old, new) in &self.renames {
            *sig = sig
                .replace(&format!("L{};", old), &format!("L{};", new))
                .replace(&format!("L{}<", old), &format!("L{}<", new))
                .replace(&format!("L{}$", old), &format!("L{}$", new));
        }
    }

    fn apply_body(&self, body: &mut MethodBody) {
        for insn in &mut body.insns {
            match insn {
                Insn::GetField(fr) | Insn::PutField(fr) | Insn::GetStatic(fr)
                | Insn::PutStatic(fr) => {
                    self.apply_name(&mut fr.owner);
                    self.apply_field_desc(&mut fr.desc);
                }
                Insn::Invoke { target, .. } => {
                    self.apply_name(&mut target.owner);
                    self.apply_method_desc(&mut target.desc);
                }
                Insn::New(name) | Insn::InstanceOf(name) | Insn::CheckCast(name) => {
                    self.apply_name(name);
                }
                Insn::NewArray(tag) | Insn::ArrayLoad(tag) | Insn::ArrayStore(tag) => {
                    *tag = self.map_tag(tag);
                }
                Insn::Return(Some(tag)) => *tag = self.map_tag(tag),
                _ => {}
            }
        }
        for handler in &mut body.handlers {
            if let Some(ty) = &mut handler.catch_type {
                self.apply_name(ty);
            }
        }
        for local in &mut body.locals {
            self.apply_field_desc(&mut local.desc);
        }
    }

    /// Rewrite every reference inside one method definition.
    pub fn apply_to_method(&self, method: &mut MethodDef) {
        self.apply_method_desc(&mut method.desc);
        self.apply_signature(&mut method.signature);
        for exc in &mut method.exceptions {
            self.apply_name(exc);
        }
        if let Some(body) = &mut method.body {
            self.apply_body(body);
        }
    }

    /// Rewrite every reference inside one class definition.
    pub fn apply(&self, class: &mut ClassDef) {
        self.apply_name(&mut class.name);
        if let Some(superclass) = &mut class.superclass {
            self.apply_name(superclass);
        }
        for iface in &mut class.interfaces {
            self.apply_name(iface);
        }
        if let Some(inner_of) = &mut class.inner_of {
            self.apply_name(inner_of);
        }
        for field in &mut class.fields {
            self.apply_field_desc(&mut field.desc);
            self.apply_signature(&mut field.signature);
        }
        for method in &mut class.methods {
            self.apply_to_method(method);
        }
    }
}

/// Whether any reference to `identity` (or a nested identity of it) remains
/// in the definition. Used to verify identity elimination after a pass.
pub fn references_identity(class: &ClassDef, identity: &str) -> bool {
    let hit = |name: &str| name == identity || name.starts_with(&format!("{}$", identity));
    let desc_hit = |desc: &str| {
        desc.contains(&format!("L{};", identity)) || desc.contains(&format!("L{}$", identity))
    };

    if hit(&class.name)
        || class.superclass.as_deref().is_some_and(hit)
        || class.interfaces.iter().any(|i| hit(i))
        || class.inner_of.as_deref().is_some_and(hit)
    {
        return true;
    }
    for field in &class.fields {
        if desc_hit(&field.desc) {
            return true;
        }
    }
    for method in &class.methods {
        if desc_hit(&method.desc) || method.exceptions.iter().any(|e| hit(e)) {
            return true;
        }
        let Some(body) = &method.body else { continue };
        for insn in &body.insns {
            let found = match insn {
                Insn::GetField(fr) | Insn::PutField(fr) | Insn::GetStatic(fr)
                | Insn::PutStatic(fr) => hit(&fr.owner) || desc_hit(&fr.desc),
                Insn::Invoke { target, .. } => hit(&target.owner) || desc_hit(&target.desc),
                Insn::New(name) | Insn::InstanceOf(name) | Insn::CheckCast(name) => hit(name),
                _ => false,
            };
            if found {
                return true;
            }
        }
        if body
            .handlers
            .iter()
            .any(|h| h.catch_type.as_deref().is_some_and(hit))
        {
            return true;
        }
        if body.locals.iter().any(|l| desc_hit(&l.desc)) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_classfile::{FieldDef, FieldRef, InvokeKind, MethodDef, MethodRef};

    fn sample_class() -> ClassDef {
        let mut c = ClassDef::new("old/Thing");
        c.fields.push(FieldDef {
            access: 0,
            name: "peer".to_string(),
            desc: "Lold/Thing;".to_string(),
            signature: None,
        });
        c.methods.push(MethodDef {
            access: weft_classfile::flags::ACC_PUBLIC,
            name: "dup".to_string(),
            desc: "(Lold/Thing;)Lold/Thing;".to_string(),
            signature: None,
            exceptions: Vec::new(),
            body: Some(MethodBody {
                insns: vec![
                    Insn::New("old/Thing$Node".to_string()),
                    Insn::Pop,
                    Insn::LoadLocal(0),
                    Insn::GetField(FieldRef::new("old/Thing", "peer", "Lold/Thing;")),
                    Insn::Invoke {
                        kind: InvokeKind::Virtual,
                        target: MethodRef::new("old/Thing", "dup", "(Lold/Thing;)Lold/Thing;"),
                    },
                    Insn::Return(Some(TypeTag::Reference("old/Thing".to_string()))),
                ],
                max_locals: 2,
                ..Default::default()
            }),
        });
        c
    }

    #[test]
    fn rename_eliminates_every_reference() {
        let mut class = sample_class();
        let mut changes = ChangeSet::new();
        changes.rename("old/Thing", "new/Thing");
        changes.apply(&mut class);
        assert_eq!(class.name, "new/Thing");
        assert!(!references_identity(&class, "old/Thing"));
        assert_eq!(class.fields[0].desc, "Lnew/Thing;");
        assert_eq!(class.methods[0].desc, "(Lnew/Thing;)Lnew/Thing;");
    }

    #[test]
    fn nested_identity_follows_enclosing() {
        let mut changes = ChangeSet::new();
        changes.rename("old/Thing", "new/Thing");
        assert_eq!(
            changes.map_name("old/Thing$Node"),
            Some("new/Thing$Node".to_string())
        );
        assert_eq!(changes.map_name("old/Thingy"), None);
    }

    #[test]
    fn sibling_definitions_resolve_new_identity() {
        let mut changes = ChangeSet::new();
        changes.rename("old/Thing", "new/Thing");
        let mut sibling = ClassDef::new("x/User");
        sibling.methods.push(MethodDef {
            access: weft_classfile::flags::ACC_PUBLIC,
            name: "use".to_string(),
            desc: "(Lold/Thing;)V".to_string(),
            signature: None,
            exceptions: Vec::new(),
            body: Some(MethodBody {
                insns: vec![Insn::Return(None)],
                max_locals: 2,
                ..Default::default()
            }),
        });
        changes.apply(&mut sibling);
        assert_eq!(sibling.name, "x/User");
        assert_eq!(sibling.methods[0].desc, "(Lnew/Thing;)V");
        assert!(!references_identity(&sibling, "old/Thing"));
    }

    #[test]
    fn generic_signatures_track_renames() {
        let mut changes = ChangeSet::new();
        changes.rename("old/Thing", "new/Thing");
        let mut sig = Some("Ljava/util/List<Lold/Thing;>;".to_string());
        changes.apply_signature(&mut sig);
        assert_eq!(sig.as_deref(), Some("Ljava/util/List<Lnew/Thing;>;"));
    }

    #[test]
    fn change_contexts_record_pairs() {
        let mut changes = ChangeSet::new();
        changes.rename("a/B", "c/D");
        let ctx: Vec<_> = changes.contexts().collect();
        assert_eq!(
            ctx,
            vec![ChangeContext {
                original: "a/B".to_string(),
                renamed: "c/D".to_string(),
            }]
        );
    }
}
