//! Per-class policy resolution
//!
//! Turns the declarative policy plus one class definition into a
//! [`ClassSpec`]. Ambiguity is never resolved by silent fallback: a peer
//! configured differently elsewhere would diverge in observable
//! coordination behavior, so any unclassified member of an adaptable class
//! aborts the transform of that class.

use crate::config::{ClassPolicy, PolicySet};
use crate::model::{AdaptTier, ClassSpec, LogicalOpSpec};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use weft_classfile::{flags, ClassDef, Insn};

/// Classification failures, all fatal for the affected class.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Adaptable class declares a field no rule covers
    #[error("field {class}.{field} matches no policy rule")]
    UnclassifiedField { class: String, field: String },

    /// Logical class declares a method no rule covers
    #[error("method {class}.{method} matches no policy rule")]
    UnclassifiedMethod { class: String, method: String },

    /// Policy names a method the class does not declare
    #[error("policy for {class} references unknown method {method}")]
    UnknownMethod { class: String, method: String },

    /// Policy names a field the class does not declare
    #[error("policy for {class} references unknown field {field}")]
    UnknownField { class: String, field: String },

    /// A field reference resolves to no known declaring class
    #[error("field {owner}.{field} does not resolve to a known class")]
    UnresolvedField { owner: String, field: String },

    /// Two policy entries claim the same class
    #[error("duplicate policy entry for {0}")]
    DuplicatePolicy(String),
}

/// Resolves class definitions against one policy set.
///
/// The resolver itself is immutable and shareable; all per-class output is
/// freshly allocated per call.
#[derive(Debug)]
pub struct PolicyResolver {
    policy: PolicySet,
    /// Every class the policy covers, used as the adaptation boundary
    covered: FxHashSet<String>,
}

impl PolicyResolver {
    pub fn new(policy: PolicySet) -> Result<Self, PolicyError> {
        let mut covered = FxHashSet::default();
        for class in policy.covered_classes() {
            if !covered.insert(class.to_string()) {
                return Err(PolicyError::DuplicatePolicy(class.to_string()));
            }
        }
        Ok(Self { policy, covered })
    }

    /// Classify one class. Classes without a policy entry are not adaptable.
    pub fn resolve(&self, class: &ClassDef) -> Result<ClassSpec, PolicyError> {
        let policy = match self.policy.policy_for(&class.name) {
            Some(p) => p,
            None => return Ok(ClassSpec::not_adaptable(&class.name)),
        };
        if policy.tier == AdaptTier::NotAdaptable {
            return Ok(ClassSpec::not_adaptable(&class.name));
        }

        self.check_members_exist(class, policy)?;
        self.check_field_references(class)?;

        let mut spec = ClassSpec::not_adaptable(&class.name);
        spec.tier = policy.tier;
        spec.variant = policy.variant;
        spec.superclass = class.superclass.clone();
        spec.roots = policy.roots.iter().cloned().collect();
        spec.transients = policy.transients.iter().cloned().collect();
        spec.portable = self.portable_fields(class, policy);
        spec.unsupported = policy.unsupported.iter().cloned().collect();

        for op in &policy.logical_ops {
            spec.logical_ops.insert(
                op.method.clone(),
                LogicalOpSpec {
                    sig_key: op.method.clone(),
                    kind: op.kind.clone(),
                    check_write: op.check_write,
                },
            );
        }
        let mut locks: FxHashMap<String, Vec<crate::model::LockDef>> = FxHashMap::default();
        for lc in &policy.locks {
            locks.entry(lc.method.clone()).or_default().push(lc.lock.clone());
        }
        spec.locks = locks;
        for fp in &policy.fast_paths {
            spec.fast_paths
                .insert(fp.method.clone(), fp.full_path.clone());
        }
        for mh in &policy.managed_helpers {
            spec.managed_helpers
                .insert(mh.method.clone(), mh.callers.clone());
        }

        spec.boundary = self.covered.clone();
        for extra in &policy.boundary {
            spec.boundary.insert(extra.clone());
        }

        self.check_total(class, policy, &spec)?;
        Ok(spec)
    }

    /// Expand the portable field list, honoring the `"*"` wildcard.
    fn portable_fields(&self, class: &ClassDef, policy: &ClassPolicy) -> FxHashSet<String> {
        if policy.portable.iter().any(|p| p == "*") {
            class
                .fields
                .iter()
                .filter(|f| f.access & flags::ACC_STATIC == 0)
                .filter(|f| !policy.transients.contains(&f.name))
                .map(|f| f.name.clone())
                .collect()
        } else {
            policy.portable.iter().cloned().collect()
        }
    }

    /// Every member the policy names must exist on the class.
    fn check_members_exist(&self, class: &ClassDef, policy: &ClassPolicy) -> Result<(), PolicyError> {
        let method_keys: FxHashSet<String> =
            class.methods.iter().map(|m| m.sig_key()).collect();
        let field_names: FxHashSet<&str> =
            class.fields.iter().map(|f| f.name.as_str()).collect();

        let missing_method = |method: &str| PolicyError::UnknownMethod {
            class: class.name.clone(),
            method: method.to_string(),
        };
        for op in &policy.logical_ops {
            if !method_keys.contains(&op.method) {
                return Err(missing_method(&op.method));
            }
            let helper = match &op.kind {
                crate::model::WrapperKind::MapPut { entry_lookup }
                | crate::model::WrapperKind::MapRemove { entry_lookup } => Some(entry_lookup),
                crate::model::WrapperKind::EachElement { element_op } => Some(element_op),
                _ => None,
            };
            if let Some(helper) = helper {
                if !method_keys.contains(helper) {
                    return Err(missing_method(helper));
                }
            }
        }
        for lc in &policy.locks {
            if !method_keys.contains(&lc.method) {
                return Err(missing_method(&lc.method));
            }
        }
        for fp in &policy.fast_paths {
            if !method_keys.contains(&fp.method) {
                return Err(missing_method(&fp.method));
            }
        }
        for m in policy.unsupported.iter().chain(&policy.untracked) {
            if !method_keys.contains(m) {
                return Err(missing_method(m));
            }
        }
        for mh in &policy.managed_helpers {
            for m in std::iter::once(&mh.method).chain(&mh.callers) {
                if !method_keys.contains(m) {
                    return Err(missing_method(m));
                }
            }
        }

        for field in policy.roots.iter().chain(&policy.transients) {
            if !field_names.contains(field.as_str()) {
                return Err(PolicyError::UnknownField {
                    class: class.name.clone(),
                    field: field.clone(),
                });
            }
        }
        for field in &policy.portable {
            if field != "*" && !field_names.contains(field.as_str()) {
                return Err(PolicyError::UnknownField {
                    class: class.name.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Every self-owned field reference must resolve to a declared field or
    /// be inheritable through a covered ancestor.
    fn check_field_references(&self, class: &ClassDef) -> Result<(), PolicyError> {
        let declared: FxHashSet<&str> = class.fields.iter().map(|f| f.name.as_str()).collect();
        let ancestor_covered = class
            .superclass
            .as_deref()
            .is_some_and(|s| self.covered.contains(s));
        if ancestor_covered {
            return Ok(());
        }
        for method in &class.methods {
            let body = match &method.body {
                Some(b) => b,
                None => continue,
            };
            for insn in &body.insns {
                let fr = match insn {
                    Insn::GetField(f)
                    | Insn::PutField(f)
                    | Insn::GetStatic(f)
                    | Insn::PutStatic(f) => f,
                    _ => continue,
                };
                if fr.owner == class.name && !declared.contains(fr.name.as_str()) {
                    return Err(PolicyError::UnresolvedField {
                        owner: fr.owner.clone(),
                        field: fr.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Classification totality for adaptable classes.
    fn check_total(
        &self,
        class: &ClassDef,
        policy: &ClassPolicy,
        spec: &ClassSpec,
    ) -> Result<(), PolicyError> {
        for field in &class.fields {
            if field.access & flags::ACC_STATIC != 0 && !spec.is_root(&field.name) {
                continue;
            }
            let classified = spec.is_root(&field.name)
                || spec.is_portable_field(&field.name)
                || spec.transients.contains(&field.name);
            if !classified {
                return Err(PolicyError::UnclassifiedField {
                    class: class.name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        if spec.is_logical() {
            let untracked: FxHashSet<&str> =
                policy.untracked.iter().map(String::as_str).collect();
            for method in &class.methods {
                if !Self::needs_method_rule(method) {
                    continue;
                }
                let key = method.sig_key();
                let classified = spec.logical_ops.contains_key(&key)
                    || spec.locks.contains_key(&key)
                    || spec.fast_paths.contains_key(&key)
                    || spec.unsupported.contains(&key)
                    || untracked.contains(key.as_str());
                if !classified {
                    return Err(PolicyError::UnclassifiedMethod {
                        class: class.name.clone(),
                        method: key,
                    });
                }
            }
        }
        Ok(())
    }

    /// Only public instance methods of a logical class need explicit rules.
    fn needs_method_rule(method: &weft_classfile::MethodDef) -> bool {
        if method.name.starts_with('<') {
            return false;
        }
        if method.access & (flags::ACC_STATIC | flags::ACC_ABSTRACT | flags::ACC_SYNTHETIC) != 0 {
            return false;
        }
        method.access & flags::ACC_PUBLIC != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogicalOpConfig;
    use crate::model::WrapperKind;
    use weft_classfile::{FieldDef, MethodBody, MethodDef};

    fn list_class() -> ClassDef {
        let mut c = ClassDef::new("java/util/ArrayList");
        c.fields.push(FieldDef {
            access: flags::ACC_PRIVATE,
            name: "size".to_string(),
            desc: "I".to_string(),
            signature: None,
        });
        c.methods.push(MethodDef {
            access: flags::ACC_PUBLIC,
            name: "add".to_string(),
            desc: "(Ljava/lang/Object;)Z".to_string(),
            signature: None,
            exceptions: Vec::new(),
            body: Some(MethodBody {
                max_locals: 2,
                ..Default::default()
            }),
        });
        c
    }

    fn logical_policy() -> ClassPolicy {
        ClassPolicy {
            class: "java/util/ArrayList".to_string(),
            tier: AdaptTier::Logical,
            variant: Default::default(),
            roots: Vec::new(),
            portable: Vec::new(),
            transients: vec!["size".to_string()],
            logical_ops: vec![LogicalOpConfig {
                method: "add(Ljava/lang/Object;)Z".to_string(),
                kind: WrapperKind::IfTrue,
                check_write: true,
            }],
            locks: Vec::new(),
            fast_paths: Vec::new(),
            managed_helpers: Vec::new(),
            unsupported: Vec::new(),
            untracked: Vec::new(),
            boundary: Vec::new(),
        }
    }

    fn resolver_with(policy: ClassPolicy) -> PolicyResolver {
        PolicyResolver::new(PolicySet {
            classes: vec![policy],
        })
        .unwrap()
    }

    #[test]
    fn uncovered_class_is_not_adaptable() {
        let resolver = resolver_with(logical_policy());
        let other = ClassDef::new("x/Other");
        let spec = resolver.resolve(&other).unwrap();
        assert!(!spec.is_adaptable());
    }

    #[test]
    fn logical_class_resolves() {
        let resolver = resolver_with(logical_policy());
        let spec = resolver.resolve(&list_class()).unwrap();
        assert!(spec.is_logical());
        assert!(spec.logical_op("add(Ljava/lang/Object;)Z").is_some());
        assert!(spec.in_boundary("java/util/ArrayList"));
    }

    #[test]
    fn unclassified_method_is_fatal() {
        let resolver = resolver_with(logical_policy());
        let mut class = list_class();
        class.methods.push(MethodDef {
            access: flags::ACC_PUBLIC,
            name: "clear".to_string(),
            desc: "()V".to_string(),
            signature: None,
            exceptions: Vec::new(),
            body: Some(MethodBody {
                max_locals: 1,
                ..Default::default()
            }),
        });
        assert!(matches!(
            resolver.resolve(&class),
            Err(PolicyError::UnclassifiedMethod { .. })
        ));
    }

    #[test]
    fn unclassified_field_is_fatal() {
        let mut policy = logical_policy();
        policy.transients.clear();
        let resolver = resolver_with(policy);
        assert!(matches!(
            resolver.resolve(&list_class()),
            Err(PolicyError::UnclassifiedField { .. })
        ));
    }

    #[test]
    fn policy_referencing_missing_method_is_fatal() {
        let mut policy = logical_policy();
        policy.logical_ops[0].method = "nope()V".to_string();
        let resolver = resolver_with(policy);
        assert!(matches!(
            resolver.resolve(&list_class()),
            Err(PolicyError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn dangling_self_field_reference_is_fatal() {
        let resolver = resolver_with(logical_policy());
        let mut class = list_class();
        if let Some(body) = &mut class.methods[0].body {
            body.insns.push(weft_classfile::Insn::GetField(
                weft_classfile::FieldRef::new("java/util/ArrayList", "ghost", "I"),
            ));
        }
        assert!(matches!(
            resolver.resolve(&class),
            Err(PolicyError::UnresolvedField { .. })
        ));
    }

    #[test]
    fn duplicate_policy_rejected() {
        let err = PolicyResolver::new(PolicySet {
            classes: vec![logical_policy(), logical_policy()],
        });
        assert!(matches!(err, Err(PolicyError::DuplicatePolicy(_))));
    }

    #[test]
    fn wildcard_portable_expands_instance_fields() {
        let mut policy = logical_policy();
        policy.tier = AdaptTier::Physical;
        policy.transients.clear();
        policy.portable = vec!["*".to_string()];
        policy.logical_ops.clear();
        let resolver = resolver_with(policy);
        let spec = resolver.resolve(&list_class()).unwrap();
        assert!(spec.is_portable_field("size"));
    }
}
