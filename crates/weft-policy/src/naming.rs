//! Synthetic member naming
//!
//! Every member the pipeline injects is drawn from a reserved prefix
//! namespace so originals and synthetics can never collide, no matter how
//! many rewrite rules touch one class. The registry is allocated per
//! transform invocation and never shared across passes.

use rustc_hash::FxHashSet;
use weft_classfile::ClassDef;

/// Reserved name constants.
pub mod names {
    /// Prefix for synthesized fields
    pub const FIELD_PREFIX: &str = "$__wc_";
    /// Prefix for synthesized methods
    pub const METHOD_PREFIX: &str = "__wc_";
    /// Prefix for originals preserved under a mangled alias
    pub const RENAME_PREFIX: &str = "__wc_wrapped_";
    /// Prefix applied to target members displaced by a shadow merge
    pub const SHADOW_PREFIX: &str = "__wc_shadow_";

    /// The injected coordination state field
    pub const MANAGED_FIELD: &str = "$__wc_managed";
    /// Descriptor of the managed state field
    pub const MANAGED_FIELD_DESC: &str = "Lweft/Handle;";
    /// Getter/setter pair over the managed state field
    pub const MANAGED_METHOD: &str = "__wc_managed";
    /// Cheap participation predicate, `()Z`
    pub const IS_MANAGED_METHOD: &str = "__wc_is_managed";
    /// Walks all fields into a map
    pub const VALUES_GETTER: &str = "__wc_getallfields";
    /// Sets one field by dotted name
    pub const VALUES_SETTER: &str = "__wc_setfield";
    /// Private initializer a donor constructor is converted into
    pub const SHADOW_INIT: &str = "__wc_init_shadow";

    /// Named-lock wire name namespace
    pub const NAMED_LOCK_PREFIX: char = '^';
    /// Autolock wire name namespace
    pub const AUTO_LOCK_PREFIX: char = '@';

    /// The capability owner injected call sites are bound to
    pub const COORDINATOR_OWNER: &str = "weft/Coordinator";
}

/// Wire name for a configured named lock.
pub fn named_lock(name: &str) -> String {
    format!("{}{}", names::NAMED_LOCK_PREFIX, name)
}

/// Wire name for an autolock on a specific method.
pub fn auto_lock(class: &str, sig_key: &str) -> String {
    format!("{}{}.{}", names::AUTO_LOCK_PREFIX, class, sig_key)
}

/// Split a `name(desc)` signature key into name and descriptor.
pub fn split_sig_key(key: &str) -> Option<(&str, &str)> {
    let open = key.find('(')?;
    Some((&key[..open], &key[open..]))
}

/// Deterministic getter name for a field. The registry yields this same
/// name absent collisions, so peer classes can derive it independently.
pub fn getter_name(field: &str) -> String {
    format!("{}get_{}", names::METHOD_PREFIX, sanitize(field))
}

/// See [`getter_name`].
pub fn setter_name(field: &str) -> String {
    format!("{}set_{}", names::METHOD_PREFIX, sanitize(field))
}

/// True if a member name belongs to the reserved synthetic namespace.
pub fn is_synthetic_name(name: &str) -> bool {
    name.starts_with(names::FIELD_PREFIX) || name.starts_with(names::METHOD_PREFIX)
}

/// Per-invocation registry guaranteeing synthetic name uniqueness.
#[derive(Debug)]
pub struct NamingRegistry {
    taken: FxHashSet<String>,
}

impl NamingRegistry {
    /// Seed with every member name the class already declares.
    pub fn for_class(class: &ClassDef) -> Self {
        let mut taken = FxHashSet::default();
        for f in &class.fields {
            taken.insert(f.name.clone());
        }
        for m in &class.methods {
            taken.insert(m.name.clone());
        }
        Self { taken }
    }

    /// Claim a name, appending a numeric suffix on collision.
    fn claim(&mut self, candidate: String) -> String {
        if self.taken.insert(candidate.clone()) {
            return candidate;
        }
        let mut n = 2u32;
        loop {
            let alt = format!("{}_{}", candidate, n);
            if self.taken.insert(alt.clone()) {
                return alt;
            }
            n += 1;
        }
    }

    /// Synthetic method name for a base, e.g. `get_count` -> `__wc_get_count`.
    pub fn method(&mut self, base: &str) -> String {
        self.claim(format!("{}{}", names::METHOD_PREFIX, base))
    }

    /// Synthetic field name.
    pub fn field(&mut self, base: &str) -> String {
        self.claim(format!("{}{}", names::FIELD_PREFIX, base))
    }

    /// Generated accessor pair for a field.
    pub fn getter(&mut self, field: &str) -> String {
        self.claim(getter_name(field))
    }

    /// See [`NamingRegistry::getter`].
    pub fn setter(&mut self, field: &str) -> String {
        self.claim(setter_name(field))
    }

    /// Mangled alias for an original method preserved by a rewrite.
    pub fn renamed_original(&mut self, method: &str) -> String {
        self.claim(format!("{}{}", names::RENAME_PREFIX, method))
    }

    /// Rename for a target member displaced by a shadow merge.
    pub fn shadowed(&mut self, member: &str) -> String {
        self.claim(format!("{}{}", names::SHADOW_PREFIX, member))
    }
}

fn sanitize(name: &str) -> String {
    name.replace(['$', '/', '.'], "_")
}
