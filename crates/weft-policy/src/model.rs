//! Resolved per-class specification
//!
//! A [`ClassSpec`] is produced once per class at transform start and is
//! immutable for the remainder of the pass. Only these precomputed tables
//! may be shared read-only across concurrent transform invocations.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// How a class participates in adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdaptTier {
    /// Left untouched
    NotAdaptable,
    /// Field-level interception
    Physical,
    /// Coarse-grained operation replication
    Logical,
}

/// Concrete library flavor a policy targets, selected once at configuration
/// time. Version-conditional behavior hangs off this tag, never off inline
/// checks in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LibraryVariant {
    #[default]
    Baseline,
    /// Pre-generics collection layouts
    Legacy,
}

/// Shape of a synthesized logical wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WrapperKind {
    /// Delegate, then always notify once
    Always,
    /// Delegate (boolean-returning), notify only when it returned true
    IfTrue,
    /// Normalize the key through the existing entry, then always notify
    MapPut {
        /// sig key of a `(Ljava/lang/Object;)Ljava/lang/Object;` method
        /// returning the stored key for an argument key, or null
        entry_lookup: String,
    },
    /// Notify only when an entry existed, key normalized through it
    MapRemove {
        /// See [`WrapperKind::MapPut::entry_lookup`]
        entry_lookup: String,
    },
    /// Bulk operation lowered to one notification per element, in iteration
    /// order, under the named single-element operation
    EachElement {
        /// sig key of the per-element operation, e.g. `add(Ljava/lang/Object;)Z`
        element_op: String,
    },
    /// Delegate to the variant alias that never materializes a previous
    /// value; callers must not observe the suppressed return
    NoPrevious,
}

/// Lock strength for begin/commit boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockLevel {
    Read,
    Write,
    Concurrent,
}

impl LockLevel {
    /// Wire encoding of the level.
    pub fn as_i32(self) -> i32 {
        match self {
            LockLevel::Read => 1,
            LockLevel::Write => 2,
            LockLevel::Concurrent => 4,
        }
    }
}

/// One lock definition attached to a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDef {
    pub name: String,
    pub level: LockLevel,
    /// Autolocks wrap monitor regions instead of whole methods
    #[serde(default)]
    pub auto: bool,
}

/// Resolved logical operation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalOpSpec {
    /// `name(desc)` key of the original method
    pub sig_key: String,
    pub kind: WrapperKind,
    /// Whether the wrapper verifies write access under the lock manager
    pub check_write: bool,
}

/// Immutable classification of one class, consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct ClassSpec {
    pub name: String,
    pub superclass: Option<String>,
    pub tier: AdaptTier,
    pub variant: LibraryVariant,
    /// Cluster-global state fields
    pub roots: FxHashSet<String>,
    /// Fields whose accesses rewrite unconditionally within the boundary
    pub portable: FxHashSet<String>,
    /// Fields excluded from interception
    pub transients: FxHashSet<String>,
    /// Logical operations keyed by `name(desc)`
    pub logical_ops: FxHashMap<String, LogicalOpSpec>,
    /// Non-auto and auto lock definitions keyed by `name(desc)`
    pub locks: FxHashMap<String, Vec<LockDef>>,
    /// Managed-mode redirects: fast-path sig key -> full-path method name
    pub fast_paths: FxHashMap<String, String>,
    /// Helper sig key -> sig keys of callers whose bodies retarget to it
    pub managed_helpers: FxHashMap<String, Vec<String>>,
    /// Methods replaced with an unsupported-operation body
    pub unsupported: FxHashSet<String>,
    /// Classes within the adaptation boundary (self, known ancestors, peers)
    pub boundary: FxHashSet<String>,
}

impl ClassSpec {
    /// A spec that leaves the class untouched.
    pub fn not_adaptable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            superclass: None,
            tier: AdaptTier::NotAdaptable,
            variant: LibraryVariant::Baseline,
            roots: FxHashSet::default(),
            portable: FxHashSet::default(),
            transients: FxHashSet::default(),
            logical_ops: FxHashMap::default(),
            locks: FxHashMap::default(),
            fast_paths: FxHashMap::default(),
            managed_helpers: FxHashMap::default(),
            unsupported: FxHashSet::default(),
            boundary: FxHashSet::default(),
        }
    }

    pub fn is_adaptable(&self) -> bool {
        self.tier != AdaptTier::NotAdaptable
    }

    pub fn is_physical(&self) -> bool {
        self.tier == AdaptTier::Physical
    }

    pub fn is_logical(&self) -> bool {
        self.tier == AdaptTier::Logical
    }

    pub fn is_root(&self, field: &str) -> bool {
        self.roots.contains(field)
    }

    pub fn is_portable_field(&self, field: &str) -> bool {
        self.portable.contains(field)
    }

    /// Whether a declaring class lies within the adaptation boundary.
    pub fn in_boundary(&self, class: &str) -> bool {
        class == self.name || self.boundary.contains(class)
    }

    pub fn logical_op(&self, sig_key: &str) -> Option<&LogicalOpSpec> {
        self.logical_ops.get(sig_key)
    }

    /// Non-auto lock definitions for a method, empty when unlocked.
    pub fn named_locks(&self, sig_key: &str) -> Vec<&LockDef> {
        self.locks
            .get(sig_key)
            .map(|defs| defs.iter().filter(|d| !d.auto).collect())
            .unwrap_or_default()
    }

    /// Autolock definition for a method, if any.
    pub fn auto_lock(&self, sig_key: &str) -> Option<&LockDef> {
        self.locks
            .get(sig_key)
            .and_then(|defs| defs.iter().find(|d| d.auto))
    }
}
