//! Declarative policy format
//!
//! The serde form loaded from configuration. One [`ClassPolicy`] per class;
//! the [`PolicySet`] is the whole configuration document.

use crate::model::{AdaptTier, LibraryVariant, LockDef, WrapperKind};
use serde::{Deserialize, Serialize};

/// A logical operation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalOpConfig {
    /// `name(desc)` of the method, e.g. `remove(Ljava/lang/Object;)Z`
    pub method: String,
    pub kind: WrapperKind,
    /// Verify write access before delegating (defaults on)
    #[serde(default = "default_true")]
    pub check_write: bool,
}

fn default_true() -> bool {
    true
}

/// A lock rule binding one method to a lock definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// `name(desc)` of the method
    pub method: String,
    #[serde(flatten)]
    pub lock: LockDef,
}

/// Managed-mode fast path redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastPathConfig {
    /// `name(desc)` of the optimistic read path
    pub method: String,
    /// Name of the lock-taking counterpart to call when managed
    pub full_path: String,
}

/// Internal helper mangled to carry the caller's managed flag.
///
/// The helper is renamed under the reserved prefix with a trailing boolean
/// parameter; every call site inside the listed callers is retargeted to the
/// mangled name and pushes the receiver's managed state as that flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedHelperConfig {
    /// `name(desc)` of the helper
    pub method: String,
    /// `name(desc)` of each method whose body calls the helper
    pub callers: Vec<String>,
}

/// Per-class policy entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPolicy {
    /// Internal class name this policy applies to
    pub class: String,
    pub tier: AdaptTier,
    #[serde(default)]
    pub variant: LibraryVariant,
    /// Cluster-global fields
    #[serde(default)]
    pub roots: Vec<String>,
    /// Fields rewritten to accessors; `"*"` classifies every instance field
    #[serde(default)]
    pub portable: Vec<String>,
    /// Fields excluded from interception
    #[serde(default, rename = "transient")]
    pub transients: Vec<String>,
    #[serde(default)]
    pub logical_ops: Vec<LogicalOpConfig>,
    #[serde(default)]
    pub locks: Vec<LockConfig>,
    #[serde(default)]
    pub fast_paths: Vec<FastPathConfig>,
    #[serde(default)]
    pub managed_helpers: Vec<ManagedHelperConfig>,
    /// Introspection methods with no distributed equivalent
    #[serde(default)]
    pub unsupported: Vec<String>,
    /// Methods explicitly classified as untracked (logical tier only)
    #[serde(default)]
    pub untracked: Vec<String>,
    /// Extra classes treated as within this class's adaptation boundary
    #[serde(default)]
    pub boundary: Vec<String>,
}

/// The whole policy document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(default)]
    pub classes: Vec<ClassPolicy>,
}

impl PolicySet {
    pub fn policy_for(&self, class: &str) -> Option<&ClassPolicy> {
        self.classes.iter().find(|p| p.class == class)
    }

    /// Internal names of every class the policy set covers.
    pub fn covered_classes(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|p| p.class.as_str())
    }
}
