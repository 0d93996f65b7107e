//! CLI command implementations.

pub mod inspect;
pub mod transform;
pub mod validate;

use anyhow::Context;
use std::path::Path;
use weft_classfile::ClassDef;
use weft_policy::PolicySet;

/// Load a policy document, choosing the parser by file extension.
pub fn load_policy(path: &str) -> anyhow::Result<PolicySet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy {}", path))?;
    let set = if Path::new(path).extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&text).with_context(|| format!("invalid policy JSON in {}", path))?
    } else {
        toml::from_str(&text).with_context(|| format!("invalid policy TOML in {}", path))?
    };
    Ok(set)
}

/// Load one class definition from its JSON interchange form.
pub fn load_class(path: &str) -> anyhow::Result<ClassDef> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read class definition {}", path))?;
    serde_json::from_str(&text).with_context(|| format!("invalid class definition in {}", path))
}
