//! `weft validate` — check a policy document, optionally against classes.

use crate::commands::{load_class, load_policy};
use crate::output::StyledOutput;
use anyhow::bail;
use termcolor::ColorChoice;
use weft_classfile::validate_class;
use weft_policy::PolicyResolver;

pub fn execute(policy_path: &str, files: &[String], color: ColorChoice) -> anyhow::Result<()> {
    let mut out = StyledOutput::new(color);
    let policy = load_policy(policy_path)?;
    let covered = policy.classes.len();
    let resolver = PolicyResolver::new(policy)?;
    out.success(
        "ok",
        &format!("{}: {} class entries", policy_path, covered),
    );

    let mut failures = 0usize;
    for file in files {
        let class = load_class(file)?;
        let checked = validate_class(&class)
            .map_err(anyhow::Error::from)
            .and_then(|_| resolver.resolve(&class).map_err(anyhow::Error::from));
        match checked {
            Ok(spec) if spec.is_adaptable() => {
                out.success("ok", &format!("{} ({:?})", class.name, spec.tier));
            }
            Ok(_) => out.warn("uncovered", &class.name),
            Err(e) => {
                out.error(&format!("{}: {}", class.name, e));
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{} class definitions failed validation", failures);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_policy_entries_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let policy = dir.path().join("weft.toml");
        std::fs::write(
            &policy,
            r#"
[[classes]]
class = "t/A"
tier = "physical"

[[classes]]
class = "t/A"
tier = "logical"
"#,
        )
        .unwrap();
        assert!(execute(policy.to_str().unwrap(), &[], ColorChoice::Never).is_err());
    }
}
