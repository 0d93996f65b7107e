//! `weft transform` — adapt class definitions under a policy.

use crate::commands::{load_class, load_policy};
use crate::output::StyledOutput;
use anyhow::{bail, Context};
use std::path::Path;
use termcolor::ColorChoice;
use weft_policy::PolicyResolver;
use weft_transform::transform_class;

pub fn execute(
    policy_path: &str,
    files: &[String],
    out_dir: &str,
    strict: bool,
    color: ColorChoice,
) -> anyhow::Result<()> {
    let mut out = StyledOutput::new(color);
    if files.is_empty() {
        bail!("no class definition files given");
    }
    let resolver = PolicyResolver::new(load_policy(policy_path)?)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {}", out_dir))?;

    let mut adapted = 0usize;
    let mut skipped = 0usize;
    for file in files {
        let mut class = load_class(file)?;
        let spec = resolver.resolve(&class)?;
        if !spec.is_adaptable() {
            if strict {
                bail!("{}: no policy entry for class {}", file, class.name);
            }
            out.warn("skip", &format!("{} ({})", file, class.name));
            skipped += 1;
            continue;
        }
        transform_class(&mut class, &spec)
            .with_context(|| format!("failed to adapt {}", class.name))?;

        let file_name = Path::new(file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.json", class.name.replace('/', "_")));
        let target = Path::new(out_dir).join(file_name);
        let json = serde_json::to_string_pretty(&class)?;
        std::fs::write(&target, json)
            .with_context(|| format!("failed to write {}", target.display()))?;
        out.success("adapt", &format!("{} -> {}", class.name, target.display()));
        adapted += 1;
    }

    out.plain(&format!("{} adapted, {} skipped", adapted, skipped));
    Ok(())
}
