//! `weft inspect` — summarize a class definition.

use crate::commands::load_class;
use weft_classfile::flags;

pub fn execute(file: &str, bodies: bool) -> anyhow::Result<()> {
    let class = load_class(file)?;
    println!("class {}", class.name);
    if let Some(superclass) = &class.superclass {
        println!("  extends {}", superclass);
    }
    for iface in &class.interfaces {
        println!("  implements {}", iface);
    }

    println!("  fields ({}):", class.fields.len());
    for field in &class.fields {
        println!(
            "    {}{} {}",
            marker(field.access),
            field.desc,
            field.name
        );
    }

    println!("  methods ({}):", class.methods.len());
    for method in &class.methods {
        let size = method
            .body
            .as_ref()
            .map(|b| format!("{} insns, {} handlers", b.insns.len(), b.handlers.len()))
            .unwrap_or_else(|| "abstract".to_string());
        println!(
            "    {}{}{} ({})",
            marker(method.access),
            method.name,
            method.desc,
            size
        );
        if bodies {
            if let Some(body) = &method.body {
                for insn in &body.insns {
                    println!("      {:?}", insn);
                }
            }
        }
    }
    Ok(())
}

fn marker(access: u32) -> &'static str {
    if access & flags::ACC_SYNTHETIC != 0 {
        "~"
    } else if access & flags::ACC_STATIC != 0 {
        "s "
    } else {
        ""
    }
}
