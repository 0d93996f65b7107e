//! Weft unified CLI tool
//!
//! Single command-line interface over the adaptation pipeline: transform
//! class definitions under a policy, validate a policy document against
//! definitions, and inspect definitions before or after adaptation.

use clap::{Parser, Subcommand};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Load-time class adaptation toolchain", long_about = None)]
#[command(version)]
struct Cli {
    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Adapt class definitions under a policy
    Transform {
        /// Class definition files (JSON interchange form)
        files: Vec<String>,
        /// Policy document (TOML, or JSON with a .json extension)
        #[arg(short, long, default_value = "weft.toml")]
        policy: String,
        /// Output directory for adapted definitions
        #[arg(short, long, default_value = "adapted")]
        out_dir: String,
        /// Fail instead of skipping when a file has no policy entry
        #[arg(long)]
        strict: bool,
    },

    /// Validate a policy document, optionally against class definitions
    Validate {
        /// Class definition files to resolve against the policy
        files: Vec<String>,
        /// Policy document
        #[arg(short, long, default_value = "weft.toml")]
        policy: String,
    },

    /// Summarize a class definition
    Inspect {
        /// Class definition file
        file: String,
        /// Also list instructions per method body
        #[arg(long)]
        bodies: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let choice = output::resolve_color_choice(cli.color.as_deref());

    match cli.command {
        Commands::Transform {
            files,
            policy,
            out_dir,
            strict,
        } => commands::transform::execute(&policy, &files, &out_dir, strict, choice),
        Commands::Validate { files, policy } => {
            commands::validate::execute(&policy, &files, choice)
        }
        Commands::Inspect { file, bodies } => commands::inspect::execute(&file, bodies),
    }
}
