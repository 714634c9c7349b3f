use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "viki")]
#[command(version)]
#[command(
    about = "Manage a server from a declarative configuration",
    long_about = "Reads *.vk.yaml / *.vk.toml fragments from a directory, compares the declared \
resources with state.vk.json, and applies the difference over ssh."
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding the configuration and state files
    #[arg(short, long, default_value = ".", global = true)]
    pub path: String,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the data probes and record their output in the state file
    Fetch,

    /// Show what apply would add and destroy (never contacts the host)
    Plan,

    /// Add and destroy resources so the host matches the configuration
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Skip the approval prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl Cli {
    /// The working directory with `~` and `$VAR` expanded
    pub fn working_dir(&self) -> PathBuf {
        match shellexpand::full(&self.path) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(e) => {
                log::warn!(component = "cli", op = "path"; "Could not expand '{}': {e}", self.path);
                PathBuf::from(&self.path)
            }
        }
    }
}
