mod cli;
mod commands;
mod config;
mod engine;
mod env;
mod progress;
mod ssh;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use log::kv::{Key, Source};
use std::io::{self, Write};
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Working directory holding configuration, `.env` and state
    pub path: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format(|buf, record| {
            let kv = record.key_values();
            match (kv.get(Key::from_str("component")), kv.get(Key::from_str("op"))) {
                (Some(component), Some(op)) => writeln!(
                    buf,
                    "[{} {component}.{op}] {}",
                    record.level(),
                    record.args()
                ),
                _ => writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args()),
            }
        })
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        path: cli.working_dir(),
    };
    log::debug!(component = "cli", op = "main"; "Working directory: {}", ctx.path.display());

    match cli.command {
        Command::Fetch => commands::declarative::fetch(&ctx),
        Command::Plan => commands::declarative::plan(&ctx),
        Command::Apply(args) => commands::declarative::apply(&ctx, args.yes),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "viki", &mut io::stdout());
            Ok(())
        }
    }
}
