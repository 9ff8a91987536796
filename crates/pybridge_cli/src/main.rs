//! pybridge CLI - exercise the dynamic Python bridge
//!
//! Thin diagnostics over the bridge API:
//! - `info`: show the resolved interpreter
//! - `run`: execute a source snippet
//! - `eval`: evaluate an expression, print its repr
//! - `import`: import a module, print its repr
//!
//! Loader configuration comes from `--library` / `--python-version` or the
//! `PYTHON_LIBRARY` / `PYTHON_VERSION` environment variables.

mod cli;
mod commands;

use clap::Parser;
use colored::Colorize;
use std::process;

use cli::{Cli, Commands};

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Some(path) = &cli.library {
        pybridge::use_library_path(path);
    }
    if let Some(version) = &cli.python_version {
        match parse_version(version) {
            Some((major, minor)) => pybridge::use_version(major, minor),
            None => {
                eprintln!("{} invalid version '{version}'", "error:".red().bold());
                process::exit(2);
            }
        }
    }

    let result = match &cli.command {
        Commands::Info => commands::info(),
        Commands::Run { code } => commands::run(code),
        Commands::Eval { expression } => commands::eval(expression),
        Commands::Import { module } => commands::import(module),
    };

    if let Err(message) = result {
        eprintln!("{} {message}", "error:".red().bold());
        process::exit(1);
    }
}

fn parse_version(text: &str) -> Option<(u8, Option<u8>)> {
    let mut parts = text.trim().splitn(2, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => Some(minor.parse().ok()?),
        None => None,
    };
    Some((major, minor))
}
