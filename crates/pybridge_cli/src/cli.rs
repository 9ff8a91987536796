//! CLI argument parsing and command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pybridge")]
#[command(about = "Exercise the dynamic Python bridge", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Explicit path to the Python shared library
    #[arg(long, global = true, value_name = "PATH")]
    pub library: Option<PathBuf>,

    /// Required Python version (`3` or `3.11`)
    #[arg(long, global = true, value_name = "VERSION")]
    pub python_version: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the resolved interpreter: library path, version, symbol
    /// generation
    Info,

    /// Run a Python source snippet
    Run {
        /// Source code to execute
        #[arg(value_name = "CODE")]
        code: String,
    },

    /// Evaluate a Python expression and print its repr
    Eval {
        /// Expression to evaluate
        #[arg(value_name = "EXPR")]
        expression: String,
    },

    /// Import a module and print its repr
    Import {
        /// Module name
        #[arg(value_name = "MODULE")]
        module: String,
    },
}
