//! Command-line surface. Grounded in the teacher's `cli/env.rs`
//! (top-level `CliArgs`) and `cli/commands.rs` (the `Commands`
//! subcommand enum), trimmed to the three subcommands this orchestrator
//! actually needs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::demo::{CancelArgs, ResumeArgs, RunArgs};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path (YAML). Falls back to built-in defaults
    /// when absent.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable debug-level logging regardless of `--log-level`.
    #[arg(short, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a task to completion against the built-in demo
    /// BrowsingContext and ChatModel.
    Run(RunArgs),

    /// Run a demo task that cancels itself partway through, to
    /// exercise the cooperative-cancellation path.
    Cancel(CancelArgs),

    /// Run a demo task that pauses and resumes itself partway through.
    Resume(ResumeArgs),
}
