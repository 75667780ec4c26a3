//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Weaverd - LLM workflow engine
#[derive(Parser)]
#[command(
    name = "wv",
    about = "Message-driven workflow engine for LLM-backed development activities",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the processors in the foreground until interrupted
    Daemon,

    /// Build one context from a request file and print the response
    Context {
        /// Path to a JSON ContextBuildRequest
        request: PathBuf,

        /// Working directory the gatherers read from
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },

    /// Print the effective configuration
    Config,
}
