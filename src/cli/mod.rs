//! CLI entry point for deep-research.

pub mod commands;
pub mod output;
pub mod progress;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use strum::{Display, EnumString};

use crate::types::{DEFAULT_MAX_ITERATIONS, DEFAULT_TIMEOUT_SECONDS};

/// How results are printed or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Markdown,
    Json,
    /// Annotated body plus a numbered reference section
    Report,
}

/// Deep research CLI
#[derive(Parser, Debug)]
#[command(
    name = "deep-research",
    version,
    about = "Run hosted deep-research agents and print cited reports",
    after_help = "Examples:\n  deep-research \"What are the latest AI developments?\"\n  deep-research --query \"Quantum computing breakthroughs\" --output results.json --format json\n  deep-research --interactive"
)]
pub struct Cli {
    /// Research query to execute
    pub query: Option<String>,

    /// Research query (alternative to the positional argument)
    #[arg(short = 'q', long = "query", conflicts_with = "query")]
    pub query_flag: Option<String>,

    /// Write results to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Disable citation extraction
    #[arg(long)]
    pub no_citations: bool,

    /// Maximum number of status polls (1-50)
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: u32,

    /// Wall-clock limit in seconds (1-3600)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    pub timeout: u64,

    /// Interactive mode
    #[arg(short, long)]
    pub interactive: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Logging level (DEBUG, INFO, WARNING, ERROR)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Show service status and exit
    #[arg(long)]
    pub status: bool,

    /// List saved research logs and exit
    #[arg(long)]
    pub list_logs: bool,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The query from either the positional argument or `--query`.
    pub fn query_text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .or(self.query_flag.as_deref())
            .filter(|q| !q.trim().is_empty())
    }
}

/// Map a configured level onto a `tracing` filter directive.
pub fn filter_directive(level: &str) -> &'static str {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}
