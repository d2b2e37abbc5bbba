//! CLI command handlers for research, status, log listing and interactive mode.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use super::output::{format_log_listing, render};
use super::progress::TerminalProgress;
use super::{Cli, OutputFormat};
use crate::config::ResearchConfig;
use crate::error::{FailureKind, ResearchError};
use crate::persist::ResearchLogStore;
use crate::progress::{ProgressBroadcaster, ProgressRecorder, ThrottledProgress};
use crate::research::{ResearchService, ServiceStatus, REASONING_PREFIX};
use crate::types::{ResearchResult, DEFAULT_MAX_ITERATIONS, DEFAULT_TIMEOUT_SECONDS};

type CommandResult = Result<i32, Box<dyn std::error::Error>>;

/// Exit code for an interrupted run.
pub const EXIT_CANCELLED: i32 = 130;

const INTERACTIVE_HELP: &str = "
Interactive Mode Commands:
  <query>       - Execute research query
  help, h, ?    - Show this help
  status        - Show service status
  quit, exit, q - Exit interactive mode
";

/// Options for one research invocation.
#[derive(Debug, Clone)]
pub struct ResearchOptions {
    pub format: OutputFormat,
    pub output: Option<std::path::PathBuf>,
    pub enable_citations: bool,
    pub max_iterations: u32,
    pub timeout_seconds: u64,
    pub verbose: bool,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            output: None,
            enable_citations: true,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            verbose: false,
        }
    }
}

impl From<&Cli> for ResearchOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            format: cli.format,
            output: cli.output.clone(),
            enable_citations: !cli.no_citations,
            max_iterations: cli.max_iterations,
            timeout_seconds: cli.timeout,
            verbose: cli.verbose,
        }
    }
}

/// Handle `deep-research --status`.
pub fn handle_status(config: &ResearchConfig) -> CommandResult {
    let status = match ResearchService::from_config(config.clone()) {
        Ok(service) => service.status(),
        Err(e) => ServiceStatus::unavailable(config, &e),
    };
    println!("Service Status:");
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(if status.is_healthy() { 0 } else { 1 })
}

/// Handle `deep-research --list-logs`.
pub fn handle_list_logs(config: &ResearchConfig) -> CommandResult {
    let store = ResearchLogStore::new(&config.log_directory)?;
    let records = store.load_logs()?;
    print!("{}", format_log_listing(&records));
    if records.is_empty() {
        println!();
    }
    Ok(0)
}

/// Run one query, print or write the result and save its log.
pub async fn handle_research(
    service: &ResearchService,
    query: &str,
    options: &ResearchOptions,
) -> CommandResult {
    let request = match service.request(
        query,
        options.max_iterations,
        options.timeout_seconds,
        options.enable_citations,
    ) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Invalid query: {e}");
            return Ok(1);
        }
    };

    println!("Starting research for: {}", request.query());
    println!();

    let broadcaster = Arc::new(ProgressBroadcaster::new());
    broadcaster.subscribe(ThrottledProgress::new(TerminalProgress::stderr(options.verbose)));
    let recorder = Arc::new(ProgressRecorder::new());
    if options.verbose {
        broadcaster.subscribe_shared(recorder.clone());
    }

    let handle = service.executor().submit(request, broadcaster);
    let cancel = handle.cancellation_token();
    let wait = handle.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        result = &mut wait => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nOperation cancelled by user");
            cancel.cancel();
            wait.await
        }
    };

    if options.verbose {
        for message in recorder.messages() {
            if is_reasoning_message(&message) {
                println!("{message}");
            }
        }
        println!("Progress events: {}", recorder.len());
    }

    match service.save_log(&result) {
        Ok(path) if options.verbose => println!("\nLog saved to: {}", path.display()),
        Ok(_) => {}
        Err(e) => eprintln!("Failed to save research log: {e}"),
    }

    if !result.success {
        let message = result.error_message.as_deref().unwrap_or("Research failed");
        println!("\n❌ {message}");
        return Ok(if matches!(result.failure, Some(FailureKind::Cancelled)) {
            EXIT_CANCELLED
        } else {
            1
        });
    }

    println!("\n✅ Research completed successfully!");
    write_result(service, &result, options)?;
    Ok(0)
}

fn write_result(
    service: &ResearchService,
    result: &ResearchResult,
    options: &ResearchOptions,
) -> Result<(), ResearchError> {
    let rendered = match options.format {
        OutputFormat::Report => service.report(result),
        format => render(result, format)?,
    };
    match &options.output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!("Results saved to: {}", path.display());
        }
        None => {
            println!("\n{}", "=".repeat(60));
            println!("RESEARCH RESULTS");
            println!("{}", "=".repeat(60));
            println!("{rendered}");
        }
    }
    Ok(())
}

/// Read queries from stdin until `quit` or end of input.
pub async fn handle_interactive(service: &ResearchService) -> CommandResult {
    println!("Deep Research - Interactive Mode");
    println!("Type 'quit' or 'exit' to quit, 'help' for help");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let options = ResearchOptions::default();
    loop {
        print!("Research query: ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            println!("\nGoodbye!");
            return Ok(0);
        };
        let query = line.trim();
        match query.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" | "q" => {
                println!("Goodbye!");
                return Ok(0);
            }
            "help" | "h" | "?" => println!("{INTERACTIVE_HELP}"),
            "status" => {
                println!("{}", serde_json::to_string_pretty(&service.status())?);
            }
            _ => {
                if handle_research(service, query, &options).await? == EXIT_CANCELLED {
                    println!("Type 'quit' to exit");
                }
            }
        }
    }
}

/// Whether a progress message carries an interim reasoning summary.
pub fn is_reasoning_message(message: &str) -> bool {
    message.starts_with("Reasoning:") || message.starts_with(REASONING_PREFIX)
}
