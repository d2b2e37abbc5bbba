//! deep-research CLI binary entry point.

use deep_research::cli::commands::{
    handle_interactive, handle_list_logs, handle_research, handle_status, ResearchOptions,
};
use deep_research::cli::{filter_directive, Cli};
use deep_research::config::ResearchConfig;
use deep_research::research::ResearchService;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let mut config = ResearchConfig::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config = config.with_log_level(level.clone());
    }
    init_tracing(&config.log_level);

    if cli.status {
        return handle_status(&config);
    }
    if cli.list_logs {
        return handle_list_logs(&config);
    }

    let service = ResearchService::from_config(config)?;
    if cli.interactive {
        return handle_interactive(&service).await;
    }

    match cli.query_text() {
        Some(query) => handle_research(&service, query, &ResearchOptions::from(&cli)).await,
        None => {
            eprintln!("Usage: deep-research \"your research query\" (or --interactive)");
            Ok(1)
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
