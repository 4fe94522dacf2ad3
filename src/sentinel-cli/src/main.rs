//! Sentinel CLI entry point.

use clap::Parser;
use sentinel_cli::commands::dispatch;
use sentinel_cli::styled_output::print_error;
use sentinel_cli::{AppContext, Cli, LogLevel};

const LOG_LEVEL_ENV_VAR: &str = "SENTINEL_LOG_LEVEL";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = AppContext::new(&cli.global)?;
    dispatch(&ctx, cli.command).await
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.global.verbose {
        LogLevel::Debug
    } else if let Ok(env_level) = std::env::var(LOG_LEVEL_ENV_VAR) {
        LogLevel::from_str_loose(&env_level).unwrap_or(cli.global.log_level)
    } else {
        cli.global.log_level
    };

    let filter_str = if std::env::var("RUST_LOG").is_ok() {
        format!(
            "error,sentinel_auth={},sentinel_cli={}",
            log_level.as_filter_str(),
            log_level.as_filter_str()
        )
    } else {
        log_level.as_filter_str().to_string()
    };

    tracing_subscriber::fmt()
        .with_env_filter(&filter_str)
        .with_writer(std::io::stderr)
        .init();
}
