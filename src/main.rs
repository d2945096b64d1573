use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scholar_ingest::cli::commands::{
    handle_config, handle_consume, handle_explain, handle_list, handle_provision, handle_search,
    handle_show, handle_status,
};
use scholar_ingest::cli::{Cli, Commands};
use scholar_ingest::models::{Config, OutputFormat};

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "scholar_ingest=debug,info"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let format = cli.format.unwrap_or_else(|| {
        Config::load()
            .map(|config| config.search.default_format)
            .unwrap_or_default()
    });
    let verbose = cli.verbose;

    match cli.command {
        // The pipeline observes the signal itself so it can drain before exit.
        Commands::Consume(args) => handle_consume(args, format, verbose, shutdown_signal()).await,
        command => {
            tokio::select! {
                result = run_command(command, format, verbose) => result,
                _ = shutdown_signal() => {
                    eprintln!("\nReceived shutdown signal, exiting");
                    Ok(())
                }
            }
        }
    }
}

async fn run_command(command: Commands, format: OutputFormat, verbose: bool) -> Result<()> {
    match command {
        Commands::Consume(args) => handle_consume(args, format, verbose, shutdown_signal()).await,
        Commands::Provision => handle_provision(format, verbose).await,
        Commands::Search(args) => handle_search(args, format, verbose).await,
        Commands::Show(args) => handle_show(args, format, verbose).await,
        Commands::List(args) => handle_list(args, format, verbose).await,
        Commands::Explain(args) => handle_explain(args, format, verbose).await,
        Commands::Status => handle_status(format, verbose).await,
        Commands::Config(cmd) => handle_config(cmd, format, verbose).await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
