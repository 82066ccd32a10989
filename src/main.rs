use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

use codeask::app::{self, RunOptions};
use codeask::cli::Cli;
use codeask::error::{AskError, EXIT_SUCCESS};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too, with exit code 0.
            let _ = e.print();
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("Error: failed to initialise logging: {e:#}");
    }

    dotenvy::dotenv().ok();
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "codeask starting");

    let mut stdout = std::io::stdout().lock();
    let result = app::run(cli, RunOptions::from_env(), &mut stdout).await;
    let _ = stdout.flush();

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e @ AskError::Cancelled(_)) => {
            eprintln!("\nRequest cancelled.");
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            tracing::debug!(error = ?e, "request failed");
            eprintln!("Error: {}", e.user_message());
            ExitCode::from(e.exit_code())
        }
    }
}

/// Logs go to stderr so stdout carries only the model's answer.
/// `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) -> anyhow::Result<()> {
    let default_level = match verbose {
        0 => "codeask=warn",
        1 => "codeask=info",
        _ => "codeask=debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}
