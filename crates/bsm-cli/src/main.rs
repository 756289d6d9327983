//! CLI entry point.

use std::process::ExitCode;

use bsm_cli::Cli;
use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match bsm_cli::run(cli).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("{} {err}", style("error:").red().bold());
            let code = u8::try_from(err.exit_code()).unwrap_or(1);
            Ok(ExitCode::from(code))
        }
    }
}
