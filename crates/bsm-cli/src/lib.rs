#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod progress;
pub mod prompt;

pub use commands::{Commands, OculusArgs, SteamArgs};
pub use error::CliError;
pub use parser::Cli;

/// Run one parsed invocation.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Steam(args) => handlers::steam::execute(args).await,
        Commands::Oculus(args) => handlers::oculus::execute(args).await,
    }
}
