//! Root CLI parser and global options.

use clap::Parser;

use crate::commands::Commands;

/// Download Beat Saber builds from Steam or the Oculus CDN.
#[derive(Parser, Debug)]
#[command(name = "bsm-acquire")]
#[command(about = "Download and verify Beat Saber builds")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}
