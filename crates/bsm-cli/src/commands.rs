//! Subcommands, one per store.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Available download sources.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a build from Steam through DepotDownloader
    Steam(SteamArgs),

    /// Download a build from the Oculus CDN
    Oculus(OculusArgs),
}

/// Arguments of `bsm-acquire steam`.
#[derive(Args, Debug)]
pub struct SteamArgs {
    /// Game version being downloaded (e.g. "1.29.1")
    #[arg(long = "game-version")]
    pub game_version: String,

    /// Depot manifest id of the build
    #[arg(long)]
    pub manifest: String,

    /// Destination directory
    #[arg(long)]
    pub dest: PathBuf,

    /// Steam account name; omit with --qr
    #[arg(long, env = "BSM_STEAM_USERNAME")]
    pub username: Option<String>,

    /// Steam password; prompted for when needed if omitted
    #[arg(long, env = "BSM_STEAM_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Ask DepotDownloader to remember the login
    #[arg(long)]
    pub remember_password: bool,

    /// Only validate files already in the destination
    #[arg(long)]
    pub validate: bool,

    /// Log in by scanning a QR code with the Steam app
    #[arg(long, conflicts_with = "username")]
    pub qr: bool,

    /// Fail instead of prompting for input
    #[arg(long)]
    pub unattended: bool,

    /// Path to the DepotDownloader executable
    #[arg(long, env = "BSM_DEPOT_DOWNLOADER")]
    pub depot_downloader: Option<PathBuf>,

    /// Steam app id
    #[arg(long)]
    pub app_id: Option<String>,

    /// Steam depot id
    #[arg(long)]
    pub depot_id: Option<String>,
}

/// Arguments of `bsm-acquire oculus`.
#[derive(Args, Debug)]
pub struct OculusArgs {
    /// Game version being downloaded (e.g. "1.29.1")
    #[arg(long = "game-version")]
    pub game_version: String,

    /// Oculus binary id of the build
    #[arg(long)]
    pub binary_id: String,

    /// Destination directory
    #[arg(long)]
    pub dest: PathBuf,

    /// User access token; prompted for if omitted
    #[arg(long, env = "BSM_OCULUS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Only check files already in the destination
    #[arg(long)]
    pub verify_only: bool,

    /// Files downloaded in parallel
    #[arg(long, default_value_t = bsm_download::oculus::DEFAULT_MAX_CONCURRENT_FILES)]
    pub max_concurrent_files: usize,

    /// CDN base URL
    #[arg(long, env = "BSM_OCULUS_CDN")]
    pub cdn_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use crate::parser::Cli;
    use crate::commands::Commands;
    use clap::Parser;

    #[test]
    fn test_steam_flags() {
        let cli = Cli::try_parse_from([
            "bsm-acquire",
            "steam",
            "--game-version",
            "1.29.1",
            "--manifest",
            "4400000000000000000",
            "--dest",
            "/tmp/bs",
            "--username",
            "player",
            "--remember-password",
            "--validate",
        ])
        .unwrap();
        let Commands::Steam(args) = cli.command else {
            panic!("expected steam command");
        };
        assert_eq!(args.manifest, "4400000000000000000");
        assert_eq!(args.username.as_deref(), Some("player"));
        assert!(args.remember_password);
        assert!(args.validate);
        assert!(!args.qr);
    }

    #[test]
    fn test_qr_conflicts_with_username() {
        let result = Cli::try_parse_from([
            "bsm-acquire",
            "steam",
            "--game-version",
            "1.29.1",
            "--manifest",
            "1",
            "--dest",
            "/tmp/bs",
            "--username",
            "player",
            "--qr",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_oculus_defaults() {
        let cli = Cli::try_parse_from([
            "bsm-acquire",
            "oculus",
            "--game-version",
            "1.29.1",
            "--binary-id",
            "2716512218368633",
            "--dest",
            "/tmp/bs",
        ])
        .unwrap();
        let Commands::Oculus(args) = cli.command else {
            panic!("expected oculus command");
        };
        assert_eq!(args.max_concurrent_files, 15);
        assert!(!args.verify_only);
    }

    #[test]
    fn test_missing_dest_is_rejected() {
        let result = Cli::try_parse_from([
            "bsm-acquire",
            "oculus",
            "--game-version",
            "1.29.1",
            "--binary-id",
            "1",
        ]);
        assert!(result.is_err());
    }
}
