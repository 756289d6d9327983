//! `bsm-acquire steam`: drive DepotDownloader and answer its prompts.

use std::sync::Arc;

use bsm_core::BuildIdentity;
use bsm_core::depot::{CodeKind, DepotUpdate};
use bsm_download::StreamEnd;
use bsm_download::depot::{DepotConfig, DepotDownloadRequest, DepotEngine};
use console::style;
use tracing::{debug, info, warn};

use super::stop_on_ctrl_c;
use crate::commands::SteamArgs;
use crate::error::CliError;
use crate::progress::{CliProgressPrinter, ProgressUnit};
use crate::prompt;

/// Execute the steam command.
pub async fn execute(args: SteamArgs) -> Result<(), CliError> {
    if args.username.is_none() && !args.qr {
        return Err(CliError::Arguments(
            "either --username or --qr is required".to_string(),
        ));
    }

    let engine = Arc::new(DepotEngine::new(config_from(&args)));
    let identity = BuildIdentity::new(&args.game_version).with_manifest_id(&args.manifest);
    let mut request = DepotDownloadRequest::new(identity, &args.dest)
        .remember_password(args.remember_password)
        .verify_only(args.validate)
        .with_qr(args.qr)
        .unattended(args.unattended)
        .with_context(serde_json::json!({
            "version": args.game_version,
            "manifest": args.manifest,
        }));
    if let Some(username) = args.username {
        request = request.with_credentials(username, args.password);
    }

    let mut stream = engine.download(request)?;
    let ctrl_c = {
        let engine = Arc::clone(&engine);
        stop_on_ctrl_c(move || engine.stop())
    };

    let mut printer = CliProgressPrinter::new(ProgressUnit::Percent);
    let mut failure = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(update) => {
                if let Err(err) = handle_update(&engine, &mut printer, update).await {
                    engine.stop();
                    failure = Some(err);
                }
            }
            Err(err) => failure = Some(err.into()),
        }
    }
    printer.finish();
    ctrl_c.abort();

    if let Some(err) = failure {
        return Err(err);
    }
    match stream.end() {
        Some(StreamEnd::Succeeded) => {
            let verb = if args.validate { "Validated" } else { "Downloaded" };
            println!(
                "{} {verb} Beat Saber {} to {}",
                style("✓").green(),
                args.game_version,
                args.dest.display()
            );
            Ok(())
        }
        _ => Err(CliError::Cancelled),
    }
}

fn config_from(args: &SteamArgs) -> DepotConfig {
    let mut config = DepotConfig::new();
    if let Some(path) = &args.depot_downloader {
        config = config.with_executable(path);
    }
    if let Some(app_id) = &args.app_id {
        config = config.with_app_id(app_id);
    }
    if let Some(depot_id) = &args.depot_id {
        config = config.with_depot_id(depot_id);
    }
    config
}

async fn handle_update(
    engine: &DepotEngine,
    printer: &mut CliProgressPrinter,
    update: DepotUpdate,
) -> Result<(), CliError> {
    match update {
        DepotUpdate::Started { context } => debug!(%context, "DepotDownloader started"),
        DepotUpdate::PasswordRequired => {
            let password = ask(printer, prompt::secret, "Steam password")?;
            engine.send_input(&password).await?;
        }
        DepotUpdate::CodeRequired { kind } => {
            let label = match kind {
                CodeKind::SteamGuard => "Steam Guard code (sent by e-mail)",
                CodeKind::TwoFactor => "Steam mobile authenticator code",
            };
            let code = ask(printer, prompt::line, label)?;
            engine.send_input(&code).await?;
        }
        DepotUpdate::MobileApprovalPending => {
            printer.println(format!(
                "{} Approve the login in the Steam mobile app",
                style("!").yellow()
            ));
        }
        DepotUpdate::QrCode { challenge_url } => {
            printer.println(format!(
                "Scan this login challenge with the Steam mobile app:\n  {challenge_url}"
            ));
        }
        DepotUpdate::LoggedIn { steam_id } => {
            info!(steam_id = steam_id.as_deref().unwrap_or("?"), "Logged in to Steam");
        }
        DepotUpdate::Progress { percent } => printer.update_percent(percent),
        DepotUpdate::Warning { kind, message } => {
            let kind: &'static str = kind.into();
            warn!(kind, message = message.as_deref().unwrap_or(""), "DepotDownloader warning");
        }
        DepotUpdate::Finished => printer.update_percent(100.0),
    }
    Ok(())
}

/// Run a blocking prompt with the progress bar hidden.
fn ask(
    printer: &CliProgressPrinter,
    read: fn(&str) -> Result<String, CliError>,
    label: &str,
) -> Result<String, CliError> {
    tokio::task::block_in_place(|| printer.suspend(|| read(label)))
}
