//! `bsm-acquire oculus`: segmented download from the Oculus CDN.

use std::sync::Arc;

use bsm_core::{AcquireError, BuildIdentity};
use bsm_download::StreamEnd;
use bsm_download::oculus::{OculusConfig, OculusDownloadRequest, OculusEngine, is_token_plausible};
use console::style;

use super::stop_on_ctrl_c;
use crate::commands::OculusArgs;
use crate::error::CliError;
use crate::progress::{CliProgressPrinter, ProgressUnit};
use crate::prompt;

/// Execute the oculus command.
pub async fn execute(args: OculusArgs) -> Result<(), CliError> {
    let token = match args.token {
        Some(token) => token,
        None => tokio::task::block_in_place(|| prompt::secret("Oculus access token"))?,
    };
    if let Err(issue) = is_token_plausible(&token) {
        eprintln!("{} {issue}; trying anyway", style("warning:").yellow().bold());
    }

    let mut config = OculusConfig::new().with_max_concurrent_files(args.max_concurrent_files);
    if let Some(url) = &args.cdn_url {
        config = config.with_cdn_base_url(url);
    }
    let engine = Arc::new(OculusEngine::new(config)?);

    let identity = BuildIdentity::new(&args.game_version).with_binary_id(&args.binary_id);
    let request = OculusDownloadRequest::new(identity, token, &args.dest).verify_only(args.verify_only);
    let mut stream = engine.download(request)?;
    let ctrl_c = {
        let engine = Arc::clone(&engine);
        stop_on_ctrl_c(move || engine.stop())
    };

    let unit = if args.verify_only {
        ProgressUnit::Files
    } else {
        ProgressUnit::Bytes
    };
    let mut printer = CliProgressPrinter::new(unit);
    let mut failure = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(tick) => printer.update(tick.data.as_deref(), tick.current, tick.total),
            Err(err) => failure = Some(err),
        }
    }
    printer.finish();
    ctrl_c.abort();

    if let Some(err) = failure {
        if let AcquireError::IntegrityFailed { files } = &err {
            eprintln!("{} {} file(s) do not match the manifest:", style("✗").red(), files.len());
            for file in files {
                eprintln!("  {file}");
            }
        }
        return Err(err.into());
    }
    match stream.end() {
        Some(StreamEnd::Succeeded) => {
            let verb = if args.verify_only { "Verified" } else { "Downloaded" };
            println!(
                "{} {verb} Beat Saber {} in {}",
                style("✓").green(),
                args.game_version,
                args.dest.display()
            );
            Ok(())
        }
        _ => Err(CliError::Cancelled),
    }
}
