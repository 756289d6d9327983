//! Steam acquisition engine.
//!
//! Spawns `DepotDownloader` through [`DepotProcess`], runs every stdout line
//! through [`parse_line`] and turns the resulting protocol events into
//! [`DepotUpdate`]s:
//!
//! ```text
//! Idle -> Starting -> AwaitingPassword | AwaitingCode | AwaitingMobileApproval
//!      -> Downloading -> Finished | Failed | Cancelled
//! ```
//!
//! Prompts suspend the stream until the caller answers with
//! [`DepotEngine::send_input`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bsm_core::depot::{CodeKind, DepotEvent, DepotEventKind, DepotUpdate, InfoEvent};
use bsm_core::{AcquireError, AcquireResult, BuildIdentity};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::args::DepotArgs;
use super::config::DepotConfig;
use super::process::{DepotProcess, LineSubscription, ProcessError, ProcessOutput, SpawnOptions};
use super::protocol::{parse_line, parse_percent};
use crate::slot::{DownloadSlot, SlotLease};
use crate::stream::{DownloadStream, StreamSink};

/// Stream returned by [`DepotEngine::download`].
pub type DepotEventStream = DownloadStream<DepotUpdate>;

// ============================================================================
// Request
// ============================================================================

/// One Steam download.
#[derive(Clone)]
pub struct DepotDownloadRequest {
    pub identity: BuildIdentity,
    pub destination: PathBuf,
    pub username: Option<String>,
    /// Written to stdin the first time the downloader asks for it.
    pub password: Option<String>,
    pub remember_password: bool,
    /// Only validate existing files (`-validate`).
    pub verify_only: bool,
    /// Log in with a QR code instead of credentials.
    pub qr: bool,
    /// Fail instead of prompting when no password was supplied.
    pub unattended: bool,
    /// Echoed in `DepotUpdate::Started`; defaults to the serialized identity.
    pub context: Option<serde_json::Value>,
}

impl DepotDownloadRequest {
    pub fn new(identity: BuildIdentity, destination: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            destination: destination.into(),
            username: None,
            password: None,
            remember_password: false,
            verify_only: false,
            qr: false,
            unattended: false,
            context: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    #[must_use]
    pub const fn remember_password(mut self, remember: bool) -> Self {
        self.remember_password = remember;
        self
    }

    #[must_use]
    pub const fn verify_only(mut self, verify: bool) -> Self {
        self.verify_only = verify;
        self
    }

    #[must_use]
    pub const fn with_qr(mut self, qr: bool) -> Self {
        self.qr = qr;
        self
    }

    #[must_use]
    pub const fn unattended(mut self, unattended: bool) -> Self {
        self.unattended = unattended;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Debug for DepotDownloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepotDownloadRequest")
            .field("identity", &self.identity)
            .field("destination", &self.destination)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("remember_password", &self.remember_password)
            .field("verify_only", &self.verify_only)
            .field("qr", &self.qr)
            .field("unattended", &self.unattended)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Phase
// ============================================================================

/// Where the engine's state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepotPhase {
    #[default]
    Idle,
    /// Process spawned, logging in.
    Starting,
    AwaitingPassword,
    AwaitingCode,
    AwaitingMobileApproval,
    Downloading,
    Finished,
    Failed,
    Cancelled,
}

impl DepotPhase {
    /// Whether the engine is waiting on `send_input`.
    pub const fn awaits_input(self) -> bool {
        matches!(self, Self::AwaitingPassword | Self::AwaitingCode)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Drives `DepotDownloader`. One download at a time per instance.
pub struct DepotEngine {
    config: DepotConfig,
    slot: DownloadSlot<DepotProcess>,
    phase: Arc<watch::Sender<DepotPhase>>,
}

impl DepotEngine {
    pub fn new(config: DepotConfig) -> Self {
        let (phase, _) = watch::channel(DepotPhase::Idle);
        Self {
            config,
            slot: DownloadSlot::new(),
            phase: Arc::new(phase),
        }
    }

    /// Start a download.
    ///
    /// Fails fast with [`AcquireError::AlreadyDownloading`] while another
    /// download runs on this engine. Must be called within a Tokio runtime.
    pub fn download(&self, request: DepotDownloadRequest) -> AcquireResult<DepotEventStream> {
        let mut args = DepotArgs::for_build(
            &self.config.app_id,
            &self.config.depot_id,
            &request.identity,
            request.destination.to_string_lossy(),
        )
        .ok_or_else(|| AcquireError::MissingIdentifier {
            field: "manifest_id".to_string(),
        })?;
        args.username.clone_from(&request.username);
        args.remember_password = request.remember_password;
        args.validate = request.verify_only;
        args.qr = request.qr;

        let lease = self.slot.try_acquire()?;

        let context = request.context.clone().unwrap_or_else(|| {
            serde_json::to_value(&request.identity).unwrap_or(serde_json::Value::Null)
        });
        let options = SpawnOptions {
            cwd: self.config.working_dir.clone(),
            envs: self.config.envs.clone(),
        };
        let process = DepotProcess::new(
            self.config.executable.clone(),
            args.to_args(),
            options,
            &context,
        );
        let lines = process.subscribe().map_err(process_error)?;
        lease.attach(process.clone());
        self.phase.send_replace(DepotPhase::Starting);

        info!(
            version = %request.identity.version,
            manifest = %args.manifest,
            destination = %request.destination.display(),
            verify_only = request.verify_only,
            "Starting DepotDownloader"
        );

        let (sink, stream) = DownloadStream::channel();
        let interpreter = Interpreter::new(&request, context);
        tokio::spawn(drive(
            lines,
            process,
            interpreter,
            sink,
            lease,
            Arc::clone(&self.phase),
        ));
        Ok(stream)
    }

    /// Write one line (password or code) to the running downloader.
    pub async fn send_input(&self, text: &str) -> AcquireResult<()> {
        let process = self.slot.payload().ok_or(AcquireError::NotRunning)?;
        process.send_line(text).await.map_err(process_error)?;
        self.phase.send_if_modified(|phase| {
            if phase.awaits_input() {
                *phase = DepotPhase::Starting;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    /// Stop the running download. No-op when idle.
    pub fn stop(&self) {
        if let Some(process) = self.slot.payload() {
            process.kill();
        }
        self.slot.cancel();
    }

    pub fn phase(&self) -> DepotPhase {
        *self.phase.borrow()
    }

    /// Subscribe to phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<DepotPhase> {
        self.phase.subscribe()
    }

    pub fn is_downloading(&self) -> bool {
        self.slot.is_active()
    }
}

fn process_error(err: ProcessError) -> AcquireError {
    match err {
        ProcessError::ExecutableNotFound(path) => AcquireError::ExecutableNotFound {
            path: path.display().to_string(),
        },
        ProcessError::StdinClosed => AcquireError::NotRunning,
        other => AcquireError::process(other.to_string()),
    }
}

// ============================================================================
// Event loop
// ============================================================================

enum Outcome {
    Finished,
    /// Process exit, whatever the code, without a terminal event.
    Exited,
    Failed(AcquireError),
    Cancelled,
}

async fn drive(
    mut lines: LineSubscription,
    process: DepotProcess,
    mut interpreter: Interpreter,
    sink: StreamSink<DepotUpdate>,
    lease: SlotLease<DepotProcess>,
    phase: Arc<watch::Sender<DepotPhase>>,
) {
    let cancel = lease.cancel_token().clone();

    let outcome = loop {
        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => break Outcome::Cancelled,
            output = lines.next() => output,
        };

        match output {
            None => break Outcome::Exited,
            Some(ProcessOutput::Line(line)) => {
                let Some(event) = parse_line(&line) else {
                    continue;
                };
                match interpreter.interpret(event) {
                    Action::Ignore => {}
                    Action::Emit(update, next) => {
                        if let Some(next) = next {
                            phase.send_replace(next);
                        }
                        if !sink.emit(update).await {
                            debug!("Depot stream consumer went away");
                            break Outcome::Cancelled;
                        }
                    }
                    Action::Respond(text) => {
                        if let Err(e) = process.send_line(&text).await {
                            break Outcome::Failed(process_error(e));
                        }
                    }
                    Action::Finish => break Outcome::Finished,
                    Action::Fail(err) => break Outcome::Failed(err),
                }
            }
            Some(ProcessOutput::Failed(message)) => {
                break Outcome::Failed(AcquireError::process(message));
            }
            Some(ProcessOutput::Exited { code }) => {
                if code != Some(0) {
                    warn!(?code, "DepotDownloader exited without a completion or error event");
                }
                break Outcome::Exited;
            }
        }
    };

    process.kill();
    // Free the slot before the terminal item so a consumer can start the next
    // download as soon as it sees the end of this one.
    drop(lease);

    match outcome {
        Outcome::Finished => {
            phase.send_replace(DepotPhase::Finished);
            info!("DepotDownloader finished");
            if sink.emit(DepotUpdate::Finished).await {
                sink.succeed().await;
            }
        }
        Outcome::Exited => {
            phase.send_replace(DepotPhase::Finished);
            info!("DepotDownloader exited without a completion event");
            sink.succeed().await;
        }
        Outcome::Failed(err) => {
            phase.send_replace(DepotPhase::Failed);
            warn!(code = err.code(), error = %err, "DepotDownloader failed");
            sink.fail(err).await;
        }
        Outcome::Cancelled => {
            phase.send_replace(DepotPhase::Cancelled);
            info!("DepotDownloader stopped");
        }
    }
}

// ============================================================================
// Interpretation
// ============================================================================

#[derive(Debug, PartialEq)]
enum Action {
    Ignore,
    Emit(DepotUpdate, Option<DepotPhase>),
    /// Write a line to the process.
    Respond(String),
    Finish,
    Fail(AcquireError),
}

/// Per-download protocol state.
struct Interpreter {
    password: Option<String>,
    unattended: bool,
    context: serde_json::Value,
}

impl Interpreter {
    fn new(request: &DepotDownloadRequest, context: serde_json::Value) -> Self {
        Self {
            password: request.password.clone(),
            unattended: request.unattended,
            context,
        }
    }

    fn interpret(&mut self, event: DepotEvent) -> Action {
        let DepotEvent { kind, data } = event;
        if !matches!(
            kind,
            DepotEventKind::Info(InfoEvent::Progress | InfoEvent::Validated)
        ) {
            debug!(event = kind.subtype_token(), data = ?data, "DepotDownloader event");
        }

        match kind {
            DepotEventKind::Info(info) => self.interpret_info(info, data),
            DepotEventKind::Warning(kind) => Action::Emit(
                DepotUpdate::Warning {
                    kind,
                    message: data,
                },
                None,
            ),
            DepotEventKind::Error(kind) => Action::Fail(AcquireError::Depot {
                kind,
                message: data,
            }),
        }
    }

    fn interpret_info(&mut self, info: InfoEvent, data: Option<String>) -> Action {
        match info {
            InfoEvent::Start => {
                let context = data
                    .as_deref()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_else(|| self.context.clone());
                Action::Emit(DepotUpdate::Started { context }, Some(DepotPhase::Starting))
            }
            InfoEvent::Password => match self.password.take() {
                Some(password) => Action::Respond(password),
                None if self.unattended => Action::Fail(AcquireError::PasswordRequired),
                None => Action::Emit(
                    DepotUpdate::PasswordRequired,
                    Some(DepotPhase::AwaitingPassword),
                ),
            },
            InfoEvent::Guard => code_required(CodeKind::SteamGuard),
            InfoEvent::TwoFa => code_required(CodeKind::TwoFactor),
            InfoEvent::MobileApp => Action::Emit(
                DepotUpdate::MobileApprovalPending,
                Some(DepotPhase::AwaitingMobileApproval),
            ),
            InfoEvent::SteamId => Action::Emit(
                DepotUpdate::LoggedIn { steam_id: data },
                Some(DepotPhase::Downloading),
            ),
            InfoEvent::QrCode => match data {
                Some(challenge_url) => Action::Emit(
                    DepotUpdate::QrCode { challenge_url },
                    Some(DepotPhase::AwaitingMobileApproval),
                ),
                None => Action::Ignore,
            },
            InfoEvent::Progress | InfoEvent::Validated => {
                let Some(percent) = data.as_deref().and_then(parse_percent) else {
                    debug!(payload = ?data, "Unparsable progress payload");
                    return Action::Ignore;
                };
                if info == InfoEvent::Validated && percent >= 100.0 {
                    Action::Finish
                } else {
                    Action::Emit(
                        DepotUpdate::Progress {
                            percent: percent.clamp(0.0, 100.0),
                        },
                        Some(DepotPhase::Downloading),
                    )
                }
            }
            InfoEvent::Finished => Action::Finish,
        }
    }
}

const fn code_required(kind: CodeKind) -> Action {
    Action::Emit(
        DepotUpdate::CodeRequired { kind },
        Some(DepotPhase::AwaitingCode),
    )
}

// ============================================================================
// Tests
// ============================================================================
