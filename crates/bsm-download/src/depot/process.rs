//! Shared, replayable stdout line stream of one downloader process.
//!
//! The process is spawned lazily by the first [`DepotProcess::subscribe`] call
//! and shared by every later subscriber. A late subscriber first receives the
//! most recent output item (replay of size one), then everything after it.
//! The first item is always a synthetic `[Info]|[Start]|<context>` line so a
//! consumer can tell which invocation a stream belongs to.
//!
//! The process is killed when the last subscription is dropped or when
//! [`DepotProcess::kill`] is called. Killing is idempotent.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

// ============================================================================
// Constants
// ============================================================================

/// Buffered items per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// Types
// ============================================================================

/// Errors raised by the process wrapper itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Failed to spawn: {0}")]
    Spawn(String),

    #[error("Process stdin is not writable")]
    StdinClosed,

    #[error("Failed to write to stdin: {0}")]
    Write(String),
}

/// One item of the line stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutput {
    /// A stdout line, without its line terminator.
    Line(String),
    /// stderr output or a read failure. Terminal.
    Failed(String),
    /// The process ended. `code` is `None` when it was killed. Terminal.
    Exited { code: Option<i32> },
}

impl ProcessOutput {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Exited { .. })
    }
}

/// Working directory and extra environment for the spawned process.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

struct Hub {
    last: Option<ProcessOutput>,
    tx: broadcast::Sender<ProcessOutput>,
}

struct Shared {
    program: PathBuf,
    args: Vec<String>,
    options: SpawnOptions,
    start_line: String,
    started: AtomicBool,
    running: AtomicBool,
    subscribers: AtomicUsize,
    hub: Mutex<Hub>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    kill: CancellationToken,
}

impl Shared {
    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `output` as the replay item and fan it out.
    ///
    /// Nothing is published after a terminal item.
    fn publish(&self, output: ProcessOutput) {
        let mut hub = self.hub();
        if hub.last.as_ref().is_some_and(ProcessOutput::is_terminal) {
            return;
        }
        hub.last = Some(output.clone());
        // No receivers is fine; the replay slot still holds the item.
        let _ = hub.tx.send(output);
    }
}

// ============================================================================
// DepotProcess
// ============================================================================

/// Handle to one (possibly not yet spawned) downloader process.
///
/// Cloning is cheap; clones share the same process.
#[derive(Clone)]
pub struct DepotProcess {
    shared: Arc<Shared>,
}

impl DepotProcess {
    /// Describe a process without spawning it.
    ///
    /// `context` is echoed in the synthetic start line.
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        options: SpawnOptions,
        context: &serde_json::Value,
    ) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                program: program.into(),
                args,
                options,
                start_line: format!("[Info]|[Start]|{context}"),
                started: AtomicBool::new(false),
                running: AtomicBool::new(false),
                subscribers: AtomicUsize::new(0),
                hub: Mutex::new(Hub { last: None, tx }),
                stdin: tokio::sync::Mutex::new(None),
                kill: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe to the line stream, spawning the process on first call.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self) -> Result<LineSubscription, ProcessError> {
        let (replay, rx) = {
            let hub = self.shared.hub();
            (hub.last.clone(), hub.tx.subscribe())
        };
        self.shared.subscribers.fetch_add(1, Ordering::SeqCst);
        let subscription = LineSubscription {
            replay,
            rx,
            shared: Arc::clone(&self.shared),
            finished: false,
        };

        if !self.shared.started.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.spawn() {
                self.shared.publish(ProcessOutput::Failed(e.to_string()));
                return Err(e);
            }
        }

        Ok(subscription)
    }

    /// Write `text` followed by a newline to the process's stdin.
    ///
    /// Fails with [`ProcessError::StdinClosed`] when the process is not running.
    pub async fn send_line(&self, text: &str) -> Result<(), ProcessError> {
        if !self.is_running() {
            return Err(ProcessError::StdinClosed);
        }
        let mut guard = self.shared.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(ProcessError::StdinClosed)?;

        let mut payload = String::with_capacity(text.len() + 1);
        payload.push_str(text);
        payload.push('\n');
        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| ProcessError::Write(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| ProcessError::Write(e.to_string()))
    }

    /// Kill the process. Safe to call repeatedly or before it was spawned.
    pub fn kill(&self) {
        self.shared.kill.cancel();
    }

    /// Whether the process has been spawned and has not exited yet.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether any subscriber ever triggered the spawn.
    pub fn has_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    fn spawn(&self) -> Result<(), ProcessError> {
        let shared = &self.shared;
        if names_a_path(&shared.program) && !shared.program.is_file() {
            return Err(ProcessError::ExecutableNotFound(shared.program.clone()));
        }

        let mut cmd = Command::new(&shared.program);
        cmd.args(&shared.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &shared.options.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &shared.options.envs {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::ExecutableNotFound(shared.program.clone())
            } else {
                ProcessError::Spawn(e.to_string())
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::Spawn("Missing stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProcessError::Spawn("Missing stderr".to_string()))?;
        match shared.stdin.try_lock() {
            Ok(mut slot) => *slot = child.stdin.take(),
            Err(_) => warn!("stdin slot busy at spawn; input will be rejected"),
        }

        debug!(
            program = %shared.program.display(),
            pid = child.id(),
            "Spawned downloader process"
        );
        shared.running.store(true, Ordering::SeqCst);
        shared.publish(ProcessOutput::Line(shared.start_line.clone()));

        tokio::spawn(pump(Arc::clone(shared), child, stdout, stderr));
        Ok(())
    }
}

/// A bare program name is resolved through `PATH` at spawn time instead.
fn names_a_path(program: &Path) -> bool {
    program.is_absolute() || program.components().count() > 1
}

// ============================================================================
// Output pump
// ============================================================================

async fn pump(shared: Arc<Shared>, mut child: Child, stdout: ChildStdout, stderr: ChildStderr) {
    let mut out = BufReader::new(stdout);
    let mut err = BufReader::new(stderr);
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut stderr_open = true;

    // `read_until` keeps partial data in the buffer when another branch wins,
    // so the buffers live outside the loop.
    let failure = loop {
        tokio::select! {
            () = shared.kill.cancelled() => break None,

            read = out.read_until(b'\n', &mut out_buf) => match read {
                Ok(0) => {
                    // Stderr written right before exit may still be unread.
                    if stderr_open
                        && let Some(failed) = drain_stderr(&shared, &mut err, &mut err_buf).await
                    {
                        break Some(failed);
                    }
                    break wait_for_exit(&shared, &mut child).await;
                }
                Ok(_) => {
                    let line = take_line(&mut out_buf);
                    if is_progress_chatter(&line) {
                        trace!(line = %line, "downloader stdout");
                    } else {
                        debug!(line = %line, "downloader stdout");
                    }
                    shared.publish(ProcessOutput::Line(line));
                }
                Err(e) => break Some(ProcessOutput::Failed(format!("Failed to read stdout: {e}"))),
            },

            read = err.read_until(b'\n', &mut err_buf), if stderr_open => match read {
                Ok(0) => stderr_open = false,
                Ok(_) => {
                    if let Some(failed) = stderr_failure(&mut err_buf) {
                        break Some(failed);
                    }
                }
                Err(e) => break Some(ProcessOutput::Failed(format!("Failed to read stderr: {e}"))),
            },
        }
    };

    let last = match failure {
        Some(exited @ ProcessOutput::Exited { .. }) => exited,
        Some(output) => {
            let _ = child.kill().await;
            output
        }
        None => {
            let _ = child.kill().await;
            debug!("Downloader process killed");
            ProcessOutput::Exited { code: None }
        }
    };

    // Subscribers seeing the terminal item must also see a closed stdin.
    shared.running.store(false, Ordering::SeqCst);
    shared.stdin.lock().await.take();
    shared.publish(last);
}

/// Read stderr to EOF after stdout closed. Any non-blank line fails the run.
async fn drain_stderr(
    shared: &Shared,
    err: &mut BufReader<ChildStderr>,
    buf: &mut Vec<u8>,
) -> Option<ProcessOutput> {
    loop {
        let read = tokio::select! {
            () = shared.kill.cancelled() => return None,
            read = err.read_until(b'\n', buf) => read,
        };
        match read {
            Ok(0) => return None,
            Ok(_) => {
                if let Some(failed) = stderr_failure(buf) {
                    return Some(failed);
                }
            }
            Err(e) => return Some(ProcessOutput::Failed(format!("Failed to read stderr: {e}"))),
        }
    }
}

fn stderr_failure(buf: &mut Vec<u8>) -> Option<ProcessOutput> {
    let line = take_line(buf);
    if line.trim().is_empty() {
        return None;
    }
    warn!(line = %line, "downloader wrote to stderr");
    Some(ProcessOutput::Failed(line))
}

async fn wait_for_exit(shared: &Shared, child: &mut Child) -> Option<ProcessOutput> {
    tokio::select! {
        () = shared.kill.cancelled() => None,
        status = child.wait() => Some(match status {
            Ok(status) => {
                debug!(code = ?status.code(), "Downloader process exited");
                ProcessOutput::Exited { code: status.code() }
            }
            Err(e) => ProcessOutput::Failed(format!("Failed to wait for process: {e}")),
        }),
    }
}

fn is_progress_chatter(line: &str) -> bool {
    line.contains("[Progress]") || line.contains("[Validated]")
}

fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    buf.clear();
    line
}

// ============================================================================
// Subscription
// ============================================================================

/// One observer of a [`DepotProcess`] line stream.
///
/// Dropping the last subscription kills the process.
pub struct LineSubscription {
    replay: Option<ProcessOutput>,
    rx: broadcast::Receiver<ProcessOutput>,
    shared: Arc<Shared>,
    finished: bool,
}

impl LineSubscription {
    /// Next output item; `None` once a terminal item has been returned.
    pub async fn next(&mut self) -> Option<ProcessOutput> {
        if self.finished {
            return None;
        }

        let output = match self.replay.take() {
            Some(output) => output,
            None => loop {
                match self.rx.recv().await {
                    Ok(output) => break output,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Line subscriber lagged; dropping output");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        self.finished = true;
                        return None;
                    }
                }
            },
        };

        if output.is_terminal() {
            self.finished = true;
        }
        Some(output)
    }
}

impl Drop for LineSubscription {
    fn drop(&mut self) {
        if self.shared.subscribers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.kill.cancel();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn shell(script: &str) -> DepotProcess {
        DepotProcess::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            SpawnOptions::default(),
            &serde_json::json!({ "version": "1.29.1" }),
        )
    }

    async fn collect(sub: &mut LineSubscription) -> Vec<ProcessOutput> {
        let mut out = Vec::new();
        while let Some(item) = tokio::time::timeout(Duration::from_secs(10), sub.next())
            .await
            .expect("stream stalled")
        {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn emits_start_line_then_stdout_then_exit() {
        let process = shell("echo '[Info]|[Progress]|10'; echo done");
        let mut sub = process.subscribe().unwrap();
        let items = collect(&mut sub).await;

        assert_eq!(
            items,
            vec![
                ProcessOutput::Line(r#"[Info]|[Start]|{"version":"1.29.1"}"#.to_string()),
                ProcessOutput::Line("[Info]|[Progress]|10".to_string()),
                ProcessOutput::Line("done".to_string()),
                ProcessOutput::Exited { code: Some(0) },
            ]
        );
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn does_not_spawn_until_subscribed() {
        let process = shell("echo hi");
        assert!(!process.has_started());
        let _sub = process.subscribe().unwrap();
        assert!(process.has_started());
    }

    #[tokio::test]
    async fn late_subscriber_gets_last_item_replayed() {
        let process = shell("echo one; echo two; read _");
        let mut first = process.subscribe().unwrap();
        // start, one, two
        for _ in 0..3 {
            first.next().await.unwrap();
        }

        let mut late = process.subscribe().unwrap();
        assert_eq!(late.next().await, Some(ProcessOutput::Line("two".to_string())));

        process.send_line("").await.unwrap();
        assert_eq!(late.next().await, Some(ProcessOutput::Exited { code: Some(0) }));
        assert_eq!(late.next().await, None);
    }

    #[tokio::test]
    async fn writes_lines_to_stdin() {
        let process = shell("read secret; echo got:$secret");
        let mut sub = process.subscribe().unwrap();
        sub.next().await.unwrap(); // start line

        process.send_line("hunter2").await.unwrap();
        assert_eq!(
            sub.next().await,
            Some(ProcessOutput::Line("got:hunter2".to_string()))
        );
    }

    #[tokio::test]
    async fn stdin_rejected_when_not_running() {
        let process = shell("true");
        assert_eq!(
            process.send_line("x").await,
            Err(ProcessError::StdinClosed)
        );

        let mut sub = process.subscribe().unwrap();
        collect(&mut sub).await;
        assert_eq!(
            process.send_line("x").await,
            Err(ProcessError::StdinClosed)
        );
    }

    #[tokio::test]
    async fn stderr_output_fails_the_stream() {
        let process = shell("echo boom >&2; sleep 5");
        let mut sub = process.subscribe().unwrap();
        let items = collect(&mut sub).await;
        assert_eq!(items.last(), Some(&ProcessOutput::Failed("boom".to_string())));
    }

    #[tokio::test]
    async fn stderr_before_clean_exit_still_fails() {
        for _ in 0..25 {
            let process = shell("echo boom >&2");
            let mut sub = process.subscribe().unwrap();
            let items = collect(&mut sub).await;
            assert_eq!(items.last(), Some(&ProcessOutput::Failed("boom".to_string())));
        }
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let process = shell("exit 3");
        let mut sub = process.subscribe().unwrap();
        let items = collect(&mut sub).await;
        assert_eq!(items.last(), Some(&ProcessOutput::Exited { code: Some(3) }));
    }

    #[tokio::test]
    async fn missing_executable() {
        let process = DepotProcess::new(
            "/nonexistent/DepotDownloader",
            Vec::new(),
            SpawnOptions::default(),
            &serde_json::Value::Null,
        );
        let err = process.subscribe().err().unwrap();
        assert!(matches!(err, ProcessError::ExecutableNotFound(_)));
    }

    #[tokio::test]
    async fn kill_is_idempotent_and_ends_stream() {
        let process = shell("sleep 30");
        let mut sub = process.subscribe().unwrap();
        sub.next().await.unwrap();

        process.kill();
        process.kill();
        let items = collect(&mut sub).await;
        assert_eq!(items, vec![ProcessOutput::Exited { code: None }]);
    }

    #[tokio::test]
    async fn dropping_last_subscriber_kills_process() {
        let process = shell("sleep 30");
        let sub = process.subscribe().unwrap();
        assert!(process.is_running());
        drop(sub);

        tokio::time::timeout(Duration::from_secs(5), async {
            while process.is_running() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("process was not killed");
    }
}
