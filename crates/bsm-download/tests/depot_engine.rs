//! End-to-end Steam engine runs against a scripted fake `DepotDownloader`.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use bsm_core::depot::{DepotUpdate, ErrorEvent};
use bsm_core::{AcquireError, BuildIdentity};
use bsm_download::depot::{DepotConfig, DepotDownloadRequest, DepotEngine, DepotEventStream, DepotPhase};
use bsm_download::StreamEnd;
use serde_json::json;
use tempfile::{TempDir, tempdir};

const MANIFEST_ID: &str = "4400000000000000000";

const PASSWORD_SCRIPT: &str = r#"
echo "Connecting to Steam3..."
echo "[Info]|[Password]"
read pw
if [ "$pw" != "hunter2" ]; then
  echo "[Error]|[InvalidCredentials]|wrong password"
  exit 1
fi
echo "[Info]|[SteamID]|76561198000000000"
echo "[Info]|[Progress]|10,0"
echo "[Info]|[Finished]|"
sleep 5
"#;

/// A temp dir holding an executable `DepotDownloader` running `body`.
fn fake_downloader(body: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("DepotDownloader");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    (dir, path)
}

fn engine_for(executable: &Path) -> DepotEngine {
    DepotEngine::new(DepotConfig::new().with_executable(executable))
}

fn request(dest: &Path) -> DepotDownloadRequest {
    DepotDownloadRequest::new(
        BuildIdentity::new("1.29.1").with_manifest_id(MANIFEST_ID),
        dest,
    )
    .with_context(json!({ "version": "1.29.1" }))
}

async fn drain(mut stream: DepotEventStream) -> (Vec<DepotUpdate>, Option<AcquireError>, Option<StreamEnd>) {
    let mut updates = Vec::new();
    let mut error = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(update) => updates.push(update),
            Err(err) => error = Some(err),
        }
    }
    (updates, error, stream.end())
}

#[tokio::test]
async fn password_prompt_is_answered_with_send_input() {
    let (dir, exe) = fake_downloader(PASSWORD_SCRIPT);
    let engine = engine_for(&exe);

    let mut stream = engine.download(request(dir.path())).unwrap();
    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        DepotUpdate::Started {
            context: json!({ "version": "1.29.1" })
        }
    );
    assert_eq!(stream.next().await.unwrap().unwrap(), DepotUpdate::PasswordRequired);
    assert_eq!(engine.phase(), DepotPhase::AwaitingPassword);

    engine.send_input("hunter2").await.unwrap();

    let (updates, error, end) = drain(stream).await;
    assert!(error.is_none(), "{error:?}");
    assert_eq!(
        updates,
        vec![
            DepotUpdate::LoggedIn {
                steam_id: Some("76561198000000000".into())
            },
            DepotUpdate::Progress { percent: 10.0 },
            DepotUpdate::Finished,
        ]
    );
    assert_eq!(end, Some(StreamEnd::Succeeded));
    assert_eq!(engine.phase(), DepotPhase::Finished);
    assert!(!engine.is_downloading());
}

#[tokio::test]
async fn supplied_password_answers_the_first_prompt() {
    let (dir, exe) = fake_downloader(PASSWORD_SCRIPT);
    let engine = engine_for(&exe);

    let stream = engine
        .download(request(dir.path()).with_credentials("player", Some("hunter2".into())))
        .unwrap();
    let (updates, error, end) = drain(stream).await;

    assert!(error.is_none(), "{error:?}");
    assert!(!updates.contains(&DepotUpdate::PasswordRequired));
    assert_eq!(updates.last(), Some(&DepotUpdate::Finished));
    assert_eq!(end, Some(StreamEnd::Succeeded));
}

#[tokio::test]
async fn wrong_password_surfaces_the_error_token() {
    let (dir, exe) = fake_downloader(PASSWORD_SCRIPT);
    let engine = engine_for(&exe);

    let stream = engine
        .download(request(dir.path()).with_credentials("player", Some("letmein".into())))
        .unwrap();
    let (_, error, end) = drain(stream).await;

    let error = error.unwrap();
    assert_eq!(
        error,
        AcquireError::Depot {
            kind: ErrorEvent::InvalidCredentials,
            message: Some("wrong password".into())
        }
    );
    assert_eq!(error.code(), "InvalidCredentials");
    assert_eq!(end, Some(StreamEnd::Failed));
    assert_eq!(engine.phase(), DepotPhase::Failed);
}

#[tokio::test]
async fn unattended_prompt_fails_instead_of_waiting() {
    let (dir, exe) = fake_downloader(PASSWORD_SCRIPT);
    let engine = engine_for(&exe);

    let stream = engine.download(request(dir.path()).unattended(true)).unwrap();
    let (updates, error, _) = drain(stream).await;

    assert_eq!(error, Some(AcquireError::PasswordRequired));
    assert!(!updates.contains(&DepotUpdate::PasswordRequired));
}

#[tokio::test]
async fn arguments_describe_the_build_without_the_password() {
    let (dir, exe) = fake_downloader(
        r#"printf '%s\n' "$@" > "$ARGS_OUT"
echo "[Info]|[Finished]|""#,
    );
    let args_out = dir.path().join("args.txt");
    let engine = DepotEngine::new(
        DepotConfig::new()
            .with_executable(&exe)
            .with_env("ARGS_OUT", args_out.to_string_lossy()),
    );
    let dest = dir.path().join("Beat Saber 1.29.1");

    let stream = engine
        .download(
            request(&dest)
                .with_credentials("player", Some("hunter2".into()))
                .remember_password(true)
                .verify_only(true),
        )
        .unwrap();
    let (_, error, end) = drain(stream).await;
    assert!(error.is_none(), "{error:?}");
    assert_eq!(end, Some(StreamEnd::Succeeded));

    let recorded = std::fs::read_to_string(&args_out).unwrap();
    let args: Vec<&str> = recorded.lines().collect();
    let dest = dest.to_string_lossy();
    assert_eq!(
        args,
        vec![
            "-app",
            "620980",
            "-depot",
            "620981",
            "-manifest",
            MANIFEST_ID,
            "-username",
            "player",
            "-remember-password",
            "-dir",
            dest.as_ref(),
            "-validate",
        ]
    );
    assert!(!recorded.contains("hunter2"));
}

#[tokio::test]
async fn validated_to_completion_finishes() {
    let (dir, exe) = fake_downloader(
        r#"echo "[Info]|[Validated]|42,5"
echo "[Info]|[Validated]|100"
sleep 5"#,
    );
    let engine = engine_for(&exe);

    let (updates, error, end) = drain(engine.download(request(dir.path())).unwrap()).await;

    assert!(error.is_none());
    assert_eq!(
        &updates[1..],
        &[DepotUpdate::Progress { percent: 42.5 }, DepotUpdate::Finished]
    );
    assert_eq!(end, Some(StreamEnd::Succeeded));
}

#[tokio::test]
async fn warnings_do_not_end_the_stream() {
    let (dir, exe) = fake_downloader(
        r#"echo "[Warning]|[ManifestChecksum]|checksum mismatch"
echo "[Info]|[Finished]|""#,
    );
    let engine = engine_for(&exe);

    let (updates, error, end) = drain(engine.download(request(dir.path())).unwrap()).await;

    assert!(error.is_none());
    assert!(matches!(updates[1], DepotUpdate::Warning { .. }));
    assert_eq!(updates.last(), Some(&DepotUpdate::Finished));
    assert_eq!(end, Some(StreamEnd::Succeeded));
}

#[tokio::test]
async fn non_zero_exit_without_error_event_completes() {
    let (dir, exe) = fake_downloader(r#"echo "[Info]|[Progress]|5,0"
exit 3"#);
    let engine = engine_for(&exe);

    let (updates, error, end) = drain(engine.download(request(dir.path())).unwrap()).await;

    assert_eq!(updates.last(), Some(&DepotUpdate::Progress { percent: 5.0 }));
    assert!(error.is_none());
    assert_eq!(end, Some(StreamEnd::Succeeded));
}

#[tokio::test]
async fn clean_exit_without_finish_succeeds() {
    let (dir, exe) = fake_downloader(r#"echo "[Info]|[Progress]|100""#);
    let engine = engine_for(&exe);

    let (updates, error, end) = drain(engine.download(request(dir.path())).unwrap()).await;

    assert!(error.is_none());
    assert!(!updates.contains(&DepotUpdate::Finished));
    assert_eq!(end, Some(StreamEnd::Succeeded));
}

#[tokio::test]
async fn stderr_output_fails_the_download() {
    let (dir, exe) = fake_downloader("echo 'Unhandled exception' >&2\nsleep 5");
    let engine = engine_for(&exe);

    let (_, error, end) = drain(engine.download(request(dir.path())).unwrap()).await;

    assert_eq!(error.unwrap().code(), "PROCESS_FAILED");
    assert_eq!(end, Some(StreamEnd::Failed));
}

#[tokio::test]
async fn stderr_right_before_clean_exit_fails_the_download() {
    let (dir, exe) = fake_downloader("echo 'Unhandled exception' >&2\nexit 0");
    let engine = engine_for(&exe);

    for _ in 0..10 {
        let (_, error, end) = drain(engine.download(request(dir.path())).unwrap()).await;
        assert_eq!(error.unwrap().code(), "PROCESS_FAILED");
        assert_eq!(end, Some(StreamEnd::Failed));
    }
}

#[tokio::test]
async fn stop_while_awaiting_password_cancels() {
    let (dir, exe) = fake_downloader(PASSWORD_SCRIPT);
    let engine = engine_for(&exe);

    let mut stream = engine.download(request(dir.path())).unwrap();
    while let Some(item) = stream.next().await {
        if item.unwrap() == DepotUpdate::PasswordRequired {
            break;
        }
    }
    engine.stop();

    let (_, error, end) = drain(stream).await;
    assert!(error.is_none());
    assert_eq!(end, Some(StreamEnd::Cancelled));
    assert_eq!(engine.phase(), DepotPhase::Cancelled);
    assert!(!engine.is_downloading());
    assert_eq!(engine.send_input("hunter2").await, Err(AcquireError::NotRunning));
}

#[tokio::test]
async fn second_download_is_rejected_while_running() {
    let (dir, exe) = fake_downloader(PASSWORD_SCRIPT);
    let engine = engine_for(&exe);

    let stream = engine.download(request(dir.path())).unwrap();
    assert!(engine.is_downloading());
    assert_eq!(
        engine.download(request(dir.path())).err(),
        Some(AcquireError::AlreadyDownloading)
    );

    engine.stop();
    drain(stream).await;
    assert!(!engine.is_downloading());
}

#[tokio::test]
async fn missing_executable_is_reported_up_front() {
    let dir = tempdir().unwrap();
    let engine = engine_for(&dir.path().join("DepotDownloader"));

    let err = engine.download(request(dir.path())).err().unwrap();
    assert_eq!(err.code(), "EXE_NOT_FOUND");
    assert!(!engine.is_downloading());
}

#[tokio::test]
async fn manifest_id_is_required() {
    let (dir, exe) = fake_downloader("exit 0");
    let engine = engine_for(&exe);

    let request = DepotDownloadRequest::new(BuildIdentity::new("1.29.1"), dir.path());
    assert_eq!(
        engine.download(request).err(),
        Some(AcquireError::MissingIdentifier {
            field: "manifest_id".into()
        })
    );
}

#[tokio::test]
async fn send_input_when_idle_is_rejected() {
    let (_dir, exe) = fake_downloader("exit 0");
    let engine = engine_for(&exe);
    assert_eq!(engine.send_input("code").await, Err(AcquireError::NotRunning));
}
