//! Integration tests for the OS-backed launcher.

use tokio::io::AsyncReadExt;
use tokio_test::{assert_err, assert_ok};

use devloop::process::{
    CommandSpec, ExitReason, GroupLauncher, Launched, OutputStream, ProcessLauncher, SpawnError,
};

async fn read_all(stream: Option<OutputStream>) -> String {
    let mut out = String::new();
    if let Some(mut stream) = stream {
        stream.read_to_string(&mut out).await.unwrap();
    }
    out
}

async fn run(spec: &CommandSpec) -> (ExitReason, String, String) {
    let Launched {
        handle,
        stdout,
        stderr,
    } = assert_ok!(GroupLauncher.launch(spec));
    let (out, err) = tokio::join!(read_all(stdout), read_all(stderr));
    (handle.wait().await, out, err)
}

#[tokio::test]
async fn shell_mode_escapes_extra_args() {
    let spec = assert_ok!(CommandSpec::from_shell_line(
        "printf '%s|'",
        &["hello world".to_string(), "$HOME".to_string()],
    ));
    let (reason, out, _) = run(&spec).await;

    assert_eq!(reason, ExitReason::Success);
    assert_eq!(out, "hello world|$HOME|");
}

#[tokio::test]
async fn env_and_working_dir_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    let spec = CommandSpec::new("sh")
        .args(["-c", "echo \"$DEVLOOP_ROLE\"; pwd"])
        .env("DEVLOOP_ROLE", "frontend")
        .working_dir(dir.path());
    let (reason, out, _) = run(&spec).await;

    assert_eq!(reason, ExitReason::Success);
    let mut lines = out.lines();
    assert_eq!(lines.next(), Some("frontend"));
    let cwd = std::path::PathBuf::from(lines.next().unwrap());
    assert_eq!(
        cwd.canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}

#[tokio::test]
async fn stdout_and_stderr_are_separate() {
    let spec = CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 4"]);
    let (reason, out, err) = run(&spec).await;

    assert_eq!(reason, ExitReason::Code(4));
    assert_eq!(out, "out\n");
    assert_eq!(err, "err\n");
}

#[tokio::test]
async fn missing_program_is_not_found() {
    let spec = CommandSpec::new("devloop-definitely-missing-binary");
    let err = assert_err!(GroupLauncher.launch(&spec));
    assert!(matches!(err, SpawnError::NotFound(_)));
}
