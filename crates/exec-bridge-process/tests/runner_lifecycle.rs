//! Lifecycle tests against real child processes.
#![cfg(unix)]

use std::time::Duration;

use exec_bridge_core::{CommandSpec, Error, StreamKind};
use exec_bridge_process::{ProcessOutput, ProcessRunner};

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("/bin/sh").arg("-c").arg(script)
}

/// Drain the output sequence, returning (stdout, stderr).
async fn drain(output: &mut ProcessOutput) -> (Vec<u8>, Vec<u8>) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let collect = async {
        while let Some(chunk) = output.next_chunk().await {
            match chunk.stream {
                StreamKind::Stdout => stdout.extend_from_slice(&chunk.data),
                StreamKind::Stderr => stderr.extend_from_slice(&chunk.data),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("output did not end");
    (stdout, stderr)
}

/// Read until `needle` shows up on stdout.
async fn read_until(output: &mut ProcessOutput, needle: &str) -> String {
    let mut seen = String::new();
    let search = async {
        while let Some(chunk) = output.next_chunk().await {
            seen.push_str(&String::from_utf8_lossy(&chunk.data));
            if seen.contains(needle) {
                return;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), search)
        .await
        .expect("expected output never arrived");
    seen
}

#[tokio::test]
async fn test_spawn_missing_executable() {
    let result = ProcessRunner::spawn(&CommandSpec::new("/definitely/not/here/tool"));
    assert!(matches!(result, Err(Error::Spawn { .. })));
}

#[tokio::test]
async fn test_output_and_exit_code() {
    let (runner, mut output) = ProcessRunner::spawn(&sh("echo out; echo err >&2; exit 3")).unwrap();
    assert!(runner.pid().is_some());

    let (stdout, stderr) = drain(&mut output).await;
    assert_eq!(stdout, b"out\n");
    assert_eq!(stderr, b"err\n");

    let outcome = runner.wait().await;
    assert_eq!(outcome.code(), Some(3));
    assert!(!runner.is_running());
}

#[tokio::test]
async fn test_stdout_order_preserved() {
    let (runner, mut output) = ProcessRunner::spawn(&sh("printf A; printf B; printf C")).unwrap();
    let (stdout, _) = drain(&mut output).await;
    assert_eq!(stdout, b"ABC");
    assert!(runner.wait().await.success());
}

#[tokio::test]
async fn test_control_sequences_pass_through() {
    let (runner, mut output) =
        ProcessRunner::spawn(&sh(r"printf '\033[32mgreen\033[0m\r\n'")).unwrap();
    let (stdout, _) = drain(&mut output).await;
    assert_eq!(stdout, b"\x1b[32mgreen\x1b[0m\r\n");
    runner.wait().await;
}

#[tokio::test]
async fn test_working_dir_and_env() {
    let spec = sh("pwd; echo $BRIDGE_TEST_VAR")
        .working_dir("/")
        .env("BRIDGE_TEST_VAR", "hello");
    let (runner, mut output) = ProcessRunner::spawn(&spec).unwrap();
    let (stdout, _) = drain(&mut output).await;
    assert_eq!(String::from_utf8_lossy(&stdout), "/\nhello\n");
    runner.wait().await;
}

#[tokio::test]
async fn test_write_input_uppercase() {
    let (runner, mut output) =
        ProcessRunner::spawn(&sh("read line; echo \"$line\" | tr a-z A-Z")).unwrap();

    runner.write_input(b"hello\n").await.unwrap();

    let (stdout, _) = drain(&mut output).await;
    assert_eq!(stdout, b"HELLO\n");
    assert!(runner.wait().await.success());
}

#[tokio::test]
async fn test_inputs_arrive_in_order() {
    let (runner, mut output) = ProcessRunner::spawn(&CommandSpec::new("cat")).unwrap();

    for line in ["one\n", "two\n", "three\n"] {
        runner.write_input(line.as_bytes()).await.unwrap();
    }
    runner.close_input().await;

    let (stdout, _) = drain(&mut output).await;
    assert_eq!(stdout, b"one\ntwo\nthree\n");
    assert!(runner.wait().await.success());
}

#[tokio::test]
async fn test_empty_line_input() {
    let (runner, mut output) = ProcessRunner::spawn(&sh("read answer; echo \"got[$answer]\"")).unwrap();
    runner.write_input(b"\n").await.unwrap();

    let (stdout, _) = drain(&mut output).await;
    assert_eq!(stdout, b"got[]\n");
    runner.wait().await;
}

#[tokio::test]
async fn test_write_after_exit_is_not_running() {
    let (runner, mut output) = ProcessRunner::spawn(&sh("exit 0")).unwrap();
    drain(&mut output).await;
    runner.wait().await;

    let result = runner.write_input(b"late\n").await;
    assert!(matches!(result, Err(Error::NotRunning)));
}

#[tokio::test]
async fn test_write_after_close_input_is_not_running() {
    let (runner, _output) = ProcessRunner::spawn(&CommandSpec::new("sleep").arg("5")).unwrap();
    runner.close_input().await;

    let result = runner.write_input(b"x").await;
    assert!(matches!(result, Err(Error::NotRunning)));

    runner.terminate(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_terminate_running_process() {
    let (runner, mut output) = ProcessRunner::spawn(&CommandSpec::new("sleep").arg("30")).unwrap();
    assert!(runner.is_running());

    let outcome = runner.terminate(Duration::from_secs(2)).await;
    assert_eq!(outcome.signal(), Some(15)); // SIGTERM
    assert!(!runner.is_running());

    // Output ends once the pipes close
    drain(&mut output).await;
}

#[tokio::test]
async fn test_terminate_is_idempotent() {
    let (runner, _output) = ProcessRunner::spawn(&CommandSpec::new("sleep").arg("30")).unwrap();

    let first = runner.terminate(Duration::from_secs(2)).await;
    let second = runner.terminate(Duration::from_secs(2)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_concurrent_terminate_calls() {
    let (runner, _output) = ProcessRunner::spawn(&CommandSpec::new("sleep").arg("30")).unwrap();

    let (a, b) = tokio::join!(
        runner.terminate(Duration::from_secs(2)),
        runner.terminate(Duration::from_secs(2))
    );
    assert_eq!(a, b);
    assert!(!runner.is_running());
}

#[tokio::test]
async fn test_terminate_after_natural_exit_is_noop() {
    let (runner, mut output) = ProcessRunner::spawn(&sh("exit 7")).unwrap();
    drain(&mut output).await;
    runner.wait().await;

    let outcome = runner.terminate(Duration::from_millis(100)).await;
    assert_eq!(outcome.code(), Some(7));
}

#[tokio::test]
async fn test_terminate_escalates_to_kill() {
    let (runner, mut output) =
        ProcessRunner::spawn(&sh("trap '' TERM; echo ready; sleep 30")).unwrap();
    read_until(&mut output, "ready").await;

    let started = std::time::Instant::now();
    let outcome = runner.terminate(Duration::from_millis(300)).await;

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(!runner.is_running());
    assert_ne!(outcome.code(), Some(0));
}

#[tokio::test]
async fn test_terminate_reaches_grandchildren() {
    let (runner, mut output) = ProcessRunner::spawn(&sh("sleep 30 & echo started; wait")).unwrap();
    read_until(&mut output, "started").await;

    runner.terminate(Duration::from_secs(2)).await;

    // The backgrounded sleep held the pipes too; they only close if it died as well
    drain(&mut output).await;
}
