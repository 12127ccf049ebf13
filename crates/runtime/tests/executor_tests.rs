//! Process supervision against real child processes.

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use envelope_runtime::cli_executor::{
    CliExecutor, CliExecutorConfig, Invocation, ProcessRunner, RetryPolicy, RetryWrapper,
};
use envelope_runtime::{ProcessError, TimeoutStage};

fn sh(script: &str) -> Invocation {
    Invocation::new("sh", vec!["-c".to_string(), script.to_string()]).with_cwd("/tmp")
}

fn fast_executor() -> CliExecutor {
    CliExecutor::new(CliExecutorConfig {
        kill_grace: Duration::from_millis(300),
    })
}

#[tokio::test]
async fn test_clean_exit_captures_both_streams() {
    let output = CliExecutor::default()
        .run(&sh("echo out; echo err >&2"))
        .await
        .unwrap();
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
}

#[tokio::test]
async fn test_non_zero_exit_carries_stderr() {
    let err = CliExecutor::default()
        .run(&sh("echo 'bad flag --nope' >&2; exit 3"))
        .await
        .unwrap_err();
    match err {
        ProcessError::NonZeroExit {
            code,
            signal,
            diagnostics,
        } => {
            assert_eq!(code, Some(3));
            assert_eq!(signal, None);
            assert_eq!(diagnostics, "bad flag --nope");
        }
        other => panic!("expected NonZeroExit, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_zero_exit_falls_back_to_stdout() {
    let err = CliExecutor::default()
        .run(&sh("echo only-stdout; exit 1"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("only-stdout"));
    assert!(err.to_string().contains("code=1"));
}

#[tokio::test]
async fn test_killed_by_signal_reports_signal() {
    let err = CliExecutor::default()
        .run(&sh("kill -9 $$"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessError::NonZeroExit {
            code: None,
            signal: Some(9),
            ..
        }
    ));
}

#[tokio::test]
async fn test_graceful_timeout() {
    let started = Instant::now();
    let err = fast_executor()
        .run(&Invocation::new("sleep", vec!["10".to_string()]).with_timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProcessError::Timeout {
            stage: TimeoutStage::Graceful,
            ..
        }
    ));
    assert!(err.is_transient());
    assert!(err.to_string().contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_ignored_sigterm_escalates_to_kill() {
    let started = Instant::now();
    let err = fast_executor()
        .run(&sh("trap '' TERM; sleep 10").with_timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProcessError::Timeout {
            stage: TimeoutStage::Forced,
            ..
        }
    ));
    assert!(!err.is_transient());
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_background_child_holding_pipes_is_killed_at_timeout() {
    let started = Instant::now();
    let err = fast_executor()
        .run(&sh("sleep 30 & echo started").with_timeout(Duration::from_millis(300)))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_runaway_output_hits_cap() {
    let err = CliExecutor::default()
        .run(&Invocation::new("yes", Vec::new()).with_max_output_bytes(4096))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::BufferExceeded { limit: 4096 }));
}

#[tokio::test]
async fn test_cap_counts_stdout_and_stderr_together() {
    let err = CliExecutor::default()
        .run(&sh("printf 1234567890; printf 1234567890 >&2").with_max_output_bytes(15))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::BufferExceeded { limit: 15 }));
}

#[tokio::test]
async fn test_working_directory_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let output = CliExecutor::default()
        .run(&Invocation::new("pwd", Vec::new()).with_cwd(dir.path()))
        .await
        .unwrap();
    assert_eq!(
        std::fs::canonicalize(output.stdout.trim()).unwrap(),
        std::fs::canonicalize(dir.path()).unwrap()
    );
}

#[tokio::test]
async fn test_stdin_is_closed() {
    let output = CliExecutor::default()
        .run(&sh("cat; echo done"))
        .await
        .unwrap();
    assert_eq!(output.stdout, "done\n");
}

#[tokio::test]
async fn test_retry_after_graceful_timeout_runs_two_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let script = format!(
        "echo x >> '{c}'; if [ $(wc -l < '{c}') -ge 2 ]; then echo ok; else sleep 10; fi",
        c = counter.display()
    );

    let retry = RetryWrapper::new(
        Arc::new(fast_executor()),
        RetryPolicy::new(1, Duration::from_millis(10)),
    );
    let output = retry
        .run(&sh(&script).with_timeout(Duration::from_millis(500)))
        .await
        .unwrap();

    assert_eq!(output.stdout.trim(), "ok");
    let attempts = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(attempts.lines().count(), 2);
}

#[tokio::test]
async fn test_non_zero_exit_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let script = format!("echo x >> '{}'; exit 1", counter.display());

    let retry = RetryWrapper::new(
        Arc::new(CliExecutor::default()),
        RetryPolicy::new(1, Duration::from_millis(10)),
    );
    let err = retry.run(&sh(&script)).await.unwrap_err();

    assert!(matches!(err, ProcessError::NonZeroExit { .. }));
    let attempts = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(attempts.lines().count(), 1);
}
