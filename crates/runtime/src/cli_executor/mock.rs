//! Scripted process runner for testing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::runner::{Invocation, ProcessOutput, ProcessRunner};
use crate::error::ProcessError;

/// Flag after which Codex expects the path of its output file.
const OUTPUT_FILE_FLAG: &str = "--output-last-message";

enum Scripted {
    Outcome(Result<ProcessOutput, ProcessError>),
    /// Write the text to the invocation's output file, then finish with the
    /// outcome.
    LastMessage(String, Result<ProcessOutput, ProcessError>),
}

/// Mock runner that replays scripted outcomes in order and records every
/// invocation it receives.
///
/// Once the script is exhausted every further call fails with `SpawnFailed`.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that exits cleanly once with the given stdout.
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.push_stdout(stdout);
        mock
    }

    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(ProcessOutput {
            stdout: stdout.into(),
            ..Default::default()
        });
    }

    pub fn push_output(&self, output: ProcessOutput) {
        self.script.lock().push_back(Scripted::Outcome(Ok(output)));
    }

    pub fn push_error(&self, error: ProcessError) {
        self.script.lock().push_back(Scripted::Outcome(Err(error)));
    }

    /// Script a clean exit that first writes `text` to the path following
    /// `--output-last-message`, the way Codex reports its final message.
    pub fn push_last_message(&self, text: impl Into<String>) {
        self.script
            .lock()
            .push_back(Scripted::LastMessage(text.into(), Ok(ProcessOutput::default())));
    }

    /// Like [`push_last_message`](Self::push_last_message), but the attempt
    /// fails with `error` after the file is written.
    pub fn push_last_message_then_error(&self, text: impl Into<String>, error: ProcessError) {
        self.script
            .lock()
            .push_back(Scripted::LastMessage(text.into(), Err(error)));
    }

    /// Number of invocations received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Copies of every invocation received so far, oldest first.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    /// The most recent invocation, if any.
    pub fn last_invocation(&self) -> Option<Invocation> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().push(invocation.clone());
        let next = self.script.lock().pop_front();

        match next {
            Some(Scripted::Outcome(outcome)) => outcome,
            Some(Scripted::LastMessage(text, outcome)) => {
                let path = invocation
                    .args
                    .iter()
                    .position(|a| a == OUTPUT_FILE_FLAG)
                    .and_then(|i| invocation.args.get(i + 1));
                if let Some(path) = path {
                    tokio::fs::write(path, text)
                        .await
                        .map_err(|source| ProcessError::Io {
                            executable: invocation.executable.clone(),
                            source,
                        })?;
                }
                outcome
            }
            None => Err(ProcessError::SpawnFailed {
                executable: invocation.executable.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "mock runner has no scripted outcome left",
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let mock = MockProcessRunner::new();
        mock.push_stdout("first");
        mock.push_stdout("second");

        let inv = Invocation::new("claude", vec!["a".to_string()]);
        assert_eq!(mock.run(&inv).await.unwrap().stdout, "first");
        assert_eq!(mock.run(&inv).await.unwrap().stdout, "second");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.last_invocation().unwrap().args, vec!["a"]);
    }

    #[tokio::test]
    async fn test_exhausted_script_fails_to_spawn() {
        let mock = MockProcessRunner::new();
        let inv = Invocation::new("claude", Vec::new());
        let err = mock.run(&inv).await.unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_last_message_written_to_output_flag_path() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("last.txt");
        let mock = MockProcessRunner::new();
        mock.push_last_message("done");

        let inv = Invocation::new(
            "codex",
            vec![
                OUTPUT_FILE_FLAG.to_string(),
                out.display().to_string(),
                "prompt".to_string(),
            ],
        );
        mock.run(&inv).await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "done");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let mock = MockProcessRunner::with_stdout("shared");
        let other = mock.clone();
        let inv = Invocation::new("claude", Vec::new());
        assert_eq!(other.run(&inv).await.unwrap().stdout, "shared");
        assert_eq!(mock.call_count(), 1);
    }
}
