//! CLI executor: supervised process runner for AI CLI tools
//!
//! Spawns one child per invocation with stdin closed, reads stdout and stderr
//! incrementally under a combined byte cap, and enforces the wall-clock
//! timeout with a graceful-signal then force-kill escalation. On Unix the
//! child gets its own process group so signals reach anything it forked.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::{Duration, Instant};

use crate::error::{diagnostics_from, ProcessError};

use super::runner::{Invocation, ProcessOutput, ProcessRunner};
use super::watchdog::{KillStage, KillTimer, OutputCapture, Stream};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Configuration for the CLI executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliExecutorConfig {
    /// Time between the graceful termination signal and the forced kill.
    #[serde(with = "humantime_serde")]
    pub kill_grace: Duration,
}

impl Default for CliExecutorConfig {
    fn default() -> Self {
        Self {
            kill_grace: Duration::from_secs(2),
        }
    }
}

/// Process supervisor: exactly one child per [`ProcessRunner::run`] call.
#[derive(Debug, Clone, Default)]
pub struct CliExecutor {
    config: CliExecutorConfig,
}

impl CliExecutor {
    /// Create a new executor with the given configuration.
    pub fn new(config: CliExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CliExecutorConfig {
        &self.config
    }

    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.executable);
        command
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .env_clear()
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Unix: put child in its own process group so the whole tree is signalled
        #[cfg(unix)]
        {
            unsafe {
                command.pre_exec(|| {
                    libc::setpgid(0, 0);
                    Ok(())
                });
            }
        }

        command
    }

    async fn supervise(
        &self,
        invocation: &Invocation,
        mut child: Child,
    ) -> Result<(ExitStatus, KillStage, String, String), ProcessError> {
        let pid = child.id();
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut stdout_chunk = [0u8; READ_CHUNK_BYTES];
        let mut stderr_chunk = [0u8; READ_CHUNK_BYTES];

        let mut capture = OutputCapture::new(invocation.max_output_bytes);
        let mut timer = KillTimer::start(invocation.timeout, self.config.kill_grace);
        let mut status: Option<ExitStatus> = None;

        let io_error = |source: std::io::Error| ProcessError::Io {
            executable: invocation.executable.clone(),
            source,
        };

        loop {
            if let Some(exit) = status {
                let pipes_closed = stdout.is_none() && stderr.is_none();
                // A force-killed group may leave pipes held by re-parented
                // descendants; stop reading once the child itself is reaped.
                if pipes_closed || timer.stage() == KillStage::ForceKillSent {
                    let (stdout, stderr) = capture.into_strings();
                    return Ok((exit, timer.stage(), stdout, stderr));
                }
            }

            tokio::select! {
                read = read_chunk(&mut stdout, &mut stdout_chunk), if stdout.is_some() => {
                    match read.map_err(io_error)? {
                        0 => stdout = None,
                        n => {
                            if let Err(exceeded) = capture.push(Stream::Stdout, &stdout_chunk[..n]) {
                                return Err(Self::abort_over_cap(&mut child, pid, exceeded.limit, &invocation.executable).await);
                            }
                        }
                    }
                }
                read = read_chunk(&mut stderr, &mut stderr_chunk), if stderr.is_some() => {
                    match read.map_err(io_error)? {
                        0 => stderr = None,
                        n => {
                            if let Err(exceeded) = capture.push(Stream::Stderr, &stderr_chunk[..n]) {
                                return Err(Self::abort_over_cap(&mut child, pid, exceeded.limit, &invocation.executable).await);
                            }
                        }
                    }
                }
                exit = child.wait(), if status.is_none() => {
                    status = Some(exit.map_err(io_error)?);
                }
                _ = timer.expired(), if timer.is_armed() => {
                    match timer.escalate() {
                        KillStage::GracefulKillSent => {
                            tracing::warn!(
                                "Timeout ({:?}) for '{}', sending graceful termination",
                                invocation.timeout,
                                invocation.executable
                            );
                            terminate(&mut child, pid);
                        }
                        KillStage::ForceKillSent => {
                            tracing::warn!(
                                "'{}' still running {:?} after termination, force killing",
                                invocation.executable,
                                self.config.kill_grace
                            );
                            force_kill(&mut child, pid);
                        }
                        KillStage::Running => {}
                    }
                }
            }
        }
    }

    async fn abort_over_cap(
        child: &mut Child,
        pid: Option<u32>,
        limit: usize,
        executable: &str,
    ) -> ProcessError {
        tracing::error!(
            "Output of '{}' exceeded {} bytes, killing process",
            executable,
            limit
        );
        force_kill(child, pid);
        if let Err(e) = child.wait().await {
            tracing::error!("Failed to reap '{}' after output cap kill: {}", executable, e);
        }
        ProcessError::BufferExceeded { limit }
    }
}

#[async_trait]
impl ProcessRunner for CliExecutor {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        tracing::debug!(
            executable = %invocation.executable,
            args = invocation.args.len(),
            timeout = ?invocation.timeout,
            "Spawning CLI process"
        );

        let start = Instant::now();
        let child = Self::command(invocation)
            .spawn()
            .map_err(|source| ProcessError::SpawnFailed {
                executable: invocation.executable.clone(),
                source,
            })?;

        let (status, stage, stdout, stderr) = self.supervise(invocation, child).await?;
        let elapsed = start.elapsed();

        if let Some(stage) = stage.timeout_stage() {
            return Err(ProcessError::Timeout {
                timeout: invocation.timeout,
                stage,
                diagnostics: diagnostics_from(&stdout, &stderr),
            });
        }

        if !status.success() {
            return Err(ProcessError::NonZeroExit {
                code: status.code(),
                signal: exit_signal(&status),
                diagnostics: diagnostics_from(&stdout, &stderr),
            });
        }

        tracing::debug!(
            executable = %invocation.executable,
            elapsed_ms = elapsed.as_millis() as u64,
            stdout_bytes = stdout.len(),
            "CLI process exited cleanly"
        );

        Ok(ProcessOutput {
            stdout,
            stderr,
            elapsed,
        })
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader.as_mut() {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Graceful stage: SIGTERM to the process group.
fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        let _ = child;
        signal_group(pid, libc::SIGTERM);
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        let _ = child.start_kill();
    }
}

/// Forced stage: SIGKILL to the process group, then to the child itself.
fn force_kill(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    signal_group(pid, libc::SIGKILL);
    #[cfg(not(unix))]
    let _ = pid;
    let _ = child.start_kill();
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: libc::c_int) {
    if let Some(id) = pid {
        unsafe {
            libc::killpg(id as libc::pid_t, signal);
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
