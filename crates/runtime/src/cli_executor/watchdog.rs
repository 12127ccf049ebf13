//! Output cap accounting and timeout escalation for one supervised process
//!
//! `OutputCapture` accumulates stdout and stderr as they arrive and reports
//! when their combined size crosses the cap. `KillTimer` is the explicit
//! two-stage escalation state machine:
//!
//! ```text
//! Running --timeout--> GracefulKillSent --grace--> ForceKillSent
//! ```
//!
//! Reaping ends the machine from any state; the stage it was in at that point
//! is what the failure classifier sees.

use tokio::time::{Duration, Instant};

use crate::error::TimeoutStage;

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Returned when the combined output crosses the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapExceeded {
    pub limit: usize,
}

/// Incremental capture of both pipes under a shared byte cap.
#[derive(Debug)]
pub struct OutputCapture {
    max_bytes: usize,
    total: usize,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl OutputCapture {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            total: 0,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    /// Append a chunk. Fails once the running total exceeds the cap; the
    /// offending chunk is not retained.
    pub fn push(&mut self, stream: Stream, chunk: &[u8]) -> Result<(), CapExceeded> {
        self.total = self.total.saturating_add(chunk.len());
        if self.total > self.max_bytes {
            return Err(CapExceeded {
                limit: self.max_bytes,
            });
        }
        match stream {
            Stream::Stdout => self.stdout.extend_from_slice(chunk),
            Stream::Stderr => self.stderr.extend_from_slice(chunk),
        }
        Ok(())
    }

    /// Total bytes seen so far across both pipes.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Decode captured bytes as UTF-8 (lossy) into `(stdout, stderr)`.
    pub fn into_strings(self) -> (String, String) {
        (
            String::from_utf8_lossy(&self.stdout).into_owned(),
            String::from_utf8_lossy(&self.stderr).into_owned(),
        )
    }
}

/// Escalation state of the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillStage {
    Running,
    GracefulKillSent,
    ForceKillSent,
}

impl KillStage {
    /// The timeout stage a reaped process ended in, if the timeout fired.
    pub fn timeout_stage(self) -> Option<TimeoutStage> {
        match self {
            KillStage::Running => None,
            KillStage::GracefulKillSent => Some(TimeoutStage::Graceful),
            KillStage::ForceKillSent => Some(TimeoutStage::Forced),
        }
    }
}

/// Two-stage timer: fires once at the timeout, then once more after the
/// grace window, then never again.
#[derive(Debug)]
pub struct KillTimer {
    stage: KillStage,
    deadline: Option<Instant>,
    grace: Duration,
}

impl KillTimer {
    pub fn start(timeout: Duration, grace: Duration) -> Self {
        Self {
            stage: KillStage::Running,
            deadline: Some(Instant::now() + timeout),
            grace,
        }
    }

    pub fn stage(&self) -> KillStage {
        self.stage
    }

    /// Whether another escalation step is still pending.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the current deadline passes; pending forever once the
    /// force-kill stage has been reached.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Advance one stage and return the new stage. The caller sends the
    /// signal that corresponds to it.
    pub fn escalate(&mut self) -> KillStage {
        match self.stage {
            KillStage::Running => {
                self.stage = KillStage::GracefulKillSent;
                self.deadline = Some(Instant::now() + self.grace);
            }
            KillStage::GracefulKillSent => {
                self.stage = KillStage::ForceKillSent;
                self.deadline = None;
            }
            KillStage::ForceKillSent => {}
        }
        self.stage
    }
}
