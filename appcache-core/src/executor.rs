//! LockExecutor: runs the external lock tool once per selected directory on a bounded
//! worker pool, with a per-operation deadline and cooperative shutdown.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::candidate::Candidate;
use crate::report::{LockOutcome, SkipReason};
use crate::shutdown::{reached, ShutdownCoordinator, ShutdownPhase};

/// Maximum stdout or stderr captured per lock operation (10 MiB).
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

/// How long to wait for output pipes to close once the process is gone.
const OUTPUT_DRAIN: Duration = Duration::from_secs(1);

/// How long a process group gets between SIGTERM and SIGKILL when it must go now.
/// `sudo` relays SIGTERM to the tool it wraps but cannot relay SIGKILL.
const TERM_BEFORE_KILL: Duration = Duration::from_secs(1);

/// The external page-cache lock tool, treated as an opaque program.
///
/// The target directory is always appended as the last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTool {
    program: OsString,
    args: Vec<OsString>,
    sudo: bool,
}

impl LockTool {
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: Into<OsString>,
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            sudo: false,
        }
    }

    /// `vmtouch -vl <dir>`: verbose, lock every page under the directory.
    pub fn vmtouch() -> Self {
        Self::new("vmtouch", ["-vl"])
    }

    /// Runs the tool through `sudo -n` so a missing credential fails instead of prompting.
    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    pub fn uses_sudo(&self) -> bool {
        self.sudo
    }

    /// Builds the command for one directory.
    ///
    /// The child gets its own process group so termination reaches anything it wraps
    /// (`sudo` -> `vmtouch`), and it is killed if its handle is dropped.
    pub fn command(&self, dir: &Path) -> Command {
        let mut cmd = if self.sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg("-n").arg(&self.program);
            cmd
        } else {
            Command::new(&self.program)
        };

        cmd.args(&self.args)
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        cmd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Concurrent lock subprocesses.
    pub max_workers: usize,
    /// Deadline for a single lock operation.
    pub per_op_timeout: Duration,
    /// How long a process may take to exit after a shutdown termination request.
    pub drain_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            per_op_timeout: Duration::from_secs(300),
            drain_grace: Duration::from_secs(5),
        }
    }
}

pub struct LockExecutor {
    tool: LockTool,
    config: ExecutorConfig,
}

impl LockExecutor {
    pub fn new(tool: LockTool, config: ExecutorConfig) -> Self {
        Self { tool, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Locks `selection` in order on at most `max_workers` slots.
    ///
    /// Returns one outcome per candidate, in no particular order. Once `shutdown` leaves
    /// `Running`, nothing new is dispatched: queued candidates come back as skipped and
    /// in-flight ones are drained.
    pub async fn run(&self, selection: &[Candidate], shutdown: &ShutdownCoordinator) -> Vec<LockOutcome> {
        let slots = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut phase = shutdown.subscribe();
        let mut in_flight: Vec<(Candidate, JoinHandle<LockOutcome>)> = Vec::with_capacity(selection.len());
        let mut outcomes = Vec::with_capacity(selection.len());

        let mut queue = selection.iter();
        for candidate in queue.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = reached(&mut phase, ShutdownPhase::ShutdownRequested) => None,
                permit = slots.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                outcomes.push(cancelled(candidate));
                break;
            };

            debug!("Locking directory: {}", candidate.path().display());
            let job = LockJob {
                tool: self.tool.clone(),
                candidate: candidate.clone(),
                timeout: self.config.per_op_timeout,
                grace: self.config.drain_grace,
                phase: shutdown.subscribe(),
            };
            let handle = tokio::spawn(async move {
                let outcome = job.run().await;
                drop(permit);
                outcome
            });
            in_flight.push((candidate.clone(), handle));
        }
        outcomes.extend(queue.map(cancelled));

        if shutdown.begin_drain() {
            info!("Shutdown requested: draining {} in-flight lock operations", in_flight.len());
        }

        for (candidate, handle) in in_flight {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => LockOutcome::failed(candidate, Duration::ZERO, format!("lock task aborted: {}", e)),
            };
            outcomes.push(outcome);
        }

        shutdown.finish();
        outcomes
    }
}

fn cancelled(candidate: &Candidate) -> LockOutcome {
    debug!("Not dispatched (shutdown): {}", candidate.path().display());
    LockOutcome::skipped(candidate.clone(), SkipReason::ShutdownRequested, "shutdown requested")
}

enum Exit {
    Completed(std::io::Result<ExitStatus>),
    Deadline,
    Interrupted,
}

struct LockJob {
    tool: LockTool,
    candidate: Candidate,
    timeout: Duration,
    grace: Duration,
    phase: watch::Receiver<ShutdownPhase>,
}

impl LockJob {
    async fn run(mut self) -> LockOutcome {
        let started = Instant::now();
        let path = self.candidate.path().to_path_buf();

        let mut child = match self.tool.command(&path).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start lock tool for {}: {}", path.display(), e);
                return LockOutcome::failed(
                    self.candidate,
                    started.elapsed(),
                    format!("failed to start {}: {}", self.tool.program().to_string_lossy(), e),
                );
            }
        };
        let pid = child.id();
        let mut stdout = tokio::spawn(read_stream(child.stdout.take()));
        let mut stderr = tokio::spawn(read_stream(child.stderr.take()));

        let deadline = started + self.timeout;
        let exit = tokio::select! {
            status = child.wait() => Exit::Completed(status),
            _ = tokio::time::sleep_until(deadline) => Exit::Deadline,
            _ = reached(&mut self.phase, ShutdownPhase::ShutdownRequested) => Exit::Interrupted,
        };

        let outcome = match exit {
            Exit::Completed(Ok(status)) if status.success() => {
                let out = collect(&mut stdout).await;
                if !out.is_empty() {
                    debug!("{}", out);
                }
                debug!("Successfully locked: {} ({:?})", path.display(), started.elapsed());
                LockOutcome::locked(self.candidate, started.elapsed())
            }
            Exit::Completed(Ok(status)) => {
                let err = collect(&mut stderr).await;
                let detail = if err.is_empty() { status.to_string() } else { err };
                debug!("Failed to lock {}: {}", path.display(), detail);
                LockOutcome::failed(self.candidate, started.elapsed(), detail)
            }
            Exit::Completed(Err(e)) => {
                kill_group(&mut child, pid).await;
                LockOutcome::failed(self.candidate, started.elapsed(), format!("failed to wait for lock tool: {}", e))
            }
            Exit::Deadline => {
                terminate_group(&mut child, pid).await;
                debug!("Lock of {} timed out after {:?}; process killed", path.display(), self.timeout);
                LockOutcome::timed_out(
                    self.candidate,
                    started.elapsed(),
                    format!("lock did not finish within {:?}", self.timeout),
                )
            }
            Exit::Interrupted => self.drain(&mut child, pid, started).await,
        };

        stdout.abort();
        stderr.abort();
        outcome
    }

    /// Asks the process group to terminate, then waits for the grace period or escalation.
    async fn drain(mut self, child: &mut Child, pid: Option<u32>, started: Instant) -> LockOutcome {
        if let Some(pid) = pid {
            if let Err(e) = signal_group(pid, Signal::SIGTERM) {
                debug!("SIGTERM to lock process group {} failed: {}", pid, e);
            }
        }

        tokio::select! {
            _ = child.wait() => {
                LockOutcome::failed(self.candidate, started.elapsed(), "interrupted by shutdown request")
            }
            _ = tokio::time::sleep(self.grace) => {
                kill_group(child, pid).await;
                LockOutcome::timed_out(
                    self.candidate,
                    started.elapsed(),
                    format!("did not exit within {:?} of the shutdown request; killed", self.grace),
                )
            }
            _ = reached(&mut self.phase, ShutdownPhase::Terminated) => {
                terminate_group(child, pid).await;
                LockOutcome::failed(self.candidate, started.elapsed(), "killed by forced shutdown")
            }
        }
    }
}

fn signal_group(pid: u32, signal: Signal) -> nix::Result<()> {
    killpg(Pid::from_raw(pid as i32), signal)
}

/// SIGTERMs the process group, gives it [`TERM_BEFORE_KILL`] to exit, then falls back
/// to [`kill_group`].
async fn terminate_group(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        if let Err(e) = signal_group(pid, Signal::SIGTERM) {
            debug!("SIGTERM to lock process group {} failed: {}", pid, e);
        }
    }
    if tokio::time::timeout(TERM_BEFORE_KILL, child.wait()).await.is_err() {
        debug!("Lock process group {:?} ignored SIGTERM; sending SIGKILL", pid);
    }
    kill_group(child, pid).await;
}

/// SIGKILLs the whole process group and reaps the child.
async fn kill_group(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        let _ = signal_group(pid, Signal::SIGKILL);
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

async fn collect(handle: &mut JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(OUTPUT_DRAIN, handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).trim().to_string(),
        _ => String::new(),
    }
}
