//! Lifecycle management of the managed process
//!
//! The supervisor owns exactly one externally spawned process running the
//! installed artifact. All lifecycle operations go through a single
//! operation gate: a caller that would interleave with an in-flight
//! operation is rejected with `OperationInProgress` instead of being
//! queued. Process exit is observed by a watcher task awaiting the child,
//! so an abnormal exit flips the state to `Stopped` without polling.

use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Grace period a stop request waits for the process to exit before the
/// kill is escalated.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Lifecycle states of the managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// No process is running
    #[default]
    Stopped,
    /// A launch is in flight
    Starting,
    /// The process is confirmed running
    Running,
    /// A stop request is in flight
    Stopping,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
        };
        write!(f, "{name}")
    }
}

/// Snapshot of the supervisor for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessStatus {
    /// Current lifecycle state
    pub state: ProcessState,
    /// Identity of the most recent process, retained after exit
    pub pid: Option<u32>,
    /// Seconds since launch; `None` unless the process is running
    pub uptime_seconds: Option<u64>,
    /// Launch time of the running process
    pub started_at: Option<DateTime<Utc>>,
    /// Completed restarts since the launcher came up
    pub restart_count: u32,
}

/// A request for the watcher task to bring the child down.
struct StopRequest {
    grace: Duration,
    done: oneshot::Sender<()>,
}

/// Handle to the most recently launched process. Kept around after exit so
/// status queries can still name the pid.
#[derive(Debug)]
struct ManagedProcess {
    pid: u32,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    running: bool,
    stop_tx: Option<mpsc::Sender<StopRequest>>,
}

#[derive(Debug, Default)]
struct SupervisorState {
    state: ProcessState,
    process: Option<ManagedProcess>,
    restart_count: u32,
    ever_started: bool,
}

fn mark_stopped(st: &mut SupervisorState) {
    st.state = ProcessState::Stopped;
    if let Some(process) = st.process.as_mut() {
        process.running = false;
        process.stop_tx = None;
    }
}

/// Owns the lifecycle of the single managed process.
pub struct ProcessSupervisor {
    program: PathBuf,
    args: Vec<String>,
    /// Single-writer gate across lifecycle operations; external callers
    /// try-lock it and are rejected rather than queued.
    gate: Mutex<()>,
    state: Arc<Mutex<SupervisorState>>,
}

impl ProcessSupervisor {
    /// Creates a supervisor that will run `program` with `args` appended.
    #[must_use]
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            gate: Mutex::new(()),
            state: Arc::new(Mutex::new(SupervisorState::default())),
        }
    }

    /// The command line this supervisor launches, as published in the
    /// connection descriptor.
    #[must_use]
    pub fn launch_command(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Launches the managed process.
    ///
    /// # Errors
    /// `AlreadyRunning` unless the supervisor is stopped;
    /// `OperationInProgress` if another lifecycle operation holds the gate;
    /// `Io` if the process cannot be spawned.
    pub async fn start(&self) -> Result<()> {
        let _gate = self
            .gate
            .try_lock()
            .map_err(|_| Error::OperationInProgress)?;
        self.start_locked().await
    }

    /// Stops the managed process, escalating to a forced kill after
    /// `grace`. Idempotent: stopping a stopped supervisor succeeds.
    ///
    /// # Errors
    /// `OperationInProgress` if another lifecycle operation holds the gate.
    pub async fn stop(&self, grace: Duration) -> Result<()> {
        let _gate = self
            .gate
            .try_lock()
            .map_err(|_| Error::OperationInProgress)?;
        self.stop_locked(grace).await
    }

    /// Stops (with the default grace period) and starts again as one
    /// logical operation; concurrent lifecycle calls are rejected with
    /// `OperationInProgress` for its whole duration.
    ///
    /// # Errors
    /// As [`start`](Self::start) and [`stop`](Self::stop).
    pub async fn restart(&self) -> Result<()> {
        let _gate = self
            .gate
            .try_lock()
            .map_err(|_| Error::OperationInProgress)?;
        self.stop_locked(DEFAULT_STOP_GRACE).await?;
        self.start_locked().await?;
        let mut st = self.state.lock().await;
        st.restart_count += 1;
        Ok(())
    }

    /// Current state, process identity, uptime and restart count.
    pub async fn status(&self) -> ProcessStatus {
        let st = self.state.lock().await;
        let process = st.process.as_ref();
        ProcessStatus {
            state: st.state,
            pid: process.map(|p| p.pid),
            uptime_seconds: process
                .filter(|p| p.running)
                .map(|p| p.started_at.elapsed().as_secs()),
            started_at: process.filter(|p| p.running).map(|p| p.started_at_utc),
            restart_count: st.restart_count,
        }
    }

    /// Whether a process was ever launched during this launcher run.
    pub async fn ever_started(&self) -> bool {
        self.state.lock().await.ever_started
    }

    async fn start_locked(&self) -> Result<()> {
        let mut st = self.state.lock().await;
        if st.state != ProcessState::Stopped {
            return Err(Error::AlreadyRunning);
        }
        st.state = ProcessState::Starting;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                st.state = ProcessState::Stopped;
                warn!("failed to spawn {}: {e}", self.program.display());
                return Err(e.into());
            }
        };
        let pid = child.id().unwrap_or_default();
        forward_output(&mut child, pid);

        let (stop_tx, stop_rx) = mpsc::channel(1);
        st.process = Some(ManagedProcess {
            pid,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            running: true,
            stop_tx: Some(stop_tx),
        });
        st.state = ProcessState::Running;
        st.ever_started = true;
        tokio::spawn(watch(child, stop_rx, Arc::clone(&self.state)));
        info!("started {} (pid {pid})", self.program.display());
        Ok(())
    }

    async fn stop_locked(&self, grace: Duration) -> Result<()> {
        let stop_tx = {
            let mut st = self.state.lock().await;
            if st.state == ProcessState::Stopped {
                debug!("stop requested but no process is running");
                return Ok(());
            }
            st.state = ProcessState::Stopping;
            st.process.as_mut().and_then(|p| p.stop_tx.take())
        };

        let Some(stop_tx) = stop_tx else {
            // The watcher already observed the exit.
            mark_stopped(&mut *self.state.lock().await);
            return Ok(());
        };

        let (done_tx, done_rx) = oneshot::channel();
        let request = StopRequest {
            grace,
            done: done_tx,
        };
        if stop_tx.send(request).await.is_err() {
            // The process exited while the stop was being requested.
            mark_stopped(&mut *self.state.lock().await);
            return Ok(());
        }
        let _ = done_rx.await;
        Ok(())
    }
}

/// Mirrors the child's output into the launcher's log.
fn forward_output(child: &mut Child, pid: u32) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!("[managed {pid}] {line}");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!("[managed {pid}] {line}");
            }
        });
    }
}

/// Waits on the child so exits are observed the moment they happen, and
/// serves at most one stop request.
async fn watch(
    mut child: Child,
    mut stop_rx: mpsc::Receiver<StopRequest>,
    state: Arc<Mutex<SupervisorState>>,
) {
    tokio::select! {
        status = child.wait() => {
            let mut st = state.lock().await;
            mark_stopped(&mut st);
            drop(st);
            match status {
                Ok(status) => info!("managed process exited with {status}"),
                Err(e) => warn!("failed waiting for the managed process: {e}"),
            }
        }
        request = stop_rx.recv() => {
            match request {
                Some(StopRequest { grace, done }) => {
                    if let Err(e) = child.start_kill() {
                        debug!("kill request had no effect: {e}");
                    }
                    let status = match timeout(grace, child.wait()).await {
                        Ok(status) => status,
                        Err(_) => {
                            warn!(
                                "managed process did not exit within {}s; killing",
                                grace.as_secs()
                            );
                            let _ = child.kill().await;
                            child.wait().await
                        }
                    };
                    let mut st = state.lock().await;
                    mark_stopped(&mut st);
                    drop(st);
                    match status {
                        Ok(status) => info!("managed process stopped with {status}"),
                        Err(e) => warn!("failed waiting for the stopped process: {e}"),
                    }
                    let _ = done.send(());
                }
                None => {
                    // The supervisor dropped the sender without a stop
                    // request; keep waiting for the exit.
                    let status = child.wait().await;
                    let mut st = state.lock().await;
                    mark_stopped(&mut st);
                    drop(st);
                    match status {
                        Ok(status) => info!("managed process exited with {status}"),
                        Err(e) => warn!("failed waiting for the managed process: {e}"),
                    }
                }
            }
        }
    }
}
