//! Child process supervision
//!
//! The spawned child is owned by a dedicated thread. The thread polls for
//! exit, kills the child when asked (or when its handle is dropped) and
//! reports how the child ended on a channel.

use std::fmt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::CompanionConfig;
use crate::error::{CompanionError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// How a supervised child ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReport {
    /// Exited on its own
    Exited(Option<i32>),
    /// Killed on request
    Killed,
    /// Waiting on the child failed
    Lost(String),
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReport::Exited(Some(code)) => write!(f, "exited with status {}", code),
            ExitReport::Exited(None) => write!(f, "terminated by signal"),
            ExitReport::Killed => write!(f, "killed"),
            ExitReport::Lost(reason) => write!(f, "lost track of process: {}", reason),
        }
    }
}

/// Handle to a running, supervised child
#[derive(Debug)]
pub(crate) struct Supervisor {
    pid: u32,
    started_at: DateTime<Utc>,
    kill_tx: Sender<()>,
    exit_rx: Receiver<ExitReport>,
    handle: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Launch the configured program under supervision
    pub(crate) fn spawn(config: &CompanionConfig) -> Result<Self> {
        if !config.working_dir.is_dir() {
            return Err(CompanionError::MissingWorkingDir(config.working_dir.clone()));
        }

        let child = Command::new(&config.program)
            .args(&config.args)
            .current_dir(&config.working_dir)
            .env("PORT", config.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CompanionError::ProgramNotFound(config.program.clone()),
                _ => CompanionError::Spawn(e),
            })?;

        Self::adopt(child, |body| {
            thread::Builder::new()
                .name("companion-supervisor".to_string())
                .spawn(body)
        })
    }

    /// Hand `child` to a supervisor thread started by `spawn_thread`
    ///
    /// The child is only moved into the thread once it is running. If the
    /// thread cannot be started the child is killed and reaped here.
    fn adopt<S>(mut child: Child, spawn_thread: S) -> Result<Self>
    where
        S: FnOnce(Box<dyn FnOnce() + Send>) -> std::io::Result<JoinHandle<()>>,
    {
        let pid = child.id();
        let (kill_tx, kill_rx) = mpsc::channel();
        let (exit_tx, exit_rx) = mpsc::channel();
        let (child_tx, child_rx) = mpsc::channel::<Child>();

        let spawned = spawn_thread(Box::new(move || {
            if let Ok(child) = child_rx.recv() {
                supervise(child, kill_rx, exit_tx);
            }
        }));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Failed to start supervisor for companion process {}: {}", pid, e);
                reap(&mut child);
                return Err(CompanionError::Spawn(e));
            }
        };

        if let Err(mpsc::SendError(mut child)) = child_tx.send(child) {
            reap(&mut child);
            let _ = handle.join();
            return Err(CompanionError::Stop(format!(
                "supervisor for process {} ended before taking the child",
                pid
            )));
        }

        Ok(Self {
            pid,
            started_at: Utc::now(),
            kill_tx,
            exit_rx,
            handle: Some(handle),
        })
    }

    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Block up to `timeout` for the child to end
    pub(crate) fn wait_exit(&mut self, timeout: Duration) -> Option<ExitReport> {
        match self.exit_rx.recv_timeout(timeout) {
            Ok(report) => {
                self.join();
                Some(report)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.join();
                Some(ExitReport::Lost("supervisor thread ended".to_string()))
            }
        }
    }

    /// Non-blocking exit check
    pub(crate) fn try_exit(&mut self) -> Option<ExitReport> {
        match self.exit_rx.try_recv() {
            Ok(report) => {
                self.join();
                Some(report)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                Some(ExitReport::Lost("supervisor thread ended".to_string()))
            }
        }
    }

    /// Kill the child and wait for the supervisor to confirm
    pub(crate) fn terminate(mut self) -> Result<ExitReport> {
        // A send error means the supervisor already reported an exit
        let _ = self.kill_tx.send(());
        self.wait_exit(STOP_TIMEOUT).ok_or_else(|| {
            CompanionError::Stop(format!("process {} did not exit within {:?}", self.pid, STOP_TIMEOUT))
        })
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Companion supervisor thread panicked");
            }
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!("Kill of companion process {} failed: {}", child.id(), e);
    }
    let _ = child.wait();
}

fn supervise(mut child: Child, kill_rx: Receiver<()>, exit_tx: Sender<ExitReport>) {
    let report = loop {
        match child.try_wait() {
            Ok(Some(status)) => break ExitReport::Exited(status.code()),
            Ok(None) => {}
            Err(e) => break ExitReport::Lost(e.to_string()),
        }

        match kill_rx.recv_timeout(POLL_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => continue,
            // Kill request, or the owning handle was dropped
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Err(e) = child.kill() {
                    tracing::debug!("Kill of companion process {} failed: {}", child.id(), e);
                }
                break match child.wait() {
                    Ok(_) => ExitReport::Killed,
                    Err(e) => ExitReport::Lost(e.to_string()),
                };
            }
        }
    };

    tracing::debug!("Companion process {} ended: {}", child.id(), report);
    let _ = exit_tx.send(report);
}
