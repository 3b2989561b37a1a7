// src/server/process.rs
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::server::layout::ServerKey;
use crate::server::log::LogSink;
use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time;
use uuid::Uuid;

/// Unique identifier of one spawned process
///
/// Distinguishes successive processes of the same server, so cleanup for
/// an old process never touches a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(Uuid);

impl ProcessId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
}

/// Publishes the exit of a process to its handle.
///
/// Held by the monitor task.
#[derive(Debug)]
pub struct ExitNotifier(watch::Sender<Option<ExitInfo>>);

impl ExitNotifier {
    /// Mark the process as exited
    pub fn notify(self, info: ExitInfo) {
        self.0.send_replace(Some(info));
    }
}

/// In-memory reference to a live server process
#[derive(Debug)]
pub struct ProcessHandle {
    id: ProcessId,
    key: ServerKey,
    pid: u32,
    workdir: PathBuf,
    entrypoint: PathBuf,
    started_at: DateTime<Utc>,
    exit: watch::Receiver<Option<ExitInfo>>,
}

impl ProcessHandle {
    /// Create a handle for an already spawned process, together with the
    /// notifier that reports its exit.
    pub fn new(
        key: ServerKey,
        pid: u32,
        workdir: PathBuf,
        entrypoint: PathBuf,
    ) -> (Self, ExitNotifier) {
        let (tx, rx) = watch::channel(None);
        let handle = Self {
            id: ProcessId::new(),
            key,
            pid,
            workdir,
            entrypoint,
            started_at: Utc::now(),
            exit: rx,
        };
        (handle, ExitNotifier(tx))
    }

    /// Get the handle ID
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Get the owning key
    pub fn key(&self) -> &ServerKey {
        &self.key
    }

    /// Get the OS process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the working directory
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Get the program being run
    pub fn entrypoint(&self) -> &Path {
        &self.entrypoint
    }

    /// Get the spawn time
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Exit information, once the monitor has observed the exit
    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit.borrow()
    }

    /// Check whether the monitor has observed the exit
    pub fn has_exited(&self) -> bool {
        self.exit_info().is_some()
    }

    /// Wait up to `limit` for the process to exit.
    ///
    /// Returns whether the exit was observed. If the monitor went away
    /// without reporting, falls back to probing the pid.
    pub async fn wait_exit(&self, limit: Duration) -> bool {
        let mut rx = self.exit.clone();
        match time::timeout(limit, rx.wait_for(Option::is_some)).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => !is_alive(self.pid),
            Err(_) => false,
        }
    }
}

/// Spawn `entrypoint` with the runtime interpreter.
///
/// The child leads its own process group, so signals aimed at the host do
/// not reach it, and runs in `workdir` with `PORT` set. Its stdout and
/// stderr are appended to `log`.
pub(crate) fn spawn(
    runtime: &RuntimeConfig,
    entrypoint: &Path,
    workdir: &Path,
    port: u16,
    log: &LogSink,
) -> Result<Child> {
    let (stdout, stderr) = log
        .stdio()
        .map_err(|e| Error::SpawnFailure(format!("Failed to open server log: {}", e)))?;

    // Relative to the working directory, since the child runs inside it.
    let program = entrypoint.strip_prefix(workdir).unwrap_or(entrypoint);

    let mut command = Command::new(&runtime.interpreter);
    command
        .args(&runtime.interpreter_args)
        .arg(program)
        .current_dir(workdir)
        .env("PORT", port.to_string())
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .process_group(0);

    command
        .spawn()
        .map_err(|e| Error::SpawnFailure(format!("{}: {}", runtime.interpreter, e)))
}

/// Send `signal` to the process group led by `pid`.
///
/// A group that no longer exists counts as success.
pub(crate) fn signal_group(pid: u32, signal: Signal) -> Result<()> {
    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::Other(format!(
            "Failed to send {:?} to process group {}: {}",
            signal, pid, e
        ))),
    }
}

/// Probe whether a process with `pid` exists.
pub fn is_alive(pid: u32) -> bool {
    matches!(
        kill(Pid::from_raw(pid as i32), None::<Signal>),
        Ok(()) | Err(Errno::EPERM)
    )
}
