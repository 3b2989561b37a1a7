use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::server::entrypoint::EntrypointResolver;
use crate::server::layout::{ServerKey, ServerPaths};
use crate::server::log::LogSink;
use crate::server::process::{self, ExitInfo, ExitNotifier, ProcessHandle};
use crate::server::record::DEFAULT_KIND;
use crate::server::registry::ProcessRegistry;
use crate::server::stager::{PackageStager, StageReport};
use crate::server::store::ConfigStore;
use futures::future::join_all;
use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Child;
use tokio::time;
use tracing::Instrument;

/// Result of a successful start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// OS process id of the new process
    pub pid: u32,
    /// Program being run
    pub entrypoint: PathBuf,
    /// Staging details, including the working directory
    pub stage: StageReport,
}

/// Result of a successful stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A registered process was terminated
    Stopped,
    /// No process was registered
    AlreadyStopped,
}

/// Drives servers through their lifecycle.
///
/// `start` stages, resolves, spawns and registers a process, then leaves a
/// monitor task waiting on it. Whichever of the monitor and an explicit
/// `stop` first removes the handle from the registry persists the stopped
/// record; the other does nothing.
///
/// Concurrent starts of one server stage and resolve one at a time, so a
/// start never sees a package another start is still unpacking.
///
/// A `stop` racing a `start` that has not registered its process yet sees
/// no handle and reports [`StopOutcome::AlreadyStopped`].
pub struct Supervisor {
    config: Arc<HostConfig>,
    registry: Arc<ProcessRegistry>,
    store: ConfigStore,
    stager: PackageStager,
    resolver: EntrypointResolver,
    staging: Mutex<HashMap<ServerKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl Supervisor {
    /// Create a supervisor with an empty registry
    pub fn new(config: HostConfig) -> Self {
        let stager = PackageStager::new(config.runtime.clone(), config.install_timeout());
        let resolver = EntrypointResolver::new(config.runtime.clone(), config.entrypoint_fallback);
        Self {
            store: ConfigStore::new(config.servers_root.clone()),
            registry: Arc::new(ProcessRegistry::new()),
            config: Arc::new(config),
            stager,
            resolver,
            staging: Mutex::new(HashMap::new()),
        }
    }

    /// Get the host configuration
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Get the process registry
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Get the record store
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// On-disk paths of `key`
    pub fn paths(&self, key: &ServerKey) -> ServerPaths {
        ServerPaths::new(&self.config.servers_root, key)
    }

    /// Log sink of `key`
    pub fn log(&self, key: &ServerKey) -> LogSink {
        LogSink::new(self.paths(key).log())
    }

    /// Start the server.
    ///
    /// Returns only after the new handle is registered, so a following
    /// `stop` always finds it.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] if the server directory is missing
    /// * [`Error::AlreadyRunning`] if a process is registered, including
    ///   when a concurrent start registers first
    /// * [`Error::NoEntrypoint`] if resolution is configured to fail
    /// * [`Error::SpawnFailure`] if the process cannot be launched
    #[tracing::instrument(skip(self), fields(server = %key))]
    pub async fn start(&self, key: &ServerKey) -> Result<StartReport> {
        let paths = self.paths(key);
        if !paths.dir().is_dir() {
            tracing::warn!("Server directory not found");
            return Err(Error::NotFound(key.server().to_string()));
        }
        if self.registry.contains(key)? {
            return Err(Error::AlreadyRunning(key.server().to_string()));
        }

        tracing::info!("Starting server");
        let log = LogSink::new(paths.log());
        log.banner(format!("Starting server: {}", key.server()));

        let (stage, entrypoint) = {
            let lock = self.staging_lock(key)?;
            let _staging = lock.lock().await;

            let stage = self.stager.stage(&paths, &log).await;
            let resolver = self.resolver.clone();
            let workdir = stage.workdir.clone();
            let entrypoint = run_blocking(move || resolver.resolve(&workdir))
                .await
                .inspect_err(|e| {
                    tracing::error!(error = %e, "Failed to resolve entrypoint");
                    log.line(format!("[ERROR] {}", e));
                })?;
            (stage, entrypoint)
        };
        log.line(format!("Found main file: {}", entrypoint.display()));

        let mut record = self.store.load(key);
        if record.kind == DEFAULT_KIND {
            log.line(format!("Web server starting on port: {}", record.port));
        }
        let runtime = &self.config.runtime;
        log.line(format!(
            "Command: {} {} {}",
            runtime.interpreter,
            runtime.interpreter_args.join(" "),
            entrypoint.display()
        ));
        log.line(format!("Working directory: {}", stage.workdir.display()));

        let mut child = process::spawn(runtime, &entrypoint, &stage.workdir, record.port, &log)
            .inspect_err(|e| {
                tracing::error!(error = %e, "Failed to spawn server process");
                log.line(format!("[ERROR] {}", e));
            })?;
        let Some(pid) = child.id() else {
            let error = Error::SpawnFailure("Process exited before it could be registered".to_string());
            log.line(format!("[ERROR] {}", error));
            return Err(error);
        };

        let (handle, notifier) =
            ProcessHandle::new(key.clone(), pid, stage.workdir.clone(), entrypoint.clone());
        let handle = Arc::new(handle);

        if let Err(e) = self.registry.register(Arc::clone(&handle)) {
            tracing::warn!(pid, "Another start registered first, discarding spawned process");
            log.line(format!("Discarding duplicate process {}", pid));
            if let Err(kill_err) = process::signal_group(pid, Signal::SIGKILL) {
                tracing::warn!(error = %kill_err, "Failed to kill duplicate process");
            }
            if let Err(wait_err) = child.wait().await {
                tracing::warn!(error = %wait_err, "Failed to reap duplicate process");
            }
            return Err(e);
        }

        record.mark_running(pid, handle.started_at());
        let store = self.store.clone();
        let owner = key.clone();
        if let Err(e) = run_blocking(move || store.save(&owner, &record)).await {
            tracing::warn!(error = %e, "Failed to persist running status");
        }

        let span = tracing::info_span!("monitor", server = %key, pid);
        tokio::spawn(
            monitor(
                child,
                notifier,
                Arc::clone(&handle),
                Arc::clone(&self.registry),
                self.store.clone(),
                log,
            )
            .instrument(span),
        );

        tracing::info!(pid, entrypoint = %entrypoint.display(), "Server started");
        Ok(StartReport {
            pid,
            entrypoint,
            stage,
        })
    }

    /// Stop the server.
    ///
    /// Stopping a server with no registered process succeeds. Otherwise the
    /// process group gets a termination request, then a kill once the grace
    /// period runs out.
    ///
    /// # Errors
    ///
    /// [`Error::TerminationFailure`] if the process survives the kill. The
    /// registry entry is removed and the record persisted as stopped anyway,
    /// so the server can be started again; the surviving pid is reported.
    #[tracing::instrument(skip(self), fields(server = %key))]
    pub async fn stop(&self, key: &ServerKey) -> Result<StopOutcome> {
        let Some(handle) = self.registry.lookup(key)? else {
            tracing::debug!("No process registered, already stopped");
            return Ok(StopOutcome::AlreadyStopped);
        };

        let pid = handle.pid();
        let log = self.log(key);
        tracing::info!(pid, "Stopping server");
        log.line(format!("Stopping server: {} (pid {})", key.server(), pid));

        // Once the leader has been reaped its pid may belong to another
        // process group, so only sweep a group this call signalled.
        let exited_before = handle.has_exited();
        let exited = exited_before || self.terminate(&handle).await;

        if !exited_before {
            // Reap anything the program left behind in its group.
            if let Err(e) = process::signal_group(pid, Signal::SIGKILL) {
                tracing::debug!(error = %e, "Failed to sweep process group");
            }
        }

        if self.registry.remove_if(key, handle.id())? {
            persist_stopped(&self.store, key).await;
        }

        if !exited {
            tracing::error!(pid, "Process survived forceful kill, leaving it orphaned");
            log.line(format!("[ERROR] Process {} did not terminate", pid));
            return Err(Error::TerminationFailure {
                server: key.server().to_string(),
                pid,
            });
        }

        log.line("Server stopped");
        tracing::info!("Server stopped");
        Ok(StopOutcome::Stopped)
    }

    async fn terminate(&self, handle: &ProcessHandle) -> bool {
        if let Err(e) = process::signal_group(handle.pid(), Signal::SIGTERM) {
            tracing::warn!(error = %e, "Failed to request termination");
        }
        if handle.wait_exit(self.config.stop_grace()).await {
            return true;
        }

        tracing::warn!(pid = handle.pid(), "Process ignored termination request, killing");
        if let Err(e) = process::signal_group(handle.pid(), Signal::SIGKILL) {
            tracing::warn!(error = %e, "Failed to kill process");
        }
        handle.wait_exit(self.config.kill_wait()).await
    }

    /// Stop, then start, one after the other.
    ///
    /// A failed stop aborts the restart.
    #[tracing::instrument(skip(self), fields(server = %key))]
    pub async fn restart(&self, key: &ServerKey) -> Result<StartReport> {
        self.stop(key).await?;
        self.start(key).await
    }

    /// Stop the server and remove its directory.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] if the server directory is missing
    /// * [`Error::TerminationFailure`] if the process cannot be stopped;
    ///   the directory is kept
    /// * [`Error::DeleteFailed`] if the directory survives every attempt
    #[tracing::instrument(skip(self), fields(server = %key))]
    pub async fn delete(&self, key: &ServerKey) -> Result<()> {
        let paths = self.paths(key);
        if !paths.dir().exists() {
            return Err(Error::NotFound(key.server().to_string()));
        }

        self.stop(key).await?;
        remove_dir_with_retries(
            paths.dir(),
            self.config.delete_attempts,
            self.config.delete_backoff(),
        )
        .await?;
        self.registry.remove(key)?;
        self.staging_guards()?.remove(key);

        tracing::info!("Server deleted");
        Ok(())
    }

    /// Stop every registered server of `tenant`.
    ///
    /// Returns the servers that failed to stop.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&self, tenant: &str) -> Result<Vec<(ServerKey, Error)>> {
        let keys = self.registry.keys_for_tenant(tenant)?;
        Ok(self.stop_keys(keys).await)
    }

    /// Stop every registered server.
    ///
    /// Returns the servers that failed to stop.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<Vec<(ServerKey, Error)>> {
        let keys = self
            .registry
            .handles()?
            .iter()
            .map(|handle| handle.key().clone())
            .collect();
        Ok(self.stop_keys(keys).await)
    }

    fn staging_guards(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ServerKey, Arc<tokio::sync::Mutex<()>>>>> {
        self.staging
            .lock()
            .map_err(|_| Error::Other("Failed to acquire staging lock".to_string()))
    }

    fn staging_lock(&self, key: &ServerKey) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut guards = self.staging_guards()?;
        Ok(Arc::clone(guards.entry(key.clone()).or_default()))
    }

    async fn stop_keys(&self, keys: Vec<ServerKey>) -> Vec<(ServerKey, Error)> {
        tracing::info!(count = keys.len(), "Stopping servers");
        let results = join_all(keys.iter().map(|key| self.stop(key))).await;

        keys.into_iter()
            .zip(results)
            .filter_map(|(key, result)| result.err().map(|e| (key, e)))
            .inspect(|(key, e)| tracing::error!(server = %key, error = %e, "Failed to stop server"))
            .collect()
    }
}

/// Wait for the process to exit, then reconcile registry and record.
async fn monitor(
    mut child: Child,
    notifier: ExitNotifier,
    handle: Arc<ProcessHandle>,
    registry: Arc<ProcessRegistry>,
    store: ConfigStore,
    log: LogSink,
) {
    let info = match child.wait().await {
        Ok(status) => ExitInfo {
            code: status.code(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Failed to wait for process");
            ExitInfo { code: None }
        }
    };

    log.line(format!(
        "Process {} exited (code {:?})",
        handle.pid(),
        info.code
    ));

    // Reconcile before publishing the exit, so a stop waiting on it
    // returns with the record already persisted.
    match registry.remove_if(handle.key(), handle.id()) {
        Ok(true) => {
            persist_stopped(&store, handle.key()).await;
            tracing::info!(code = ?info.code, "Process exited, record reconciled");
        }
        Ok(false) => tracing::debug!("Exit already reconciled by stop"),
        Err(e) => tracing::error!(error = %e, "Failed to reconcile exited process"),
    }
    notifier.notify(info);
}

async fn persist_stopped(store: &ConfigStore, key: &ServerKey) {
    let store = store.clone();
    let owner = key.clone();
    let updated = run_blocking(move || store.update(&owner, |record| record.mark_stopped())).await;
    if let Err(e) = updated {
        tracing::warn!(server = %key, error = %e, "Failed to persist stopped status");
    }
}

/// Run filesystem work off the async executor, keeping the caller's span.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(|e| Error::Other(format!("Blocking task failed: {}", e)))?
}

async fn remove_dir_with_retries(dir: &Path, attempts: u32, backoff: Duration) -> Result<()> {
    let mut delay = backoff;
    let mut reason = String::new();

    for attempt in 1..=attempts {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Failed to remove server directory");
                reason = e.to_string();
            }
        }
        if attempt < attempts {
            time::sleep(delay).await;
            delay = delay.saturating_mul(2);
        }
    }

    Err(Error::DeleteFailed { attempts, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_missing_dir_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");

        remove_dir_with_retries(&gone, 3, Duration::from_millis(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remove_dir_tree() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("server");
        std::fs::create_dir_all(tree.join("extracted/pkg")).unwrap();
        std::fs::write(tree.join("extracted/pkg/main.py"), "print()").unwrap();

        remove_dir_with_retries(&tree, 3, Duration::from_millis(1))
            .await
            .unwrap();

        assert!(!tree.exists());
    }
}
