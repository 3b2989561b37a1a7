/*!
 # Server Host

 A Rust library for hosting tenant-owned server programs as supervised
 child processes.

 ## Overview

 Server Host provides functionality to:
 - Create named servers per tenant, optionally with an uploaded package
 - Extract packages and install their dependencies
 - Start, stop, restart and delete servers as independent OS processes
 - Reconcile persisted status when a process exits on its own
 - Query server lists, log tails, per-tenant stats and host health

 ## Basic Usage

 ```no_run
 use server_host::{CreateServer, Result, ServerHost};

 #[tokio::main]
 async fn main() -> Result<()> {
     let host = ServerHost::from_config_file("host.json")?;

     host.create_server("alice", CreateServer::new("demo").with_port(8080))?;

     let outcome = host.start("alice", "demo").await;
     println!("{}", outcome.message);

     let tail = host.log_tail("alice", "demo")?;
     println!("{}", String::from_utf8_lossy(&tail));

     host.stop("alice", "demo").await;
     Ok(())
 }
 ```

 ## Layout

 Each server lives in `<serversRoot>/<tenant>/<name>/` holding the optional
 `server.zip`, its `extracted/` tree, the `config.json` record and the
 `logs.txt` log.
*/

pub mod config;
pub mod error;
pub mod server;
pub mod types;

pub use config::HostConfig;
pub use error::{Error, Result};
pub use server::{ServerKey, ServerRecord, ServerStatus, StopOutcome, Supervisor};
pub use types::{ActionOutcome, CreateServer, HealthReport, ServerSummary, TenantStats, Upload};

use chrono::Utc;
use server::layout::check_component;
use server::{LogSink, process, safe_name, tenant_dir};
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;

/// Host for all tenants' servers
///
/// This struct is the entry point for the routing layer: control actions
/// return an [`ActionOutcome`] rather than an error, queries return
/// [`Result`]s.
/// All public methods are instrumented with `tracing` spans.
pub struct ServerHost {
    supervisor: Supervisor,
}

impl ServerHost {
    /// Create a host from a configuration file path
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = HostConfig::from_file(path)?;
        Self::new(config)
    }

    /// Create a host from a configuration string
    #[tracing::instrument(skip(config))]
    pub fn from_config_str(config: &str) -> Result<Self> {
        tracing::info!("Loading configuration from string");
        let config = HostConfig::parse_from_str(config)?;
        Self::new(config)
    }

    /// Create a host from a configuration
    #[tracing::instrument(skip(config), fields(root = %config.servers_root.display()))]
    pub fn new(config: HostConfig) -> Result<Self> {
        config::validate_config(&config)?;
        std::fs::create_dir_all(&config.servers_root)?;
        tracing::info!("Creating new ServerHost");
        Ok(Self {
            supervisor: Supervisor::new(config),
        })
    }

    /// Get the supervisor
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Create a server for `tenant`.
    ///
    /// The directory name is derived from the display name with
    /// [`safe_name`]. Creating it reserves the name.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidName`] for unusable tenant, server or file names
    /// * [`Error::AlreadyExists`] if the tenant already has the server
    #[tracing::instrument(skip(self, request), fields(display_name = %request.display_name))]
    pub fn create_server(&self, tenant: &str, request: CreateServer) -> Result<ServerRecord> {
        let name = safe_name(&request.display_name);
        let key = ServerKey::new(tenant, name.clone())?;
        let paths = self.supervisor.paths(&key);

        std::fs::create_dir_all(tenant_dir(&self.supervisor.config().servers_root, tenant))?;
        match std::fs::create_dir(paths.dir()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!(server = %key, "Server already exists");
                return Err(Error::AlreadyExists(name));
            }
            Err(e) => return Err(e.into()),
        }

        let record = ServerRecord::new(&request.display_name, &name, &request.kind, request.port);
        let stored = self
            .supervisor
            .store()
            .save(&key, &record)
            .and_then(|()| self.store_upload(&key, request.upload));
        if let Err(e) = stored {
            tracing::error!(server = %key, error = %e, "Failed to create server, releasing name");
            if let Err(cleanup) = std::fs::remove_dir_all(paths.dir()) {
                tracing::warn!(server = %key, error = %cleanup, "Failed to release server directory");
            }
            return Err(e);
        }

        tracing::info!(server = %key, "Server created");
        Ok(record)
    }

    fn store_upload(&self, key: &ServerKey, upload: Option<Upload>) -> Result<()> {
        let paths = self.supervisor.paths(key);
        match upload {
            None => Ok(()),
            Some(Upload::Archive(bytes)) => Ok(std::fs::write(paths.archive(), bytes)?),
            Some(Upload::File {
                file_name,
                contents,
            }) => {
                check_component(&file_name)?;
                if file_name.ends_with(".zip") {
                    return Ok(std::fs::write(paths.archive(), contents)?);
                }
                let target = paths.dir().join(&file_name);
                if target == paths.record() || target == paths.log() {
                    return Err(Error::InvalidName(format!("'{}' is reserved", file_name)));
                }
                Ok(std::fs::write(target, contents)?)
            }
        }
    }

    /// Start a server
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, tenant: &str, name: &str) -> ActionOutcome {
        let result = match ServerKey::new(tenant, name) {
            Ok(key) => self.supervisor.start(&key).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => ActionOutcome::ok(format!("Server '{}' started successfully", name)),
            Err(e) => ActionOutcome::failed(&e),
        }
    }

    /// Stop a server; stopping a stopped server succeeds
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self, tenant: &str, name: &str) -> ActionOutcome {
        let result = match ServerKey::new(tenant, name) {
            Ok(key) => self.supervisor.stop(&key).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(StopOutcome::Stopped) => ActionOutcome::ok(format!("Server '{}' stopped", name)),
            Ok(StopOutcome::AlreadyStopped) => {
                ActionOutcome::ok(format!("Server '{}' already stopped", name))
            }
            Err(e) => ActionOutcome::failed(&e),
        }
    }

    /// Stop then start a server
    #[tracing::instrument(skip(self))]
    pub async fn restart(&self, tenant: &str, name: &str) -> ActionOutcome {
        let result = match ServerKey::new(tenant, name) {
            Ok(key) => self.supervisor.restart(&key).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => ActionOutcome::ok(format!("Server '{}' restarted", name)),
            Err(e) => ActionOutcome::failed(&e),
        }
    }

    /// Stop a server and remove its directory
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, tenant: &str, name: &str) -> ActionOutcome {
        let result = match ServerKey::new(tenant, name) {
            Ok(key) => self.supervisor.delete(&key).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => ActionOutcome::ok(format!("Server '{}' deleted successfully", name)),
            Err(e) => ActionOutcome::failed(&e),
        }
    }

    /// Stop every running server of `tenant`, e.g. when the tenant logs out
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&self, tenant: &str) -> ActionOutcome {
        Self::bulk_outcome(self.supervisor.stop_all(tenant).await)
    }

    /// Stop every running server of every tenant
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> ActionOutcome {
        Self::bulk_outcome(self.supervisor.shutdown().await)
    }

    fn bulk_outcome(result: Result<Vec<(ServerKey, Error)>>) -> ActionOutcome {
        match result {
            Ok(failures) if failures.is_empty() => ActionOutcome::ok("All servers stopped"),
            Ok(failures) => {
                let message = failures
                    .iter()
                    .map(|(key, e)| format!("{}: {}", key, e))
                    .collect::<Vec<_>>()
                    .join("; ");
                ActionOutcome {
                    success: false,
                    message: format!("Some servers failed to stop: {}", message),
                }
            }
            Err(e) => ActionOutcome::failed(&e),
        }
    }

    /// List the servers of `tenant`, newest first
    #[tracing::instrument(skip(self))]
    pub fn list_servers(&self, tenant: &str) -> Result<Vec<ServerSummary>> {
        let mut servers = Vec::new();
        for key in self.server_keys(tenant)? {
            let record = self.supervisor.store().load(&key);
            servers.push(ServerSummary {
                name: key.server().to_string(),
                display_name: record.display_name.clone(),
                running: self.supervisor.registry().contains(&key)?,
                has_files: self.has_files(&key),
                config: record,
            });
        }

        servers.sort_by(|a, b| b.config.created_at.cmp(&a.config.created_at));
        tracing::debug!(count = servers.len(), "Listed servers");
        Ok(servers)
    }

    /// Get the persisted record of a server
    #[tracing::instrument(skip(self))]
    pub fn record(&self, tenant: &str, name: &str) -> Result<ServerRecord> {
        let key = self.existing_key(tenant, name)?;
        Ok(self.supervisor.store().load(&key))
    }

    /// Read the tail of a server's log.
    ///
    /// At most `logTailBytes` bytes are returned; a server without a log
    /// yields an empty tail.
    #[tracing::instrument(skip(self))]
    pub fn log_tail(&self, tenant: &str, name: &str) -> Result<Vec<u8>> {
        let key = self.existing_key(tenant, name)?;
        LogSink::new(self.supervisor.paths(&key).log())
            .tail(self.supervisor.config().log_tail_bytes)
    }

    /// Count the servers of `tenant`
    #[tracing::instrument(skip(self))]
    pub fn stats(&self, tenant: &str) -> Result<TenantStats> {
        let keys = self.server_keys(tenant)?;
        let mut running_servers = 0;
        for key in &keys {
            if self.supervisor.registry().contains(key)? {
                running_servers += 1;
            }
        }
        Ok(TenantStats {
            total_servers: keys.len(),
            running_servers,
        })
    }

    /// Probe the registry and the liveness of registered processes
    #[tracing::instrument(skip(self))]
    pub fn health(&self) -> Result<HealthReport> {
        let handles = self.supervisor.registry().handles()?;
        let live_processes = handles
            .iter()
            .filter(|handle| process::is_alive(handle.pid()))
            .count();
        Ok(HealthReport {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            total_processes: handles.len(),
            live_processes,
        })
    }

    fn existing_key(&self, tenant: &str, name: &str) -> Result<ServerKey> {
        let key = ServerKey::new(tenant, name)?;
        if !self.supervisor.paths(&key).dir().is_dir() {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(key)
    }

    fn server_keys(&self, tenant: &str) -> Result<Vec<ServerKey>> {
        check_component(tenant)?;
        let dir = tenant_dir(&self.supervisor.config().servers_root, tenant);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match ServerKey::new(tenant, name) {
                Ok(key) => keys.push(key),
                Err(e) => tracing::debug!(error = %e, "Skipping unusable directory"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn has_files(&self, key: &ServerKey) -> bool {
        let paths = self.supervisor.paths(key);
        if paths.archive().is_file() {
            return true;
        }
        let extension = OsStr::new(&self.supervisor.config().runtime.extension);
        std::fs::read_dir(paths.dir())
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .any(|path| path.is_file() && path.extension() == Some(extension))
            })
            .unwrap_or(false)
    }
}
