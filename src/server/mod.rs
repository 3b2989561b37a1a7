/// Server management module for Server Host.
///
/// This module stages uploaded packages, runs them as supervised child
/// processes and keeps their persisted records in line with what is
/// actually running. Public operations are instrumented with `tracing` spans.
///
/// # Components
///
/// * `layout` - Keys and on-disk paths of a server
/// * `record` / `store` - The persisted server record and its atomic store
/// * `log` - Per-server append-only log
/// * `stager` - Archive extraction and dependency installation
/// * `entrypoint` - Selection of the program to run
/// * `process` / `registry` - Live process handles and their registry
/// * `supervisor` - Start, stop, restart and delete
///
/// # Examples
///
/// Starting and stopping a server that already has a directory:
///
/// ```no_run
/// use server_host::config::HostConfig;
/// use server_host::server::{ServerKey, Supervisor};
///
/// # async fn run() -> server_host::Result<()> {
/// let supervisor = Supervisor::new(HostConfig::default());
/// let key = ServerKey::new("alice", "demo")?;
///
/// let report = supervisor.start(&key).await?;
/// println!("Started pid {}", report.pid);
///
/// supervisor.stop(&key).await?;
/// # Ok(())
/// # }
/// ```
pub mod entrypoint;
pub mod layout;
pub mod log;
pub mod process;
pub mod record;
pub mod registry;
pub mod stager;
pub mod store;
pub mod supervisor;

pub use entrypoint::EntrypointResolver;
pub use layout::{ServerKey, ServerPaths, safe_name, tenant_dir};
pub use log::LogSink;
pub use process::{ExitInfo, ExitNotifier, ProcessHandle, ProcessId};
pub use record::{ServerRecord, ServerStatus};
pub use registry::ProcessRegistry;
pub use stager::{InstallOutcome, PackageStager, StageReport};
pub use store::ConfigStore;
pub use supervisor::{StartReport, StopOutcome, Supervisor};
