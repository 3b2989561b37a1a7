use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::server::layout::ServerPaths;
use crate::server::log::LogSink;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;
use zip::ZipArchive;

/// Result of dependency installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// No manifest in the working directory
    Skipped,
    /// The install command succeeded
    Installed,
    /// The install command exited unsuccessfully
    Failed {
        /// Exit code, if the command was not killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },
    /// The install command exceeded its time bound and was killed
    TimedOut,
    /// The install command could not be run
    Error(String),
}

/// Result of staging a server package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// Directory the process runs in
    pub workdir: PathBuf,
    /// Whether the archive was extracted during this call
    pub extracted: bool,
    /// Dependency installation result
    pub install: InstallOutcome,
}

/// Turns an uploaded package into a runnable working directory.
///
/// Nothing here fails a start: extraction and installation problems are
/// written to the server log and staging continues with what it has.
#[derive(Debug, Clone)]
pub struct PackageStager {
    runtime: RuntimeConfig,
    install_timeout: Duration,
}

impl PackageStager {
    /// Create a stager for `runtime`
    pub fn new(runtime: RuntimeConfig, install_timeout: Duration) -> Self {
        Self {
            runtime,
            install_timeout,
        }
    }

    /// Stage the package of the server at `paths`.
    ///
    /// An archive is extracted only when its target directory does not
    /// exist yet, so a package is unpacked at most once. The target appears
    /// only once extraction has finished; callers staging the same server
    /// concurrently must still serialize.
    #[tracing::instrument(skip(self, paths, log), fields(dir = %paths.dir().display()))]
    pub async fn stage(&self, paths: &ServerPaths, log: &LogSink) -> StageReport {
        let archive = paths.archive();
        if !archive.is_file() {
            log.line("No archive found, using server directory directly");
            let workdir = paths.dir().to_path_buf();
            let install = self.install_logged(&workdir, log).await;
            return StageReport {
                workdir,
                extracted: false,
                install,
            };
        }

        log.line(format!("Found archive: {}", archive.display()));
        let target = paths.extracted();
        let mut report = StageReport {
            workdir: target.clone(),
            extracted: false,
            install: InstallOutcome::Skipped,
        };

        if target.exists() {
            tracing::debug!("Archive already extracted");
            log.line("Archive already extracted, skipping extraction");
            return report;
        }

        log.line(format!("Extracting to: {}", target.display()));
        match extract(archive, target.clone()).await {
            Ok(()) => {
                report.extracted = true;
                report.install = self.install_logged(&target, log).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Extraction failed, continuing with partial contents");
                log.line(format!("Error extracting archive: {}", e));
            }
        }

        report
    }

    /// Run the runtime's install command if its manifest is present.
    ///
    /// # Errors
    ///
    /// * [`Error::StagingTimeout`] when the command outlives the bound; the
    ///   command is killed
    /// * [`Error::Io`] when the command cannot be launched
    pub async fn install_dependencies(&self, workdir: &Path) -> Result<InstallOutcome> {
        if !workdir.join(&self.runtime.manifest).is_file() {
            return Ok(InstallOutcome::Skipped);
        }

        let (program, args) = self
            .runtime
            .install_command
            .split_first()
            .ok_or_else(|| Error::ConfigInvalid("Runtime has empty install command".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match time::timeout(self.install_timeout, command.output()).await {
            Ok(output) => output?,
            Err(_) => return Err(Error::StagingTimeout(self.install_timeout)),
        };

        if output.status.success() {
            Ok(InstallOutcome::Installed)
        } else {
            Ok(InstallOutcome::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn install_logged(&self, workdir: &Path, log: &LogSink) -> InstallOutcome {
        let outcome = match self.install_dependencies(workdir).await {
            Ok(outcome) => outcome,
            Err(Error::StagingTimeout(after)) => {
                tracing::warn!(?after, "Dependency installation timed out");
                InstallOutcome::TimedOut
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dependency installation could not run");
                InstallOutcome::Error(e.to_string())
            }
        };

        match &outcome {
            InstallOutcome::Skipped => {}
            InstallOutcome::Installed => log.line("Dependencies installed"),
            InstallOutcome::Failed { code, stderr } => {
                log.line(format!("Dependency installation failed (exit code {:?})", code));
                if !stderr.is_empty() {
                    log.append_raw(format!("{}\n", stderr).as_bytes());
                }
            }
            InstallOutcome::TimedOut => log.line(format!(
                "Dependency installation timed out after {:?}",
                self.install_timeout
            )),
            InstallOutcome::Error(e) => log.line(format!("Error installing dependencies: {}", e)),
        }

        outcome
    }
}

async fn extract(archive: PathBuf, target: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || extract_archive(&archive, &target))
        .await
        .map_err(|e| Error::Other(format!("Extraction task failed: {}", e)))?
}

/// Unpack into a sibling temporary directory, then move it to `target`.
///
/// The move happens even when unpacking fails, so a broken archive leaves
/// its partial contents in place and is not retried.
fn extract_archive(archive: &Path, target: &Path) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| Error::Other(format!("No parent for {}", target.display())))?;
    let staging = tempfile::Builder::new()
        .prefix(".extracting-")
        .tempdir_in(parent)?;

    let unpacked = unpack(archive, staging.path());
    std::fs::rename(staging.path(), target)?;
    unpacked
}

fn unpack(archive: &Path, target: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| Error::Other(format!("Failed to open archive: {}", e)))?;
    zip.extract(target)
        .map_err(|e| Error::Other(format!("Failed to extract archive: {}", e)))
}
