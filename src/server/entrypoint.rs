use crate::config::{EntrypointFallback, RuntimeConfig};
use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Picks the program to run in a working directory.
///
/// Resolution order:
/// 1. the runtime's canonical names, first match wins
/// 2. a depth-first scan sorted by file name for a script containing the
///    runtime's main marker, skipping names starting with `_`
/// 3. the fallback policy: write the placeholder program, or fail
#[derive(Debug, Clone)]
pub struct EntrypointResolver {
    runtime: RuntimeConfig,
    fallback: EntrypointFallback,
}

impl EntrypointResolver {
    /// Create a resolver for `runtime`
    pub fn new(runtime: RuntimeConfig, fallback: EntrypointFallback) -> Self {
        Self { runtime, fallback }
    }

    /// Resolve the entrypoint of `workdir`.
    ///
    /// # Errors
    ///
    /// * [`Error::NoEntrypoint`] when nothing matches and the fallback is
    ///   [`EntrypointFallback::Fail`]
    /// * [`Error::Io`] when the placeholder cannot be written
    #[tracing::instrument(skip(self), fields(workdir = %workdir.display()))]
    pub fn resolve(&self, workdir: &Path) -> Result<PathBuf> {
        if let Some(path) = self.canonical(workdir) {
            tracing::debug!(entrypoint = %path.display(), "Found canonical entrypoint");
            return Ok(path);
        }

        if let Some(path) = self.scan(workdir) {
            tracing::debug!(entrypoint = %path.display(), "Found entrypoint by scanning");
            return Ok(path);
        }

        match self.fallback {
            EntrypointFallback::Placeholder => self.placeholder(workdir),
            EntrypointFallback::Fail => Err(Error::NoEntrypoint(workdir.display().to_string())),
        }
    }

    fn canonical(&self, workdir: &Path) -> Option<PathBuf> {
        self.runtime
            .entrypoints
            .iter()
            .map(|name| workdir.join(name))
            .find(|path| path.is_file())
    }

    fn scan(&self, workdir: &Path) -> Option<PathBuf> {
        let extension = OsStr::new(&self.runtime.extension);
        WalkDir::new(workdir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension() == Some(extension))
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('_'))
            .find(|entry| {
                std::fs::read_to_string(entry.path())
                    .map(|content| content.contains(&self.runtime.main_marker))
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
    }

    fn placeholder(&self, workdir: &Path) -> Result<PathBuf> {
        let path = workdir.join(&self.runtime.placeholder_name);
        if !path.exists() {
            tracing::info!(placeholder = %path.display(), "No entrypoint found, writing placeholder");
            std::fs::write(&path, &self.runtime.placeholder_source)?;
        }
        Ok(path)
    }
}
