use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const BANNER_WIDTH: usize = 60;

/// Append-only log of one server.
///
/// Supervisor lines and the child's stdout/stderr share the same file.
#[derive(Debug, Clone)]
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    /// Create a sink writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a timestamped line.
    ///
    /// Failures are traced and otherwise ignored.
    pub fn line(&self, message: impl Display) {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.append_raw(format!("[{}] {}\n", stamp, message).as_bytes());
    }

    /// Append a separator followed by a timestamped line.
    pub fn banner(&self, message: impl Display) {
        self.append_raw(format!("\n{}\n", "=".repeat(BANNER_WIDTH)).as_bytes());
        self.line(message);
    }

    /// Append bytes verbatim.
    pub fn append_raw(&self, bytes: &[u8]) {
        let result = self.open().and_then(|mut file| file.write_all(bytes));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write server log");
        }
    }

    /// Two append handles for a child's stdout and stderr.
    pub fn stdio(&self) -> Result<(File, File)> {
        let stdout = self.open()?;
        let stderr = stdout.try_clone()?;
        Ok((stdout, stderr))
    }

    /// Read at most the last `max_bytes` bytes of the log.
    ///
    /// A missing log reads as empty.
    pub fn tail(&self, max_bytes: u64) -> Result<Vec<u8>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        let start = len.saturating_sub(max_bytes);
        file.seek(SeekFrom::Start(start))?;

        let mut buf = Vec::with_capacity((len - start) as usize);
        file.take(max_bytes).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn open(&self) -> std::io::Result<File> {
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}
