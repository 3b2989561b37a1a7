use crate::error::{Error, Result};
use crate::server::layout::{ServerKey, ServerPaths};
use crate::server::record::ServerRecord;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Loads and persists server records.
///
/// Reads never fail: a missing or corrupt record is replaced by
/// [`ServerRecord::fallback`]. Writes go to a temporary file in the server
/// directory which is then renamed over the record, so concurrent readers
/// see either the old or the new record in full.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    /// Create a store over the servers root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Servers root this store reads from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the record for `key`, healing missing or corrupt state.
    #[tracing::instrument(skip(self), fields(server = %key))]
    pub fn load(&self, key: &ServerKey) -> ServerRecord {
        let path = ServerPaths::new(&self.root, key).record();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No persisted record, using defaults");
                return ServerRecord::fallback(key.server());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read record, using defaults");
                return ServerRecord::fallback(key.server());
            }
        };

        match serde_json::from_str::<ServerRecord>(&content) {
            Ok(mut record) => {
                if record.safe_name.is_empty() {
                    record.safe_name = key.server().to_string();
                }
                if record.display_name.is_empty() {
                    record.display_name = record.safe_name.clone();
                }
                record
            }
            Err(e) => {
                let error = Error::CorruptConfig(format!("{}: {}", path.display(), e));
                tracing::warn!(error = %error, "Replacing corrupt record with defaults");
                ServerRecord::fallback(key.server())
            }
        }
    }

    /// Atomically replace the record for `key`.
    ///
    /// The server directory must already exist; saving never recreates a
    /// deleted server.
    #[tracing::instrument(skip(self, record), fields(server = %key, status = ?record.status))]
    pub fn save(&self, key: &ServerKey, record: &ServerRecord) -> Result<()> {
        let paths = ServerPaths::new(&self.root, key);
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::Other(format!("Failed to serialize record: {}", e)))?;

        let mut tmp = NamedTempFile::new_in(paths.dir())?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(paths.record()).map_err(|e| Error::Io(e.error))?;

        tracing::trace!("Record saved");
        Ok(())
    }

    /// Load, modify and save the record for `key`.
    pub fn update<F>(&self, key: &ServerKey, f: F) -> Result<ServerRecord>
    where
        F: FnOnce(&mut ServerRecord),
    {
        let mut record = self.load(key);
        f(&mut record);
        self.save(key, &record)?;
        Ok(record)
    }
}
