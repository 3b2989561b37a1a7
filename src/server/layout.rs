use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

const ARCHIVE_FILE: &str = "server.zip";
const EXTRACT_DIR: &str = "extracted";
const RECORD_FILE: &str = "config.json";
const LOG_FILE: &str = "logs.txt";

/// Identifies one server of one tenant.
///
/// Both parts are validated as single path components on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerKey {
    tenant: String,
    server: String,
}

impl ServerKey {
    /// Build a key, rejecting names that are not plain path components.
    pub fn new(tenant: impl Into<String>, server: impl Into<String>) -> Result<Self> {
        let tenant = tenant.into();
        let server = server.into();
        check_component(&tenant)?;
        check_component(&server)?;
        Ok(Self { tenant, server })
    }

    /// Get the tenant id
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Get the server's filesystem name
    pub fn server(&self) -> &str {
        &self.server
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.server)
    }
}

/// Reject names that would escape or alias a directory.
pub(crate) fn check_component(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(Error::InvalidName(format!("'{}'", name)));
    }
    Ok(())
}

/// Derive the filesystem name for a server from its display name.
///
/// ```
/// use server_host::server::safe_name;
///
/// assert_eq!(safe_name(" my web/app "), "my_web_app");
/// ```
pub fn safe_name(display_name: &str) -> String {
    display_name.trim().replace([' ', '/', '\\'], "_")
}

/// Paths making up a server's on-disk tree.
#[derive(Debug, Clone)]
pub struct ServerPaths {
    dir: PathBuf,
}

impl ServerPaths {
    /// Paths for `key` under the servers root.
    pub fn new(root: &Path, key: &ServerKey) -> Self {
        Self {
            dir: tenant_dir(root, key.tenant()).join(key.server()),
        }
    }

    /// Server directory; the working directory when no archive was uploaded.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Uploaded package archive.
    pub fn archive(&self) -> PathBuf {
        self.dir.join(ARCHIVE_FILE)
    }

    /// Extraction target for the archive.
    pub fn extracted(&self) -> PathBuf {
        self.dir.join(EXTRACT_DIR)
    }

    /// Persisted server record.
    pub fn record(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    /// Append-only server log.
    pub fn log(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }
}

/// Directory holding all servers of a tenant.
pub fn tenant_dir(root: &Path, tenant: &str) -> PathBuf {
    root.join(tenant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rejects_path_tricks() {
        assert!(ServerKey::new("alice", "demo").is_ok());
        assert!(matches!(ServerKey::new("alice", ".."), Err(Error::InvalidName(_))));
        assert!(matches!(ServerKey::new("", "demo"), Err(Error::InvalidName(_))));
        assert!(matches!(ServerKey::new("alice", "a/b"), Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_paths_layout() {
        let key = ServerKey::new("alice", "demo").unwrap();
        let paths = ServerPaths::new(Path::new("/srv"), &key);

        assert_eq!(paths.dir(), Path::new("/srv/alice/demo"));
        assert_eq!(paths.archive(), PathBuf::from("/srv/alice/demo/server.zip"));
        assert_eq!(paths.extracted(), PathBuf::from("/srv/alice/demo/extracted"));
        assert_eq!(paths.record(), PathBuf::from("/srv/alice/demo/config.json"));
        assert_eq!(paths.log(), PathBuf::from("/srv/alice/demo/logs.txt"));
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("demo"), "demo");
        assert_eq!(safe_name("a b\\c"), "a_b_c");
    }
}
