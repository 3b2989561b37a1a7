//! Request and response types exchanged with the routing layer.
use crate::error::Error;
use crate::server::ServerRecord;
use crate::server::record::{DEFAULT_KIND, DEFAULT_PORT};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Package uploaded together with a new server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upload {
    /// Zip archive, stored as the server's archive and extracted on first start
    Archive(Vec<u8>),
    /// Single file stored in the server directory.
    ///
    /// A file name ending in `.zip` is stored as the archive instead.
    File {
        /// Plain file name, no directories
        file_name: String,
        /// File contents
        contents: Vec<u8>,
    },
}

/// Parameters of a create action
///
/// # Examples
///
/// ```
/// use server_host::CreateServer;
///
/// let request = CreateServer::new("My Bot").with_kind("worker").with_port(9000);
/// assert_eq!(request.kind, "worker");
/// assert!(request.upload.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateServer {
    /// Name shown to the tenant; the filesystem name is derived from it
    pub display_name: String,
    /// Server kind
    pub kind: String,
    /// Advisory port
    pub port: u16,
    /// Optional package
    pub upload: Option<Upload>,
}

impl CreateServer {
    /// A `web` server on the default port with no upload
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            kind: DEFAULT_KIND.to_string(),
            port: DEFAULT_PORT,
            upload: None,
        }
    }

    /// Set the server kind
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Set the advisory port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Attach a package
    pub fn with_upload(mut self, upload: Upload) -> Self {
        self.upload = Some(upload);
        self
    }
}

/// Result of a control action as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    /// Whether the action succeeded
    pub success: bool,
    /// Human-readable description
    pub message: String,
}

impl ActionOutcome {
    /// A successful outcome
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A failed outcome describing `error`
    pub fn failed(error: &Error) -> Self {
        Self {
            success: false,
            message: error.to_string(),
        }
    }
}

/// One entry of a tenant's server list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerSummary {
    /// Filesystem name
    pub name: String,
    /// Name shown to the tenant
    pub display_name: String,
    /// Whether a process is registered
    pub running: bool,
    /// Whether a package or runnable file was uploaded
    pub has_files: bool,
    /// Persisted record
    pub config: ServerRecord,
}

/// Server counts of one tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenantStats {
    /// Servers owned by the tenant
    pub total_servers: usize,
    /// Servers with a registered process
    pub running_servers: usize,
}

/// Liveness summary of the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// `healthy` when the registry is usable
    pub status: String,
    /// Time of the probe
    pub timestamp: DateTime<Utc>,
    /// Registered processes
    pub total_processes: usize,
    /// Registered processes whose pid still exists
    pub live_processes: usize,
}
