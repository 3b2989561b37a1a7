use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind assigned to servers created without one.
pub const DEFAULT_KIND: &str = "web";
/// Port assigned to servers created without one.
pub const DEFAULT_PORT: u16 = 8080;

/// Persisted status of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// No process is supervised for the server
    #[default]
    Stopped,
    /// A process was spawned and has not been reconciled as exited
    Running,
}

/// Durable record of a server, stored as `config.json` in its directory.
///
/// `pid` is only meaningful while `status` is [`ServerStatus::Running`];
/// the monitor task clears it shortly after the process exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerRecord {
    /// Name the server was created with
    pub name: String,
    /// Name shown to the tenant
    pub display_name: String,
    /// Filesystem name of the server directory
    pub safe_name: String,
    /// Server kind, e.g. `web`
    #[serde(rename = "type")]
    pub kind: String,
    /// Advisory port, passed to the process as `PORT`
    pub port: u16,
    /// Persisted status
    pub status: ServerStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last successful start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// OS process id while running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl Default for ServerRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: String::new(),
            safe_name: String::new(),
            kind: DEFAULT_KIND.to_string(),
            port: DEFAULT_PORT,
            status: ServerStatus::Stopped,
            created_at: Utc::now(),
            started_at: None,
            pid: None,
        }
    }
}

impl ServerRecord {
    /// Record for a newly created server
    pub fn new(display_name: &str, safe_name: &str, kind: &str, port: u16) -> Self {
        Self {
            name: display_name.to_string(),
            display_name: display_name.to_string(),
            safe_name: safe_name.to_string(),
            kind: kind.to_string(),
            port,
            ..Self::default()
        }
    }

    /// Stand-in used when the persisted record is missing or unreadable
    pub fn fallback(safe_name: &str) -> Self {
        Self::new(safe_name, safe_name, DEFAULT_KIND, DEFAULT_PORT)
    }

    /// Check whether the record says a process is running
    pub fn is_running(&self) -> bool {
        self.status == ServerStatus::Running
    }

    pub(crate) fn mark_running(&mut self, pid: u32, at: DateTime<Utc>) {
        self.status = ServerStatus::Running;
        self.pid = Some(pid);
        self.started_at = Some(at);
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.status = ServerStatus::Stopped;
        self.pid = None;
    }
}
