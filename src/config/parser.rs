use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const PYTHON_PLACEHOLDER: &str = r#"import os
import time
from http.server import BaseHTTPRequestHandler, HTTPServer


class Handler(BaseHTTPRequestHandler):
    def do_GET(self):
        body = f"<h1>Test Server</h1><p>Running at {time.ctime()}</p>".encode()
        self.send_response(200)
        self.send_header("Content-Type", "text/html")
        self.send_header("Content-Length", str(len(body)))
        self.end_headers()
        self.wfile.write(body)


if __name__ == "__main__":
    port = int(os.environ.get("PORT", "5000"))
    HTTPServer(("0.0.0.0", port), Handler).serve_forever()
"#;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// What the entrypoint resolver does when a working directory holds
/// no recognizable program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrypointFallback {
    /// Write the runtime's placeholder program and run it.
    #[default]
    Placeholder,
    /// Fail the start with [`Error::NoEntrypoint`].
    Fail,
}

/// How uploaded packages are executed and their dependencies installed.
///
/// The default describes a Python runtime.
///
/// # Examples
///
/// A shell runtime:
///
/// ```
/// use server_host::config::RuntimeConfig;
///
/// let runtime = RuntimeConfig {
///     interpreter: "sh".to_string(),
///     interpreter_args: vec![],
///     extension: "sh".to_string(),
///     entrypoints: vec!["main.sh".to_string()],
///     main_marker: "# main".to_string(),
///     manifest: "deps.txt".to_string(),
///     install_command: vec!["sh".to_string(), "-c".to_string(), "true".to_string()],
///     placeholder_name: "placeholder.sh".to_string(),
///     placeholder_source: "while true; do sleep 1; done\n".to_string(),
/// };
/// assert_eq!(runtime.entrypoints[0], "main.sh");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Program used to run the entrypoint.
    pub interpreter: String,
    /// Arguments placed before the entrypoint path.
    pub interpreter_args: Vec<String>,
    /// File extension (without the dot) of runnable scripts.
    pub extension: String,
    /// Canonical entrypoint names, in order of precedence.
    pub entrypoints: Vec<String>,
    /// Text that marks a script as runnable as a main program.
    pub main_marker: String,
    /// Dependency manifest that triggers installation when present.
    pub manifest: String,
    /// Command run in the working directory to install dependencies.
    pub install_command: Vec<String>,
    /// File name of the synthesized placeholder program.
    pub placeholder_name: String,
    /// Contents of the synthesized placeholder program.
    pub placeholder_source: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: strings(&["-u"]),
            extension: "py".to_string(),
            entrypoints: strings(&[
                "main.py",
                "app.py",
                "bot.py",
                "server.py",
                "index.py",
                "start.py",
            ]),
            main_marker: "__main__".to_string(),
            manifest: "requirements.txt".to_string(),
            install_command: strings(&["python3", "-m", "pip", "install", "-r", "requirements.txt"]),
            placeholder_name: "test_server.py".to_string(),
            placeholder_source: PYTHON_PLACEHOLDER.to_string(),
        }
    }
}

/// Main configuration for the server host.
///
/// Every field has a default, so an empty JSON object is a valid
/// configuration.
///
/// # JSON Schema
///
/// ```json
/// {
///   "serversRoot": "/var/lib/server-host",
///   "stopGraceMs": 2000,
///   "killWaitMs": 1000,
///   "installTimeoutMs": 300000,
///   "logTailBytes": 10000,
///   "deleteAttempts": 5,
///   "deleteBackoffMs": 200,
///   "entrypointFallback": "placeholder",
///   "runtime": { "interpreter": "python3" }
/// }
/// ```
///
/// # Examples
///
/// ```
/// use server_host::config::HostConfig;
/// use std::time::Duration;
///
/// let config = HostConfig::parse_from_str(r#"{ "stopGraceMs": 500 }"#).unwrap();
/// assert_eq!(config.stop_grace(), Duration::from_millis(500));
/// assert_eq!(config.runtime.interpreter, "python3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    /// Directory holding `<tenant>/<server>/` trees.
    pub servers_root: PathBuf,
    /// Wait after the graceful termination request, in milliseconds.
    pub stop_grace_ms: u64,
    /// Wait after the forceful kill, in milliseconds.
    pub kill_wait_ms: u64,
    /// Upper bound on dependency installation, in milliseconds.
    pub install_timeout_ms: u64,
    /// Size of the window returned by log tail queries.
    pub log_tail_bytes: u64,
    /// Directory removal attempts made by delete.
    pub delete_attempts: u32,
    /// Initial backoff between removal attempts, doubled after each failure.
    pub delete_backoff_ms: u64,
    /// Behavior when no entrypoint is found.
    pub entrypoint_fallback: EntrypointFallback,
    /// Package runtime.
    pub runtime: RuntimeConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            servers_root: PathBuf::from("servers"),
            stop_grace_ms: 2_000,
            kill_wait_ms: 1_000,
            install_timeout_ms: 300_000,
            log_tail_bytes: 10_000,
            delete_attempts: 5,
            delete_backoff_ms: 200,
            entrypoint_fallback: EntrypointFallback::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl HostConfig {
    /// Loads a configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON
    /// * The JSON does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        Self::parse_from_str(&content)
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Grace period between the termination request and the forceful kill.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Wait after the forceful kill before reporting a termination failure.
    pub fn kill_wait(&self) -> Duration {
        Duration::from_millis(self.kill_wait_ms)
    }

    /// Upper bound on dependency installation.
    pub fn install_timeout(&self) -> Duration {
        Duration::from_millis(self.install_timeout_ms)
    }

    /// Initial backoff between directory removal attempts.
    pub fn delete_backoff(&self) -> Duration {
        Duration::from_millis(self.delete_backoff_ms)
    }
}
