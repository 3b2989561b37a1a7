#![allow(dead_code)]

use server_host::config::{HostConfig, RuntimeConfig};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A POSIX shell runtime, so process tests do not need Python.
pub fn shell_runtime() -> RuntimeConfig {
    RuntimeConfig {
        interpreter: "sh".to_string(),
        interpreter_args: vec![],
        extension: "sh".to_string(),
        entrypoints: strings(&["main.sh", "start.sh"]),
        main_marker: "# entrypoint".to_string(),
        manifest: "deps.txt".to_string(),
        install_command: strings(&["sh", "-c", "cp deps.txt installed.txt"]),
        placeholder_name: "placeholder.sh".to_string(),
        placeholder_source: "while true; do sleep 1; done\n".to_string(),
    }
}

/// Host configuration rooted at `root` using [`shell_runtime`].
pub fn shell_config(root: &Path) -> HostConfig {
    HostConfig {
        servers_root: root.to_path_buf(),
        install_timeout_ms: 5_000,
        delete_backoff_ms: 10,
        runtime: shell_runtime(),
        ..HostConfig::default()
    }
}

/// Build an in-memory zip archive.
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in files {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Poll `condition` every 50ms until it holds or `limit` passes.
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
