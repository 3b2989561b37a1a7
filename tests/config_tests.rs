use assert_fs::TempDir;
use assert_fs::prelude::*;
use server_host::config::{EntrypointFallback, HostConfig, validate_config};
use server_host::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_parse_config_file() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let file = dir.child("host.json");
    file.write_str(
        r#"{
            "serversRoot": "/srv/tenants",
            "stopGraceMs": 500,
            "killWaitMs": 250,
            "installTimeoutMs": 60000,
            "logTailBytes": 2048,
            "deleteAttempts": 3,
            "entrypointFallback": "fail",
            "runtime": {
                "interpreter": "python3.12",
                "manifest": "reqs.txt"
            }
        }"#,
    )
    .unwrap();

    let config = HostConfig::from_file(file.path())?;

    assert_eq!(config.servers_root, PathBuf::from("/srv/tenants"));
    assert_eq!(config.stop_grace(), Duration::from_millis(500));
    assert_eq!(config.kill_wait(), Duration::from_millis(250));
    assert_eq!(config.install_timeout(), Duration::from_secs(60));
    assert_eq!(config.log_tail_bytes, 2048);
    assert_eq!(config.delete_attempts, 3);
    assert_eq!(config.entrypoint_fallback, EntrypointFallback::Fail);
    assert_eq!(config.runtime.interpreter, "python3.12");
    assert_eq!(config.runtime.manifest, "reqs.txt");
    assert_eq!(config.runtime.extension, "py");

    validate_config(&config)?;
    Ok(())
}

#[test]
fn test_missing_config_file() {
    let result = HostConfig::from_file("/definitely/not/here/host.json");
    assert!(matches!(result, Err(Error::ConfigParse(_))));
}

#[test]
fn test_default_config_is_valid() -> Result<()> {
    validate_config(&HostConfig::default())
}

#[test]
fn test_validation_rejects_unusable_values() {
    let mut config = HostConfig::default();
    config.runtime.interpreter = " ".to_string();
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    let mut config = HostConfig::default();
    config.runtime.entrypoints.clear();
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    let mut config = HostConfig::default();
    config.runtime.placeholder_name = "placeholder.sh".to_string();
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    let config = HostConfig {
        delete_attempts: 0,
        ..HostConfig::default()
    };
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    let config = HostConfig {
        log_tail_bytes: 0,
        ..HostConfig::default()
    };
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));
}
