use crate::config::{HostConfig, RuntimeConfig};
use crate::error::{Error, Result};

/// Validates a package runtime
pub fn validate_runtime(runtime: &RuntimeConfig) -> Result<()> {
    if runtime.interpreter.trim().is_empty() {
        return Err(Error::ConfigInvalid("Runtime has empty interpreter".to_string()));
    }

    if runtime.extension.trim().is_empty() {
        return Err(Error::ConfigInvalid("Runtime has empty extension".to_string()));
    }

    if runtime.entrypoints.is_empty() {
        return Err(Error::ConfigInvalid("Runtime has no entrypoints".to_string()));
    }

    if runtime.install_command.is_empty() {
        return Err(Error::ConfigInvalid("Runtime has empty install command".to_string()));
    }

    let suffix = format!(".{}", runtime.extension);
    if !runtime.placeholder_name.ends_with(&suffix) {
        return Err(Error::ConfigInvalid(format!(
            "Placeholder '{}' does not end with '{}'",
            runtime.placeholder_name, suffix
        )));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &HostConfig) -> Result<()> {
    validate_runtime(&config.runtime)?;

    if config.log_tail_bytes == 0 {
        return Err(Error::ConfigInvalid("logTailBytes must be positive".to_string()));
    }

    if config.delete_attempts == 0 {
        return Err(Error::ConfigInvalid("deleteAttempts must be positive".to_string()));
    }

    Ok(())
}
