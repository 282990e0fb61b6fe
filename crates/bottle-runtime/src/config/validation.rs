//! Configuration validation utilities.

use tokio::sync::Semaphore;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BottleConfig, DispatchConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BottleConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_dispatch_config(&config.dispatch)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.output is \"file\" but logging.file_path is not set",
        ));
    }

    if logging.max_files == 0 {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.state_source_key.trim().is_empty() {
        return Err(ConfigError::validation(
            "dispatch.state_source_key must not be empty",
        ));
    }

    if dispatch.max_concurrent_events == 0 {
        return Err(ConfigError::validation(
            "dispatch.max_concurrent_events must be greater than 0",
        ));
    }

    if dispatch.max_concurrent_events > Semaphore::MAX_PERMITS {
        return Err(ConfigError::validation(format!(
            "dispatch.max_concurrent_events must not exceed {}",
            Semaphore::MAX_PERMITS
        )));
    }

    Ok(())
}
