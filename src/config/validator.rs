use crate::config::{Config, ServerConfiguration};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Smallest heap a server may be launched with, in megabytes.
pub const MIN_MEMORY_MEGABYTES: u32 = 512;

/// Validates the launch-relevant part of a configuration
pub fn validate_server_configuration(config: &ServerConfiguration) -> Result<()> {
    if config.memory_megabytes < MIN_MEMORY_MEGABYTES {
        return Err(Error::ConfigInvalid(format!(
            "Assigned memory is {} MB, the minimum is {} MB",
            config.memory_megabytes, MIN_MEMORY_MEGABYTES
        )));
    }

    if config.log_retention_days < -1 {
        return Err(Error::ConfigInvalid(format!(
            "Log retention of {} days is invalid, use -1 to disable",
            config.log_retention_days
        )));
    }

    Ok(())
}

/// Validates the server.properties parameters the wrapper depends on
pub fn validate_parameters(parameters: &HashMap<String, String>) -> Result<()> {
    let port = parameters
        .get("server-port")
        .map(|p| p.trim())
        .unwrap_or_default();

    if port.is_empty() || port == "0" {
        return Err(Error::ConfigInvalid(
            "server-port can not be empty or zero".to_string(),
        ));
    }

    port.parse::<u16>().map_err(|_| {
        Error::ConfigInvalid(format!("server-port '{}' is not a valid port", port))
    })?;

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(Error::ConfigInvalid("Server name is empty".to_string()));
    }

    if config.java_path.as_os_str().is_empty() {
        return Err(Error::ConfigInvalid("Java path is empty".to_string()));
    }

    validate_server_configuration(&config.server)?;
    validate_parameters(&config.parameters)?;

    Ok(())
}
