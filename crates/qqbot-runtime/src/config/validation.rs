//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    ArchiveBackend, ArchiveConfig, DispatchConfig, GatewayConfig, LogOutput, LoggingConfig,
    QQBotConfig, ServerConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &QQBotConfig) -> ConfigResult<()> {
    validate_server_config(&config.server)?;
    validate_gateway_config(&config.gateway)?;
    validate_dispatch_config(&config.dispatch)?;
    validate_archive_config(&config.archive)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_server_config(server: &ServerConfig) -> ConfigResult<()> {
    if server.host.is_empty() {
        return Err(ConfigError::validation("Server host cannot be empty"));
    }
    validate_port(server.port)?;
    validate_path(&server.path)?;
    Ok(())
}

fn validate_gateway_config(gateway: &GatewayConfig) -> ConfigResult<()> {
    validate_url(&gateway.url)?;

    if gateway.timeout_ms == 0 {
        return Err(ConfigError::validation("Gateway timeout must be greater than 0"));
    }

    if gateway.retry.max_attempts == 0 {
        return Err(ConfigError::validation("Gateway retry attempts must be at least 1"));
    }

    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.selection_ttl_secs == 0 {
        return Err(ConfigError::validation("Selection TTL must be greater than 0"));
    }
    Ok(())
}

fn validate_archive_config(archive: &ArchiveConfig) -> ConfigResult<()> {
    if archive.backend == ArchiveBackend::File && archive.path.as_os_str().is_empty() {
        return Err(ConfigError::validation("File archive requires archive.path"));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation("File log output requires logging.file_path"));
    }
    Ok(())
}

/// Validates an HTTP(S) URL.
fn validate_url(url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::invalid_url(url, "URL cannot be empty"));
    }

    let valid_schemes = ["http://", "https://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {valid_schemes:?}"),
        ));
    }

    Ok(())
}

fn validate_port(port: u16) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::InvalidPort(port));
    }
    Ok(())
}

fn validate_path(path: &str) -> ConfigResult<()> {
    if !path.starts_with('/') {
        return Err(ConfigError::validation("Path must start with '/'"));
    }
    Ok(())
}
