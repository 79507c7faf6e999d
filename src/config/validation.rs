use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_log_level(config)?;
    validate_usage(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if !server.base_path.is_empty() && !server.base_path.starts_with('/') {
        return Err(validation_err("server.base_path must start with '/'"));
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if !upstream.base_url.starts_with("http://") && !upstream.base_url.starts_with("https://") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    if upstream.api_key.trim().is_empty() {
        return Err(validation_err("upstream.api_key cannot be empty"));
    }
    if upstream
        .default_model
        .as_deref()
        .is_some_and(|model| model.trim().is_empty())
    {
        return Err(validation_err("upstream.default_model cannot be empty"));
    }
    for (from, to) in &upstream.model_map {
        if from.trim().is_empty() || to.trim().is_empty() {
            return Err(validation_err(
                "upstream.model_map entries cannot be empty",
            ));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_usage(config: &AppConfig) -> Result<(), ConfigError> {
    let usage = &config.usage;
    if usage.context_window == 0 {
        return Err(validation_err("usage.context_window must be greater than 0"));
    }
    if !(usage.input_cost_per_million >= 0.0 && usage.output_cost_per_million >= 0.0) {
        return Err(validation_err(
            "usage cost rates must be non-negative numbers",
        ));
    }
    Ok(())
}
