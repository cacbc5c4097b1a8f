//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::BridgeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, value } => write!(f, "Invalid value for {}: {:?}", var, value),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Build the effective configuration: optional file, then environment
/// overrides, then validation.
pub fn load(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    load_from(path, |key| std::env::var(key).ok())
}

fn load_from<F>(path: Option<&Path>, lookup: F) -> Result<BridgeConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => BridgeConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the externally supplied process settings.
///
/// `lookup` abstracts the environment so tests don't mutate process state.
pub fn apply_env_overrides<F>(config: &mut BridgeConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        config.listener.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var: "PORT", value: port.clone() })?;
    }
    if let Some(dir) = lookup("DATA_DIR") {
        config.storage.data_dir = PathBuf::from(dir);
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.observability.log_level = level.to_lowercase();
    }
    if let Some(minutes) = lookup("MEMORY_CHECK_INTERVAL") {
        config.supervisor.interval_minutes = minutes
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var: "MEMORY_CHECK_INTERVAL", value: minutes.clone() })?;
    }
    if let Some(secret) = lookup("ENCRYPTION_SECRET") {
        config.secrets.encryption_secret = Some(secret);
    }
    if let Some(prefix) = lookup("DAV_PREFIX") {
        config.dav.prefix = prefix;
    }
    if let Some(origin) = lookup("CORS_ORIGIN") {
        config.dav.cors_origin = origin.clone();
        config.cors.allowed_origins = origin.split(',').map(|o| o.trim().to_string()).collect();
    }
    Ok(())
}
