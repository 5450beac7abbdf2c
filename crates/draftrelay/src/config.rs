// Configuration loading and parsing (config/draftrelay.toml + ENDPOINT).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// draftrelay.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the whole config file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    server: ServerSection,
    database: DatabaseSection,
    #[serde(default)]
    transport: TransportSection,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerSection {
    #[serde(default = "default_bind")]
    bind: String,
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TransportSection {
    endpoint: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

/// The assembled runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub db_path: String,
    /// Push-gateway base URL. Required at startup: broadcasting is the whole
    /// point of the service, so running without a transport target is a
    /// configuration error, not something to discover per call.
    pub endpoint: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/draftrelay.toml` relative to
/// `base_dir`. `endpoint_override` (the `ENDPOINT` environment variable in
/// production) takes precedence over the file's `[transport].endpoint`.
pub fn load_config_from(
    base_dir: &Path,
    endpoint_override: Option<String>,
) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("draftrelay.toml");
    let text = read_file(&path)?;
    let file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let endpoint = endpoint_override
        .filter(|v| !v.trim().is_empty())
        .or(file.transport.endpoint);

    let config = Config {
        bind: file.server.bind,
        port: file.server.port,
        db_path: file.database.path,
        endpoint: endpoint.unwrap_or_default(),
    };

    validate(&config)?;

    Ok(config)
}

/// Convenience wrapper: loads config relative to the current working
/// directory, with `ENDPOINT` from the process environment.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    load_config_from(&cwd, std::env::var("ENDPOINT").ok())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.db_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    if config.endpoint.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "transport.endpoint".into(),
            message: "must be set ([transport].endpoint or the ENDPOINT environment variable)"
                .into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
