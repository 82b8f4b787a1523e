//! Fleet presence configuration.
//!
//! TOML-based configuration with defaults for every field, so a partial
//! file (or none at all) works out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fleet_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{FleetConfig, LogLevel, LoggingConfig, PresenceConfig, CONFIG_SCHEMA_VERSION};
pub use toml_loader::{create_default_config, default_config_path, load_default, load_from_path};

use fleet_common::ConfigError;

/// Load config from the platform default path and validate it.
///
/// Creates a documented default file on first run.
pub fn load_config() -> Result<FleetConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &FleetConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
