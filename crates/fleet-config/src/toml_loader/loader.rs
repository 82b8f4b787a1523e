//! Reading `FleetConfig` from disk.

use std::io::ErrorKind;
use std::path::Path;

use fleet_common::ConfigError;
use tracing::{info, warn};

use super::paths::{create_default_config, default_config_path};
use crate::schema::FleetConfig;
use crate::validation;

/// Parse the TOML file at `path`.
///
/// Missing keys take their defaults. Out-of-range values are logged but
/// the config is still returned; callers that must reject them run
/// [`validation::validate`] themselves.
pub fn load_from_path(path: &Path) -> Result<FleetConfig, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };

    let config: FleetConfig = toml::from_str(&text)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), "config has problems: {e}");
    }
    info!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Load from [`default_config_path`]. The first run writes a commented
/// default file there and returns the defaults.
pub fn load_default() -> Result<FleetConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            create_default_config(&path)?;
            Ok(FleetConfig::default())
        }
        other => other,
    }
}
