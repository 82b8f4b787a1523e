//! Where the config file lives and how the first one gets written.

use std::path::{Path, PathBuf};

use fleet_common::ConfigError;
use tracing::info;

use super::template::default_config_toml;

const APP_DIR: &str = "fleet";
const FILE_NAME: &str = "presence.toml";

fn io_error(action: &str, path: &Path, e: std::io::Error) -> ConfigError {
    ConfigError::ParseError(format!("failed to {action} {}: {e}", path.display()))
}

/// `<platform config dir>/fleet/presence.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))?;
    Ok(base.join(APP_DIR).join(FILE_NAME))
}

/// Write the commented default config to `path`, creating parent dirs.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_error("create", dir, e))?;
    }
    std::fs::write(path, default_config_toml()).map_err(|e| io_error("write", path, e))?;
    info!(path = %path.display(), "wrote default presence config");
    Ok(())
}
