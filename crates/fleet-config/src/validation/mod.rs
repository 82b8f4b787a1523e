//! Configuration validation.
//!
//! Each check pushes a message into a shared list; all failures are
//! reported together in a single `ConfigError`.

mod helpers;
mod presence;


use crate::schema::FleetConfig;
use fleet_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &FleetConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    presence::validate_presence(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
