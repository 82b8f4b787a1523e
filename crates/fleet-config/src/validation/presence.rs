use crate::schema::FleetConfig;

use super::helpers::validate_range;

/// Validate presence constraints.
pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &FleetConfig) {
    let presence = &config.presence;

    if presence.channel.trim().is_empty() {
        errors.push("presence.channel must not be empty".into());
    }

    validate_range(
        errors,
        "presence.reconnect_base_delay_ms",
        presence.reconnect_base_delay_ms,
        100,
        60_000,
    );
    validate_range(
        errors,
        "presence.reconnect_max_delay_ms",
        presence.reconnect_max_delay_ms,
        1000,
        300_000,
    );
    if presence.reconnect_base_delay_ms > presence.reconnect_max_delay_ms {
        errors.push(format!(
            "presence.reconnect_base_delay_ms ({}) exceeds presence.reconnect_max_delay_ms ({})",
            presence.reconnect_base_delay_ms, presence.reconnect_max_delay_ms
        ));
    }
    validate_range(
        errors,
        "presence.connect_timeout_secs",
        presence.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "presence.socket_heartbeat_secs",
        presence.socket_heartbeat_secs,
        5,
        120,
    );
}
