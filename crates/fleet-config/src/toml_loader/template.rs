use crate::schema::CONFIG_SCHEMA_VERSION;

/// Default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    format!(
        r##"# Fleet presence configuration
# Schema version {CONFIG_SCHEMA_VERSION}
# Only override what you want to change -- missing fields use defaults.

[presence]
# enabled = true
# project_ref = ""              # Supabase project reference
# api_key = ""                  # or set FLEET_PRESENCE_API_KEY
# url = ""                      # full websocket url, overrides project_ref
# channel = "fleet-presence"
# network_quality = "4g"        # slow, medium, fast, 2g, 3g, 4g (unset = unknown)
# reconnect_base_delay_ms = 1000    # 100-60000
# reconnect_max_delay_ms = 30000    # 1000-300000
# connect_timeout_secs = 15         # 1-120
# socket_heartbeat_secs = 25        # 5-120

[logging]
# level = "INFO"                # DEBUG, INFO, WARNING, ERROR
"##
    )
}
