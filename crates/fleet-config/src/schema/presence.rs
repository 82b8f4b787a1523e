//! Presence connection configuration.

use serde::{Deserialize, Serialize};

/// Environment variable that overrides `presence.api_key`.
pub const API_KEY_ENV: &str = "FLEET_PRESENCE_API_KEY";

/// Presence system configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub enabled: bool,
    /// Supabase project reference, used to build the realtime URL.
    pub project_ref: String,
    /// Publishable api key. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Full WebSocket URL; overrides `project_ref` when set.
    pub url: Option<String>,
    /// Realtime channel that carries presence.
    pub channel: String,
    /// Network quality hint (`slow`, `medium`, `fast`, `2g`, `3g`, `4g`).
    pub network_quality: Option<String>,
    pub reconnect_base_delay_ms: u32,
    pub reconnect_max_delay_ms: u32,
    pub connect_timeout_secs: u32,
    /// Socket-level keepalive interval.
    pub socket_heartbeat_secs: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project_ref: String::new(),
            api_key: String::new(),
            url: None,
            channel: "fleet-presence".into(),
            network_quality: None,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30_000,
            connect_timeout_secs: 15,
            socket_heartbeat_secs: 25,
        }
    }
}

impl std::fmt::Debug for PresenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceConfig")
            .field("enabled", &self.enabled)
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field("url", &self.url)
            .field("channel", &self.channel)
            .field("network_quality", &self.network_quality)
            .field("reconnect_base_delay_ms", &self.reconnect_base_delay_ms)
            .field("reconnect_max_delay_ms", &self.reconnect_max_delay_ms)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("socket_heartbeat_secs", &self.socket_heartbeat_secs)
            .finish()
    }
}

impl PresenceConfig {
    /// The api key, preferring the environment over the file.
    pub fn resolved_api_key(&self) -> String {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| self.api_key.clone())
    }

    /// WebSocket endpoint, or `None` when neither `url` nor `project_ref` is set.
    pub fn endpoint(&self) -> Option<String> {
        if let Some(url) = self.url.as_ref().filter(|u| !u.is_empty()) {
            return Some(url.clone());
        }
        if self.project_ref.is_empty() {
            return None;
        }
        Some(format!(
            "wss://{}.supabase.co/realtime/v1/websocket",
            self.project_ref
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_prefers_explicit_url() {
        let config = PresenceConfig {
            project_ref: "abc".into(),
            url: Some("ws://localhost:4000/socket/websocket".into()),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint().as_deref(),
            Some("ws://localhost:4000/socket/websocket")
        );
    }

    #[test]
    fn endpoint_from_project_ref() {
        let config = PresenceConfig {
            project_ref: "abc".into(),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint().as_deref(),
            Some("wss://abc.supabase.co/realtime/v1/websocket")
        );
    }

    #[test]
    fn endpoint_missing() {
        assert!(PresenceConfig::default().endpoint().is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = PresenceConfig {
            api_key: "secret-key".into(),
            ..Default::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
