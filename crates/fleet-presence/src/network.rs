//! Network-quality driven presence timing.
//!
//! The host supplies a coarse quality hint; the monitor maps it to a
//! [`PresenceConfig`] and publishes changes over a watch channel so the
//! heartbeat can reschedule.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Coarse network quality as reported by the host environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NetworkQuality {
    Slow,
    Medium,
    Fast,
    #[default]
    Unknown,
}

impl NetworkQuality {
    /// Parse a host hint. Accepts the quality names and effective
    /// connection types (`slow-2g`, `2g`, `3g`, `4g`); anything else,
    /// including no hint at all, is `Unknown`.
    pub fn from_hint(hint: Option<&str>) -> Self {
        let Some(hint) = hint else {
            return Self::Unknown;
        };
        match hint.trim().to_ascii_lowercase().as_str() {
            "slow" | "slow-2g" | "2g" => Self::Slow,
            "medium" | "3g" => Self::Medium,
            "fast" | "4g" => Self::Fast,
            _ => Self::Unknown,
        }
    }

    /// Timing table for this quality.
    pub fn presence_config(self) -> PresenceConfig {
        let (heartbeat, timeout, max_retries) = match self {
            Self::Slow => (30, 90, 2),
            Self::Medium => (20, 60, 3),
            Self::Fast => (10, 30, 5),
            Self::Unknown => (15, 45, 3),
        };
        PresenceConfig {
            heartbeat_interval: Duration::from_secs(heartbeat),
            presence_timeout: Duration::from_secs(timeout),
            max_retries,
        }
    }
}

impl std::fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::Medium => write!(f, "medium"),
            Self::Fast => write!(f, "fast"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Presence timing derived from network quality.
///
/// `heartbeat_interval` is always shorter than `presence_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    pub heartbeat_interval: Duration,
    pub presence_timeout: Duration,
    pub max_retries: u32,
}

impl PresenceConfig {
    /// Beats closer together than this are suppressed.
    pub fn debounce_window(&self) -> Duration {
        self.heartbeat_interval.mul_f64(0.8)
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        NetworkQuality::Unknown.presence_config()
    }
}

/// Holds the current quality and publishes derived config changes.
pub struct NetworkQualityMonitor {
    quality: watch::Sender<NetworkQuality>,
    config: watch::Sender<PresenceConfig>,
}

impl NetworkQualityMonitor {
    pub fn new(quality: NetworkQuality) -> Self {
        let (quality_tx, _) = watch::channel(quality);
        let (config_tx, _) = watch::channel(quality.presence_config());
        Self {
            quality: quality_tx,
            config: config_tx,
        }
    }

    /// Record a new quality. Returns true when the derived config changed,
    /// in which case subscribers are notified.
    pub fn update(&self, quality: NetworkQuality) -> bool {
        let previous = self.quality.send_replace(quality);
        let next = quality.presence_config();
        let changed = self.config.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(
                from = %previous,
                to = %quality,
                heartbeat_secs = next.heartbeat_interval.as_secs(),
                timeout_secs = next.presence_timeout.as_secs(),
                max_retries = next.max_retries,
                "presence timing changed"
            );
        }
        changed
    }

    /// Convenience for a raw host hint.
    pub fn update_hint(&self, hint: Option<&str>) -> bool {
        self.update(NetworkQuality::from_hint(hint))
    }

    pub fn quality(&self) -> NetworkQuality {
        *self.quality.borrow()
    }

    pub fn current(&self) -> PresenceConfig {
        *self.config.borrow()
    }

    /// Receiver that observes every config change.
    pub fn subscribe(&self) -> watch::Receiver<PresenceConfig> {
        self.config.subscribe()
    }
}

impl Default for NetworkQualityMonitor {
    fn default() -> Self {
        Self::new(NetworkQuality::Unknown)
    }
}
