mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use fleet_common::ConfigError;
use fleet_config::FleetConfig;
use fleet_presence::{
    Backoff, ConnectError, Identity, MemoryHub, NetworkQuality, PeerEvent, PresenceCoordinator,
    PresenceError, PresenceSettings, PresenceStatus, PresenceTransport, RealtimeConfig,
    RealtimeTransport, TrackError,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Turn `--log-level` into a filter directive. A bare level is scoped to
/// the fleet crates; anything containing `=` is used as-is.
fn log_directive(level: &str) -> String {
    if level.contains('=') {
        level.to_string()
    } else {
        format!("fleet={}", level.to_ascii_lowercase())
    }
}

fn init_logging(cli_level: Option<&str>, config_directive: &str) {
    let directive = cli_level
        .map(log_directive)
        .unwrap_or_else(|| config_directive.to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new("fleet=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load(args: &cli::Args) -> Result<FleetConfig, ConfigError> {
    match &args.config {
        Some(path) => {
            let config = fleet_config::load_from_path(Path::new(path))?;
            fleet_config::validation::validate(&config)?;
            Ok(config)
        }
        None => fleet_config::load_config(),
    }
}

fn settings(config: &fleet_config::PresenceConfig, quality: Option<&str>) -> PresenceSettings {
    let hint = quality.or(config.network_quality.as_deref());
    PresenceSettings {
        channel: config.channel.clone(),
        backoff: Backoff::new(
            Duration::from_millis(u64::from(config.reconnect_base_delay_ms)),
            Duration::from_millis(u64::from(config.reconnect_max_delay_ms)),
        ),
        network_quality: NetworkQuality::from_hint(hint),
    }
}

fn realtime_transport(config: &fleet_config::PresenceConfig) -> fleet_common::Result<RealtimeTransport> {
    let url = config.endpoint().ok_or_else(|| {
        ConfigError::ValidationError(
            "set presence.project_ref or presence.url, or pass --memory".into(),
        )
    })?;
    let mut realtime = RealtimeConfig::new(url, config.resolved_api_key());
    realtime.socket_heartbeat = Duration::from_secs(u64::from(config.socket_heartbeat_secs));
    realtime.connect_timeout = Duration::from_secs(u64::from(config.connect_timeout_secs));
    Ok(RealtimeTransport::new(realtime))
}

async fn print_roster(coordinator: &PresenceCoordinator) {
    let users = coordinator.online_users().await;
    println!("{} online", users.len());
    for user in users {
        println!(
            "  {} ({}) in {}",
            user.display_name,
            user.user_id,
            user.room_id.as_deref().unwrap_or("-")
        );
    }
}

fn describe_peer_event(event: &PeerEvent) -> String {
    let field = |name: &str| event.payload[name].as_str().unwrap_or("-").to_string();
    match event.event.as_str() {
        fleet_presence::protocol::events::ROOM_CHANGED => format!(
            "{} moved {} -> {}",
            field("user_id"),
            field("from"),
            field("to")
        ),
        other => format!("peer event {other}: {}", event.payload),
    }
}

/// Transport failures are retried in the background; anything else
/// means presence cannot run at all.
async fn go_online(
    coordinator: &PresenceCoordinator,
    room: Option<String>,
) -> fleet_common::Result<()> {
    match coordinator.start().await {
        Err(PresenceError::Connect(ConnectError::Transport(e))) => {
            tracing::warn!("Initial connect failed, retrying in background: {e}");
        }
        other => other?,
    }
    match coordinator.set_presence(PresenceStatus::Online, room).await {
        Err(PresenceError::Track(TrackError::Transport(e))) => {
            tracing::warn!("Presence will be announced after reconnect: {e}");
        }
        other => other?,
    }
    Ok(())
}

/// Print status, roster and peer event changes until Ctrl-C.
async fn watch(coordinator: &PresenceCoordinator) {
    let mut status = coordinator.status_receiver();
    let mut changes = coordinator.subscribe_changes().await;
    let mut peer_events = coordinator.subscribe_peer_events();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                println!("status: {current}");
            }
            change = changes.recv() => match change {
                Ok(_) | Err(RecvError::Lagged(_)) => print_roster(coordinator).await,
                Err(RecvError::Closed) => break,
            },
            event = peer_events.recv() => match event {
                Ok(event) => println!("{}", describe_peer_event(&event)),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let loaded = load(&args);
    let config_directive = loaded
        .as_ref()
        .map(|c| c.logging.level.directive())
        .unwrap_or("fleet=info");
    init_logging(args.log_level.as_deref(), config_directive);

    tracing::info!("fleet-presence v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(config) => config,
        Err(e) if args.config.is_some() => {
            tracing::error!("Config load failed: {e}");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::warn!("Config load failed, using defaults: {e}");
            FleetConfig::default()
        }
    };

    if !config.presence.enabled && !args.memory {
        tracing::warn!("Presence is disabled in config, nothing to do");
        return ExitCode::SUCCESS;
    }

    let transport: Arc<dyn PresenceTransport> = if args.memory {
        Arc::new(MemoryHub::new().transport())
    } else {
        match realtime_transport(&config.presence) {
            Ok(transport) => Arc::new(transport),
            Err(e) => {
                tracing::error!("{e}");
                return ExitCode::FAILURE;
            }
        }
    };

    let user_id = args.user_id.clone().unwrap_or_else(fleet_common::new_id);
    let username = args.username.clone().unwrap_or_else(|| user_id.clone());
    let display_name = args.display_name.clone().unwrap_or_else(|| username.clone());
    let identity = Identity::new(user_id, username, display_name);

    let coordinator = PresenceCoordinator::new(
        Some(identity),
        transport,
        settings(&config.presence, args.quality.as_deref()),
    );
    tracing::info!(
        quality = %coordinator.network_quality(),
        heartbeat_secs = coordinator.presence_config().heartbeat_interval.as_secs(),
        "Presence configured"
    );

    if let Err(e) = go_online(&coordinator, args.room.clone()).await {
        tracing::error!("{e}");
        coordinator.disconnect().await;
        return ExitCode::FAILURE;
    }

    watch(&coordinator).await;

    coordinator.disconnect().await;
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_levels_are_scoped_to_fleet() {
        assert_eq!(log_directive("DEBUG"), "fleet=debug");
        assert_eq!(log_directive("fleet_presence=trace"), "fleet_presence=trace");
    }

    #[test]
    fn settings_follow_config_and_cli_hint() {
        let mut presence = fleet_config::PresenceConfig::default();
        presence.network_quality = Some("3g".into());
        presence.reconnect_base_delay_ms = 500;

        let from_config = settings(&presence, None);
        assert_eq!(from_config.network_quality, NetworkQuality::Medium);
        assert_eq!(from_config.backoff.base_delay, Duration::from_millis(500));
        assert_eq!(from_config.backoff.max_delay, Duration::from_secs(30));
        assert_eq!(from_config.channel, "fleet-presence");

        let overridden = settings(&presence, Some("fast"));
        assert_eq!(overridden.network_quality, NetworkQuality::Fast);
    }

    #[test]
    fn room_change_events_are_described() {
        let event = PeerEvent {
            event: "room_changed".into(),
            payload: serde_json::json!({"user_id": "u2", "from": null, "to": "yard"}),
        };
        assert_eq!(describe_peer_event(&event), "u2 moved - -> yard");
    }

    #[tokio::test]
    async fn go_online_reports_shutdown_as_fatal() {
        let transport: Arc<dyn PresenceTransport> = Arc::new(MemoryHub::new().transport());
        let coordinator = PresenceCoordinator::new(
            Some(Identity::new("u1", "u1", "U1")),
            transport,
            PresenceSettings::default(),
        );
        go_online(&coordinator, Some("r1".into())).await.unwrap();
        assert!(coordinator.is_local_online());

        coordinator.disconnect().await;
        let err = go_online(&coordinator, None).await.unwrap_err();
        assert!(matches!(err, fleet_common::FleetError::Presence(_)));
        assert!(err.to_string().contains("shut down"));
    }

    #[test]
    fn realtime_needs_an_endpoint() {
        let presence = fleet_config::PresenceConfig::default();
        assert!(matches!(
            realtime_transport(&presence),
            Err(fleet_common::FleetError::Config(ConfigError::ValidationError(_)))
        ));

        let presence = fleet_config::PresenceConfig {
            project_ref: "abc".into(),
            ..Default::default()
        };
        assert!(realtime_transport(&presence).is_ok());
    }
}
