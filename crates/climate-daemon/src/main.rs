//! Climate daemon - presence-aware climate control for Home Assistant

use climate_engine::persistence::load_config;
use climate_engine::{ClimateEngine, SystemClock};
use home_platform::hass::{spawn_outbound_sender, spawn_state_poller};
use home_platform::{HassClient, PlatformHub};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod runtime;
mod websocket;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", name, value);
            default
        }),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "climate_daemon=debug,climate_engine=debug,home_platform=info,info".into()
            }),
        )
        .init();

    tracing::info!("Starting climate daemon");

    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
    let hass_url = std::env::var("HASS_URL")
        .unwrap_or_else(|_| "http://homeassistant.local:8123".to_string());
    let hass_token = std::env::var("HASS_TOKEN").unwrap_or_default();
    if hass_token.is_empty() {
        tracing::warn!("HASS_TOKEN is not set, platform requests will be rejected");
    }
    let port: u16 = env_or("LISTEN_PORT", 3000);
    let poll_interval = Duration::from_secs(env_or("POLL_INTERVAL_SECS", 5).max(1));
    let evaluate_interval = Duration::from_secs(env_or("EVALUATE_INTERVAL_SECS", 300).max(1));

    let config_path = data_dir.join("climate.json");
    let config = load_config(&config_path).await;

    // Connect to Home Assistant and seed the hub before the engine reads it
    tracing::info!("Connecting to Home Assistant at {}", hass_url);
    let client = HassClient::new(&hass_url, &hass_token)?;
    let (hub, outbound) = PlatformHub::new();
    match client.get_states().await {
        Ok(states) => {
            for state in states {
                hub.update_state(state);
            }
            tracing::info!("Loaded {} entities", hub.entity_count());
        }
        Err(e) => tracing::warn!("Failed to load initial states: {}", e),
    }

    let events = hub.subscribe();
    let engine = ClimateEngine::new(config, hub.clone(), SystemClock)?;
    let (engine, _runtime) =
        runtime::Runtime::new(engine, config_path, evaluate_interval).spawn(events);
    engine.reset().await?;

    spawn_state_poller(client.clone(), hub, poll_interval);
    spawn_outbound_sender(client, outbound);

    let app = api::router(api::AppState { engine });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
