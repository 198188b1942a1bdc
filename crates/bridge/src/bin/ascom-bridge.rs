//! ascom-bridge — serves an ASCOM Alpaca-style HTTP surface over the bus.
//!
//! ```bash
//! ascom-bridge --broker-host localhost --broker-port 1883 --http-bind 0.0.0.0:4567
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use bigskies_bridge::AscomBridge;
use bigskies_bus::{MqttBusClient, MqttConfig};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ascom-bridge", version, about)]
struct Cli {
    /// MQTT broker host.
    #[arg(long, env = "BIGSKIES_BROKER_HOST", default_value = "localhost")]
    broker_host: String,

    /// MQTT broker port.
    #[arg(long, env = "BIGSKIES_BROKER_PORT", default_value_t = 1883)]
    broker_port: u16,

    /// Address the ASCOM Alpaca-style HTTP surface binds to.
    #[arg(long, env = "BIGSKIES_BRIDGE_HTTP_BIND", default_value = "0.0.0.0:4567")]
    http_bind: SocketAddr,

    /// How long `Execute` waits for a correlated device response.
    #[arg(long, env = "BIGSKIES_BRIDGE_RESPONSE_TIMEOUT_MS", default_value_t = 5000)]
    response_timeout_ms: u64,

    /// Safety-net sweep interval for leaked awaiters.
    #[arg(long, env = "BIGSKIES_BRIDGE_SWEEP_INTERVAL_MS", default_value_t = 1000)]
    sweep_interval_ms: u64,

    /// Age at which an unresolved awaiter is considered leaked.
    #[arg(long, env = "BIGSKIES_BRIDGE_SWEEP_MAX_AGE_MS", default_value_t = 30_000)]
    sweep_max_age_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(broker_host = %cli.broker_host, broker_port = cli.broker_port, http_bind = %cli.http_bind, "starting ascom-bridge");

    let mqtt_config = MqttConfig::new("ascom-bridge", cli.broker_host, cli.broker_port);
    let bus = std::sync::Arc::new(MqttBusClient::connect(mqtt_config).await?);

    let bridge = AscomBridge::new(bus.clone(), "ascom-bridge", Duration::from_millis(cli.response_timeout_ms));
    let sweeper = bridge.spawn_sweeper(Duration::from_millis(cli.sweep_interval_ms), Duration::from_millis(cli.sweep_max_age_ms));

    let app = bigskies_bridge::router(bridge.clone()).layer(tower_http::trace::TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(cli.http_bind).await?;

    tracing::info!("ascom-bridge ready");
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "http server exited");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    bridge.stop(sweeper).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
    }
}
