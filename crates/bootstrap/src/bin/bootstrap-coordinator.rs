//! bootstrap-coordinator — applies schema migrations, then republishes
//! database credentials to the rest of the fleet.
//!
//! ```bash
//! bootstrap-coordinator --broker-url mqtt://localhost:1883 \
//!     --database-url postgres://bigskies@localhost/bigskies \
//!     --pgpass-path /etc/bigskies/.pgpass
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bigskies_bus::{MqttBusClient, MqttConfig};
use bigskies_bootstrap::{load_local_credential, publish_credential, run_migrations, spawn_periodic_resend, spawn_request_responder, DEFAULT_RESEND_INTERVAL};
use clap::Parser;
use sqlx::PgPool;

#[derive(Parser, Debug)]
#[command(name = "bootstrap-coordinator", version, about)]
struct Cli {
    /// MQTT broker host.
    #[arg(long, env = "BIGSKIES_BROKER_HOST", default_value = "localhost")]
    broker_host: String,

    /// MQTT broker port.
    #[arg(long, env = "BIGSKIES_BROKER_PORT", default_value_t = 1883)]
    broker_port: u16,

    /// PostgreSQL connection URL.
    #[arg(long, env = "BIGSKIES_DATABASE_URL")]
    database_url: String,

    /// Path to the local `.pgpass`-style credential file.
    #[arg(long, env = "BIGSKIES_PGPASS_PATH", default_value = "/etc/bigskies/.pgpass")]
    pgpass_path: PathBuf,

    /// Defensive resend interval in seconds (0 disables the periodic resend).
    #[arg(long, env = "BIGSKIES_RESEND_INTERVAL_SECS", default_value_t = DEFAULT_RESEND_INTERVAL.as_secs())]
    resend_interval_secs: u64,
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
    tracing::info!(broker_host = %cli.broker_host, broker_port = cli.broker_port, "starting bootstrap-coordinator");

    let record = load_local_credential(&cli.pgpass_path)?;

    let pool = PgPool::connect(&cli.database_url).await?;
    run_migrations(&pool).await?;

    let mqtt_config = MqttConfig::new("bootstrap-coordinator", cli.broker_host, cli.broker_port);
    let bus = Arc::new(MqttBusClient::connect(mqtt_config).await?);

    spawn_request_responder(bus.clone(), record.clone()).await?;
    publish_credential(&*bus, &record).await?;

    if cli.resend_interval_secs > 0 {
        spawn_periodic_resend(bus.clone(), record, Duration::from_secs(cli.resend_interval_secs));
    }

    tracing::info!("bootstrap-coordinator ready");
    shutdown_signal().await;
    tracing::info!("shutdown signal received, disconnecting");
    bus.disconnect().await?;

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
