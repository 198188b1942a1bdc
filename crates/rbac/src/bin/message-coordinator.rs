//! message-coordinator — the RBAC interceptor. Subscribes to every
//! protected topic pattern and forwards or rejects traffic based on
//! verdicts from the authorization service.
//!
//! ```bash
//! message-coordinator --broker-url mqtt://localhost:1883 \
//!     --database-url postgres://bigskies@localhost/bigskies
//! ```

use std::sync::Arc;
use std::time::Duration;

use bigskies_bus::{MqttBusClient, MqttConfig};
use bigskies_rbac::{BusAuthorizationClient, RbacInterceptor};
use clap::Parser;
use sqlx::PgPool;

#[derive(Parser, Debug)]
#[command(name = "message-coordinator", version, about)]
struct Cli {
    /// MQTT broker host.
    #[arg(long, env = "BIGSKIES_BROKER_HOST", default_value = "localhost")]
    broker_host: String,

    /// MQTT broker port.
    #[arg(long, env = "BIGSKIES_BROKER_PORT", default_value_t = 1883)]
    broker_port: u16,

    /// PostgreSQL connection URL (backs the `protection_rules` table).
    #[arg(long, env = "BIGSKIES_DATABASE_URL")]
    database_url: String,

    /// Maximum number of pending validations held at once.
    #[arg(long, env = "BIGSKIES_MAX_QUEUE_SIZE", default_value_t = 1000)]
    max_queue_size: usize,

    /// How long a pending validation waits for a verdict before timing out.
    #[arg(long, env = "BIGSKIES_VALIDATION_TIMEOUT_MS", default_value_t = 500)]
    validation_timeout_ms: u64,

    /// How often the sweeper checks for expired pending entries.
    #[arg(long, env = "BIGSKIES_SWEEP_INTERVAL_MS", default_value_t = 100)]
    sweep_interval_ms: u64,

    /// Reload the protection-rule set from the database on this interval.
    #[arg(long, env = "BIGSKIES_RULE_REFRESH_SECS", default_value_t = 30)]
    rule_refresh_secs: u64,

    /// Feature flag: when false the interceptor is a no-op observer.
    #[arg(long, env = "BIGSKIES_RBAC_ENABLED", default_value_t = true)]
    rbac_enabled: bool,
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
    tracing::info!(broker_host = %cli.broker_host, broker_port = cli.broker_port, rbac_enabled = cli.rbac_enabled, "starting message-coordinator");

    let pool = PgPool::connect(&cli.database_url).await?;

    let mqtt_config = MqttConfig::new("message-coordinator", cli.broker_host, cli.broker_port);
    let bus = Arc::new(MqttBusClient::connect(mqtt_config).await?);

    let auth_client = Arc::new(BusAuthorizationClient::new(bus.clone(), "message-coordinator"));

    let interceptor = RbacInterceptor::new(
        bus.clone(),
        pool,
        auth_client,
        "message-coordinator",
        cli.max_queue_size,
        Duration::from_millis(cli.validation_timeout_ms),
        cli.rbac_enabled,
    );

    interceptor.start().await?;
    let sweeper = interceptor.spawn_sweeper(Duration::from_millis(cli.sweep_interval_ms));

    let refresh_interval = Duration::from_secs(cli.rule_refresh_secs);
    let refresh_handle = {
        let interceptor = interceptor.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = interceptor.refresh_rules().await {
                    tracing::warn!(error = %e, "protection rule refresh failed");
                }
            }
        })
    };

    tracing::info!("message-coordinator ready");
    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining pending validations");
    refresh_handle.abort();
    interceptor.shutdown(sweeper).await?;

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
