use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stakcast_sync::chain::StarknetRpcClient;
use stakcast_sync::checkpoint::{CheckpointStore, FileCheckpointStore, PgCheckpointStore};
use stakcast_sync::config::{CheckpointBackend, Config};
use stakcast_sync::felt::parse_felt;
use stakcast_sync::store::PgMarketStore;
use stakcast_sync::sync::{SyncConfig, SyncLoop};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Starting Stakcast sync");

    let config = Config::from_env()?;

    if let Some(addr) = &config.metrics_addr {
        let addr: SocketAddr = addr.parse().context("Invalid METRICS_ADDR")?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start metrics exporter")?;
        tracing::info!("Serving metrics on {}", addr);
    }

    // Create database pool
    let pool = stakcast_common::db::create_pool(&config.database_url, config.db_max_connections).await?;

    tracing::info!("Running database migrations");
    stakcast_common::db::run_migrations(&pool).await?;

    let contract = parse_felt(&config.contract_address).context("Invalid PREDICTION_HUB_CONTRACT_ADDRESS")?;
    let chain = StarknetRpcClient::new(
        &config.rpc_url,
        config.rpc_requests_per_second,
        config.rpc_timeout,
        config.events_chunk_size,
    )?;

    let checkpoints: Arc<dyn CheckpointStore> = match &config.checkpoint {
        CheckpointBackend::File(path) => {
            tracing::info!("Checkpoint file: {}", path.display());
            Arc::new(FileCheckpointStore::new(path))
        }
        CheckpointBackend::Postgres => Arc::new(PgCheckpointStore::new(pool.clone())),
    };

    let mut sync = SyncLoop::start(
        Arc::new(chain),
        checkpoints,
        Arc::new(PgMarketStore::new(pool)),
        SyncConfig {
            contract,
            poll_interval: config.poll_interval,
            start_block: config.start_block,
        },
    )
    .await
    .context("Failed to load checkpoint")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested, finishing current cycle");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                // Dropping the sender would stop the loop
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    sync.run(shutdown_rx).await;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stakcast_sync=info,sqlx=warn".into());

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
