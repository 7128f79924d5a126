use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Where the last processed block height is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointBackend {
    File(PathBuf),
    Postgres,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub rpc_url: String,
    pub contract_address: String,
    pub poll_interval: Duration,
    /// Genesis counts as processed: 0 and 1 both start at block 1
    pub start_block: u64,
    pub checkpoint: CheckpointBackend,
    pub rpc_requests_per_second: u32,
    pub rpc_timeout: Duration,
    pub events_chunk_size: u32,
    pub metrics_addr: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let checkpoint = match env::var("CHECKPOINT_BACKEND")
            .unwrap_or_else(|_| "file".to_string())
            .as_str()
        {
            "file" => CheckpointBackend::File(PathBuf::from(
                env::var("CHECKPOINT_FILE").unwrap_or_else(|_| "last_processed_block.txt".to_string()),
            )),
            "postgres" => CheckpointBackend::Postgres,
            other => bail!("Invalid CHECKPOINT_BACKEND: {} (expected file or postgres)", other),
        };

        let events_chunk_size: u32 = env::var("EVENTS_CHUNK_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .context("Invalid EVENTS_CHUNK_SIZE")?;
        if events_chunk_size == 0 {
            bail!("EVENTS_CHUNK_SIZE must be positive");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid DB_MAX_CONNECTIONS")?,
            rpc_url: env::var("STARKNET_RPC_URL")
                .context("STARKNET_RPC_URL must be set")?,
            contract_address: env::var("PREDICTION_HUB_CONTRACT_ADDRESS")
                .context("PREDICTION_HUB_CONTRACT_ADDRESS must be set")?,
            poll_interval: Duration::from_millis(
                env::var("POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "10000".to_string())
                    .parse()
                    .context("Invalid POLL_INTERVAL_MS")?,
            ),
            start_block: env::var("START_BLOCK")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("Invalid START_BLOCK")?,
            checkpoint,
            rpc_requests_per_second: env::var("RPC_REQUESTS_PER_SECOND")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid RPC_REQUESTS_PER_SECOND")?,
            rpc_timeout: Duration::from_secs(
                env::var("RPC_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("Invalid RPC_TIMEOUT_SECS")?,
            ),
            events_chunk_size,
            metrics_addr: env::var("METRICS_ADDR").ok().filter(|s| !s.is_empty()),
        })
    }
}
