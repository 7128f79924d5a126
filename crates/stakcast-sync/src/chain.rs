use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stakcast_common::{SyncError, SyncResult};

use crate::felt::{felt_to_hex, parse_felt, selector, Felt};

/// Retry delays for transport failures (in seconds). A request that still
/// fails surfaces as `SyncError::Rpc` and the sync cycle is retried later.
const RPC_RETRY_DELAYS: &[u64] = &[1, 2];

type SharedRateLimiter = Arc<RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>>;

/// Event emitted by a contract, as returned by `starknet_getEvents`
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub from_address: Felt,
    pub keys: Vec<Felt>,
    pub data: Vec<Felt>,
    pub block_number: Option<u64>,
    pub transaction_hash: Felt,
}

impl EmittedEvent {
    /// Event payload in declaration order: keys after the selector, then data
    pub fn payload(&self) -> Vec<Felt> {
        self.keys.iter().skip(1).chain(self.data.iter()).copied().collect()
    }
}

/// Read-only capability over a Starknet node
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_block_height(&self) -> SyncResult<u64>;

    /// Block timestamp in seconds since epoch
    async fn block_timestamp(&self, height: u64) -> SyncResult<u64>;

    /// All events emitted by `contract` in `[from, to]`, in chain order
    async fn events_in_range(&self, contract: Felt, from: u64, to: u64) -> SyncResult<Vec<EmittedEvent>>;

    /// Call a view entry point against the state at the end of `block` and
    /// return the raw felts
    async fn read_call(&self, contract: Felt, entry_point: &str, calldata: &[Felt], block: u64) -> SyncResult<Vec<Felt>>;
}

#[derive(Deserialize)]
struct RawEvent {
    from_address: String,
    keys: Vec<String>,
    data: Vec<String>,
    block_number: Option<u64>,
    transaction_hash: String,
}

impl RawEvent {
    fn into_event(self) -> SyncResult<EmittedEvent> {
        let parse_all = |values: Vec<String>| -> SyncResult<Vec<Felt>> {
            values.iter().map(|v| parse_felt(v)).collect()
        };

        Ok(EmittedEvent {
            from_address: parse_felt(&self.from_address)?,
            keys: parse_all(self.keys)?,
            data: parse_all(self.data)?,
            block_number: self.block_number,
            transaction_hash: parse_felt(&self.transaction_hash)?,
        })
    }
}

#[derive(Deserialize)]
struct EventsPage {
    events: Vec<RawEvent>,
    continuation_token: Option<String>,
}

#[derive(Deserialize)]
struct BlockHeader {
    timestamp: u64,
}

/// JSON-RPC client for the Starknet node API
pub struct StarknetRpcClient {
    client: reqwest::Client,
    rpc_url: String,
    rate_limiter: SharedRateLimiter,
    chunk_size: u32,
    retry_delays: Vec<Duration>,
    next_id: AtomicU64,
}

impl StarknetRpcClient {
    pub fn new(rpc_url: &str, requests_per_second: u32, timeout: Duration, chunk_size: u32) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {}", e)))?;

        let rps = NonZeroU32::new(requests_per_second)
            .ok_or_else(|| SyncError::Config("RPC_REQUESTS_PER_SECOND must be positive".to_string()))?;
        tracing::info!("Rate limiting RPC requests to {} req/sec", rps);

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            chunk_size,
            retry_delays: RPC_RETRY_DELAYS.iter().map(|s| Duration::from_secs(*s)).collect(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Override the transport retry schedule
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    async fn request<T: serde::de::DeserializeOwned>(&self, method: &'static str, params: Value) -> SyncResult<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let mut attempt = 0;
        let response = loop {
            self.rate_limiter.until_ready().await;
            metrics::counter!("stakcast_rpc_requests_total", "method" => method).increment(1);

            match self.send(&body).await {
                Ok(resp) => {
                    if attempt > 0 {
                        tracing::info!("{} succeeded after {} retries", method, attempt);
                    }
                    break resp;
                }
                Err(e) => {
                    metrics::counter!("stakcast_rpc_failures_total", "method" => method).increment(1);
                    let Some(delay) = self.retry_delays.get(attempt).copied() else {
                        return Err(SyncError::Rpc(format!(
                            "{} failed after {} attempts: {}",
                            method,
                            attempt + 1,
                            e
                        )));
                    };

                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        method,
                        attempt + 1,
                        self.retry_delays.len() + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        if let Some(error) = response.get("error") {
            return Err(SyncError::Rpc(format!("{} returned error: {}", method, error)));
        }

        let result = response
            .get("result")
            .cloned()
            .ok_or_else(|| SyncError::Rpc(format!("{} response has no result", method)))?;

        serde_json::from_value(result)
            .map_err(|e| SyncError::Rpc(format!("malformed {} result: {}", method, e)))
    }

    async fn send(&self, body: &Value) -> Result<Value, String> {
        let response = self
            .client
            .post(&self.rpc_url)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP status {}", status));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))
    }
}

#[async_trait]
impl ChainClient for StarknetRpcClient {
    async fn latest_block_height(&self) -> SyncResult<u64> {
        self.request("starknet_blockNumber", json!([])).await
    }

    async fn block_timestamp(&self, height: u64) -> SyncResult<u64> {
        let header: BlockHeader = self
            .request(
                "starknet_getBlockWithTxHashes",
                json!({ "block_id": { "block_number": height } }),
            )
            .await?;
        Ok(header.timestamp)
    }

    async fn events_in_range(&self, contract: Felt, from: u64, to: u64) -> SyncResult<Vec<EmittedEvent>> {
        let mut events = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut filter = json!({
                "from_block": { "block_number": from },
                "to_block": { "block_number": to },
                "address": felt_to_hex(contract),
                "keys": [],
                "chunk_size": self.chunk_size,
            });
            if let Some(token) = &continuation_token {
                filter["continuation_token"] = json!(token);
            }

            let page: EventsPage = self
                .request("starknet_getEvents", json!({ "filter": filter }))
                .await?;

            for raw in page.events {
                let event = raw
                    .into_event()
                    .map_err(|e| SyncError::Rpc(format!("malformed event in blocks {}..={}: {}", from, to, e)))?;
                events.push(event);
            }

            match page.continuation_token {
                Some(token) if continuation_token.as_deref() != Some(token.as_str()) => {
                    continuation_token = Some(token);
                }
                Some(token) => {
                    return Err(SyncError::Rpc(format!("node repeated continuation token {}", token)));
                }
                None => break,
            }
        }

        tracing::debug!("Fetched {} events for blocks {} to {}", events.len(), from, to);
        Ok(events)
    }

    async fn read_call(&self, contract: Felt, entry_point: &str, calldata: &[Felt], block: u64) -> SyncResult<Vec<Felt>> {
        let raw: Vec<String> = self
            .request(
                "starknet_call",
                json!({
                    "request": {
                        "contract_address": felt_to_hex(contract),
                        "entry_point_selector": felt_to_hex(selector(entry_point)),
                        "calldata": calldata.iter().map(|f| felt_to_hex(*f)).collect::<Vec<_>>(),
                    },
                    "block_id": { "block_number": block },
                }),
            )
            .await?;

        raw.iter().map(|v| parse_felt(v)).collect()
    }
}
