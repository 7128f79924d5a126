use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use stakcast_common::{ChoiceIndex, MarketSnapshot, SyncError, SyncResult, WagerKey};

use crate::details::MarketDetailFetcher;
use crate::events::{DomainEvent, EventEnvelope};
use crate::felt::{felt_to_hex, to_big_decimal};

/// Block an event was emitted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    pub number: u64,
    /// Seconds since epoch
    pub timestamp: u64,
}

impl BlockContext {
    pub fn time(&self) -> SyncResult<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .ok_or_else(|| SyncError::Decode(format!("block {} has invalid timestamp {}", self.number, self.timestamp)))
    }
}

/// Storage the read-model projection is written to.
///
/// Every method is its own atomic unit and returns `false` when the call was
/// a no-op because its effect had already been applied.
#[async_trait]
pub trait ProjectionSink: Send + Sync {
    /// Insert the market unless a row with the same id exists.
    async fn upsert_created(&self, snapshot: &MarketSnapshot, block: BlockContext) -> SyncResult<bool>;

    /// Resolve an open market. Fails with `NotFound` for an unknown id.
    async fn mark_resolved(&self, market_id: &str, choice: ChoiceIndex, block: BlockContext) -> SyncResult<bool>;

    /// Add `amount` to the choice's stake and to the pool. Fails with
    /// `NotFound` for an unknown id.
    async fn apply_wager(
        &self,
        key: &WagerKey,
        market_id: &str,
        choice: ChoiceIndex,
        amount: &BigDecimal,
        block: BlockContext,
    ) -> SyncResult<bool>;
}

/// Applies classified events to a [`ProjectionSink`].
pub struct ProjectionWriter {
    sink: Arc<dyn ProjectionSink>,
    fetcher: MarketDetailFetcher,
}

impl ProjectionWriter {
    pub fn new(sink: Arc<dyn ProjectionSink>, fetcher: MarketDetailFetcher) -> Self {
        Self { sink, fetcher }
    }

    pub async fn apply(&self, envelope: &EventEnvelope, block: BlockContext) -> SyncResult<bool> {
        match &envelope.event {
            DomainEvent::MarketCreated(created) => {
                let snapshot = self
                    .fetcher
                    .fetch(created.market_id, created.market_type, block.number)
                    .await?;
                self.sink.upsert_created(&snapshot, block).await
            }
            DomainEvent::MarketResolved(resolved) => {
                let choice = ChoiceIndex::from_index(u64::from(resolved.winning_choice))?;
                self.sink
                    .mark_resolved(&felt_to_hex(resolved.market_id), choice, block)
                    .await
            }
            DomainEvent::WagerPlaced(wager) => {
                let choice = ChoiceIndex::from_index(u64::from(wager.choice))?;
                let amount = to_big_decimal(wager.amount)?;
                let key = WagerKey {
                    tx_hash: envelope.tx_hash.clone(),
                    event_index: envelope.event_index,
                };
                self.sink
                    .apply_wager(&key, &felt_to_hex(wager.market_id), choice, &amount, block)
                    .await
            }
        }
    }
}
