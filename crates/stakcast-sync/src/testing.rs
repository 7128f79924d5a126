//! Fakes for the chain, checkpoint and projection seams.

use alloy::primitives::U256;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use stakcast_common::{ChoiceIndex, Market, MarketSnapshot, MarketType, SyncError, SyncResult, WagerKey};

use crate::chain::{ChainClient, EmittedEvent};
use crate::checkpoint::CheckpointStore;
use crate::details::entry_point;
use crate::felt::{selector, u256_to_calldata, Felt};
use crate::projection::{BlockContext, ProjectionSink};

pub const CONTRACT: u64 = 0x123;
pub const GENESIS_TIME: u64 = 1_700_000_000;

/// Pack up to 31 ASCII bytes into a felt
pub fn short_string(value: &str) -> Felt {
    assert!(value.len() <= 31, "short strings hold at most 31 bytes");
    U256::from_be_slice(value.as_bytes())
}

/// Contract-side market state served by the scripted view entry points
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketState {
    pub staked0: u64,
    pub staked1: u64,
    pub winning_choice: Option<u8>,
}

/// Serialized market tuple of a fresh market, as returned by the view entry
/// point for `market_type`
pub fn market_tuple(market_id: U256, market_type: MarketType) -> Vec<Felt> {
    market_tuple_with(market_id, market_type, MarketState::default())
}

pub fn market_tuple_with(market_id: U256, market_type: MarketType, state: MarketState) -> Vec<Felt> {
    let [id_low, id_high] = u256_to_calldata(market_id);
    let resolved = state.winning_choice.is_some();
    let mut felts = vec![
        id_low,
        id_high,
        short_string("Rain tomorrow?"),
        short_string("Will it rain in Lagos"),
        short_string("Yes"),
        U256::from(state.staked0),
        U256::ZERO,
        short_string("No"),
        U256::from(state.staked1),
        U256::ZERO,
        short_string("weather"),
        short_string("ipfs://rain"),
        U256::from(u8::from(resolved)),
        U256::from(u8::from(!resolved)),
        U256::from(1_800_000_000u64),
    ];
    match state.winning_choice {
        Some(choice) => felts.extend([U256::ZERO, U256::from(choice)]),
        None => felts.push(U256::from(1u8)),
    }
    felts.extend([U256::from(state.staked0 + state.staked1), U256::ZERO, U256::from(0xabcu32)]);
    match market_type {
        MarketType::General => {}
        MarketType::Crypto => felts.extend([U256::from(1u8), short_string("BTC/USD"), U256::from(100_000u64)]),
        MarketType::Sports => felts.extend([U256::from(77u8), U256::from(1u8)]),
        MarketType::Business => felts.push(U256::from(77u8)),
    }
    felts
}

fn contract_event(name: &str, payload: Vec<Felt>, tx: u64, block: u64) -> EmittedEvent {
    let mut keys = vec![selector(name)];
    keys.extend(payload.iter().take(2));
    EmittedEvent {
        from_address: U256::from(CONTRACT),
        keys,
        data: payload.into_iter().skip(2).collect(),
        block_number: Some(block),
        transaction_hash: U256::from(tx),
    }
}

pub fn created_event(market_id: u64, market_type: u64, tx: u64, block: u64) -> EmittedEvent {
    let payload = vec![U256::from(market_id), U256::ZERO, U256::from(0xabcu32), U256::from(market_type)];
    contract_event("MarketCreated", payload, tx, block)
}

pub fn resolved_event(market_id: u64, choice: u64, tx: u64, block: u64) -> EmittedEvent {
    let payload = vec![U256::from(market_id), U256::ZERO, U256::from(0xdefu32), U256::from(choice)];
    contract_event("MarketResolved", payload, tx, block)
}

pub fn wager_event(market_id: u64, choice: u64, amount: u64, tx: u64, block: u64) -> EmittedEvent {
    let payload = vec![
        U256::from(market_id),
        U256::ZERO,
        U256::from(0x777u32),
        U256::from(choice),
        U256::from(amount),
        U256::ZERO,
        U256::ZERO,
        U256::ZERO,
        U256::from(amount),
        U256::ZERO,
        U256::ZERO,
    ];
    contract_event("WagerPlaced", payload, tx, block)
}

type ViewKey = (String, Option<U256>);

/// Chain whose height, events and view results are set by the test.
///
/// View results are keyed by the block they take effect at; a call at block
/// `h` sees the latest result set at or before `h`.
#[derive(Default)]
pub struct ScriptedChain {
    height: Mutex<u64>,
    events: Mutex<BTreeMap<u64, Vec<EmittedEvent>>>,
    responses: Mutex<HashMap<ViewKey, BTreeMap<u64, Vec<Felt>>>>,
    failing_blocks: Mutex<HashSet<u64>>,
    height_fails: Mutex<bool>,
    calls: Mutex<Vec<(String, u64)>>,
}

impl ScriptedChain {
    pub fn new(height: u64) -> Self {
        let chain = Self::default();
        *chain.height.lock().unwrap() = height;
        chain
    }

    pub fn set_height(&self, height: u64) {
        *self.height.lock().unwrap() = height;
    }

    pub fn push_event(&self, event: EmittedEvent) {
        let block = event.block_number.expect("scripted events carry a block number");
        self.events.lock().unwrap().entry(block).or_default().push(event);
    }

    /// Serve a fresh market tuple for `market_id` from genesis on
    pub fn set_market(&self, market_id: U256, market_type: MarketType) {
        self.set_market_state(market_id, market_type, 0, MarketState::default());
    }

    /// Serve `state` for `market_id` from block `from` on
    pub fn set_market_state(&self, market_id: U256, market_type: MarketType, from: u64, state: MarketState) {
        self.responses
            .lock()
            .unwrap()
            .entry((entry_point(market_type).to_string(), Some(market_id)))
            .or_default()
            .insert(from, market_tuple_with(market_id, market_type, state));
    }

    /// Serve `felts` from `entry_point` whatever the market id or block
    pub fn set_call_response(&self, entry_point: &str, felts: Vec<Felt>) {
        self.responses
            .lock()
            .unwrap()
            .entry((entry_point.to_string(), None))
            .or_default()
            .insert(0, felts);
    }

    pub fn fail_block(&self, height: u64) {
        self.failing_blocks.lock().unwrap().insert(height);
    }

    pub fn heal_block(&self, height: u64) {
        self.failing_blocks.lock().unwrap().remove(&height);
    }

    pub fn fail_height(&self, fail: bool) {
        *self.height_fails.lock().unwrap() = fail;
    }

    /// Entry points called, with the block each call was pinned to
    pub fn calls(&self) -> Vec<(String, u64)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn latest_block_height(&self) -> SyncResult<u64> {
        if *self.height_fails.lock().unwrap() {
            return Err(SyncError::Rpc("connection refused".to_string()));
        }
        Ok(*self.height.lock().unwrap())
    }

    async fn block_timestamp(&self, height: u64) -> SyncResult<u64> {
        Ok(GENESIS_TIME + height)
    }

    async fn events_in_range(&self, contract: Felt, from: u64, to: u64) -> SyncResult<Vec<EmittedEvent>> {
        if (from..=to).any(|h| self.failing_blocks.lock().unwrap().contains(&h)) {
            return Err(SyncError::Rpc(format!("events for {}..={} unavailable", from, to)));
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .range(from..=to)
            .flat_map(|(_, events)| events.iter().cloned())
            .filter(|e| e.from_address == contract)
            .collect())
    }

    async fn read_call(&self, _contract: Felt, entry_point: &str, calldata: &[Felt], block: u64) -> SyncResult<Vec<Felt>> {
        self.calls.lock().unwrap().push((entry_point.to_string(), block));
        let market_id = match calldata {
            [low, high] => crate::felt::u256_from_parts(*low, *high)?,
            _ => return Err(SyncError::Decode("expected u256 calldata".to_string())),
        };

        let responses = self.responses.lock().unwrap();
        responses
            .get(&(entry_point.to_string(), Some(market_id)))
            .or_else(|| responses.get(&(entry_point.to_string(), None)))
            .and_then(|by_block| by_block.range(..=block).next_back())
            .map(|(_, felts)| felts.clone())
            .ok_or_else(|| SyncError::Rpc(format!("{} reverted at block {}: market not found", entry_point, block)))
    }
}

#[derive(Default)]
pub struct MemoryCheckpoint {
    height: Mutex<Option<u64>>,
    writes: Mutex<Vec<u64>>,
}

impl MemoryCheckpoint {
    pub fn at(height: u64) -> Self {
        let store = Self::default();
        *store.height.lock().unwrap() = Some(height);
        store
    }

    pub fn writes(&self) -> Vec<u64> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoint {
    async fn read(&self) -> SyncResult<u64> {
        Ok(self.height.lock().unwrap().unwrap_or(0))
    }

    async fn write(&self, height: u64) -> SyncResult<()> {
        *self.height.lock().unwrap() = Some(height);
        self.writes.lock().unwrap().push(height);
        Ok(())
    }
}

/// Projection sink with the same semantics as the Postgres store
#[derive(Default)]
pub struct MemorySink {
    markets: Mutex<BTreeMap<String, Market>>,
    wagers: Mutex<HashSet<WagerKey>>,
}

impl MemorySink {
    pub fn market(&self, market_id: &str) -> Option<Market> {
        self.markets.lock().unwrap().get(market_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.markets.lock().unwrap().len()
    }
}

#[async_trait]
impl ProjectionSink for MemorySink {
    async fn upsert_created(&self, snapshot: &MarketSnapshot, block: BlockContext) -> SyncResult<bool> {
        let mut markets = self.markets.lock().unwrap();
        if markets.contains_key(&snapshot.market_id) {
            return Ok(false);
        }
        markets.insert(snapshot.market_id.clone(), Market::from_snapshot(snapshot, block.time()?));
        Ok(true)
    }

    async fn mark_resolved(&self, market_id: &str, choice: ChoiceIndex, block: BlockContext) -> SyncResult<bool> {
        let mut markets = self.markets.lock().unwrap();
        let market = markets
            .get_mut(market_id)
            .ok_or_else(|| SyncError::NotFound(format!("market {}", market_id)))?;
        if market.is_resolved {
            return Ok(false);
        }
        market.is_resolved = true;
        market.is_open = false;
        market.winning_choice = Some(choice.as_i16());
        market.updated_at = block.time()?;
        Ok(true)
    }

    async fn apply_wager(
        &self,
        key: &WagerKey,
        market_id: &str,
        choice: ChoiceIndex,
        amount: &BigDecimal,
        block: BlockContext,
    ) -> SyncResult<bool> {
        let mut markets = self.markets.lock().unwrap();
        let market = markets
            .get_mut(market_id)
            .ok_or_else(|| SyncError::NotFound(format!("market {}", market_id)))?;
        if !self.wagers.lock().unwrap().insert(key.clone()) {
            return Ok(false);
        }
        market.total_pool = &market.total_pool + amount;
        match choice {
            ChoiceIndex::Choice0 => market.choice0_staked = &market.choice0_staked + amount,
            ChoiceIndex::Choice1 => market.choice1_staked = &market.choice1_staked + amount,
        }
        market.updated_at = block.time()?;
        Ok(true)
    }
}
