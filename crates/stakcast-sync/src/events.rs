//! Typed payloads of the prediction hub events.

use alloy::primitives::U256;

use stakcast_common::SyncResult;

use crate::classifier::EventKind;
use crate::felt::{felt_to_hex, Felt, FeltReader};

#[derive(Debug, Clone, PartialEq)]
pub struct MarketCreated {
    pub market_id: U256,
    pub creator: Felt,
    pub market_type: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketResolved {
    pub market_id: U256,
    pub resolver: Felt,
    pub winning_choice: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WagerPlaced {
    pub market_id: U256,
    pub user: Felt,
    pub choice: u8,
    pub amount: U256,
    pub fee_amount: U256,
    pub net_amount: U256,
    pub wager_index: u64,
}

/// A decoded event together with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub kind: EventKind,
    pub tx_hash: String,
    /// Position among the contract's events in the block
    pub event_index: u32,
    pub event: DomainEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    MarketCreated(MarketCreated),
    MarketResolved(MarketResolved),
    WagerPlaced(WagerPlaced),
}

impl DomainEvent {
    /// Decode the payload felts (keys after the selector, then data)
    pub fn decode(kind: EventKind, payload: &[Felt]) -> SyncResult<Self> {
        let mut r = FeltReader::new(payload);
        let event = match kind {
            EventKind::MarketCreated => DomainEvent::MarketCreated(MarketCreated {
                market_id: r.u256("market_id")?,
                creator: r.felt("creator")?,
                market_type: r.u8("market_type")?,
            }),
            EventKind::MarketResolved => DomainEvent::MarketResolved(MarketResolved {
                market_id: r.u256("market_id")?,
                resolver: r.felt("resolver")?,
                winning_choice: r.u8("winning_choice")?,
            }),
            EventKind::WagerPlaced => DomainEvent::WagerPlaced(WagerPlaced {
                market_id: r.u256("market_id")?,
                user: r.felt("user")?,
                choice: r.u8("choice")?,
                amount: r.u256("amount")?,
                fee_amount: r.u256("fee_amount")?,
                net_amount: r.u256("net_amount")?,
                wager_index: r.u64("wager_index")?,
            }),
        };
        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::MarketCreated(_) => EventKind::MarketCreated,
            DomainEvent::MarketResolved(_) => EventKind::MarketResolved,
            DomainEvent::WagerPlaced(_) => EventKind::WagerPlaced,
        }
    }

    /// Market id in its read-model form (`0x` hex)
    pub fn market_id(&self) -> String {
        let id = match self {
            DomainEvent::MarketCreated(e) => e.market_id,
            DomainEvent::MarketResolved(e) => e.market_id,
            DomainEvent::WagerPlaced(e) => e.market_id,
        };
        felt_to_hex(id)
    }
}
