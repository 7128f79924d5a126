use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{SyncError, SyncResult};

/// Market row as stored in the `markets` read-model table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Market {
    pub market_id: String,
    pub title: String,
    pub description: String,
    pub market_type: String,
    pub category: String,
    pub image_url: String,
    pub end_time: i64,
    pub is_resolved: bool,
    pub is_open: bool,
    pub winning_choice: Option<i16>,
    pub total_pool: BigDecimal,
    pub creator: String,
    pub choice0_label: String,
    pub choice0_staked: BigDecimal,
    pub choice1_label: String,
    pub choice1_staked: BigDecimal,
    pub comparison_type: Option<i16>,
    pub asset_key: Option<String>,
    pub target_value: Option<BigDecimal>,
    pub event_id: Option<i64>,
    pub team_flag: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Market {
    /// Build the row inserted on first sighting of a market.
    ///
    /// Stakes, pool and resolution start empty: they only move through
    /// `WagerPlaced` and `MarketResolved` events, which are applied on top.
    pub fn from_snapshot(snapshot: &MarketSnapshot, created_at: DateTime<Utc>) -> Self {
        let (comparison_type, asset_key, target_value, event_id, team_flag) = match &snapshot.details {
            MarketDetails::General => (None, None, None, None, None),
            MarketDetails::Crypto { comparison_type, asset_key, target_value } => (
                Some(i16::from(*comparison_type)),
                Some(asset_key.clone()),
                Some(target_value.clone()),
                None,
                None,
            ),
            MarketDetails::Sports { event_id, team_flag } => (None, None, None, Some(*event_id), Some(*team_flag)),
            MarketDetails::Business { event_id } => (None, None, None, Some(*event_id), None),
        };

        Self {
            market_id: snapshot.market_id.clone(),
            title: snapshot.title.clone(),
            description: snapshot.description.clone(),
            market_type: snapshot.details.market_type().as_str().to_string(),
            category: snapshot.category.clone(),
            image_url: snapshot.image_url.clone(),
            end_time: snapshot.end_time,
            is_resolved: false,
            is_open: snapshot.is_open,
            winning_choice: None,
            total_pool: BigDecimal::from(0),
            creator: snapshot.creator.clone(),
            choice0_label: snapshot.choice0_label.clone(),
            choice0_staked: BigDecimal::from(0),
            choice1_label: snapshot.choice1_label.clone(),
            choice1_staked: BigDecimal::from(0),
            comparison_type,
            asset_key,
            target_value,
            event_id,
            team_flag,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Full market state as read directly from the prediction hub contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Lowercase `0x` hex without leading zeros
    pub market_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub image_url: String,
    /// Seconds since epoch
    pub end_time: i64,
    pub is_resolved: bool,
    pub is_open: bool,
    pub winning_choice: Option<ChoiceIndex>,
    pub total_pool: BigDecimal,
    pub creator: String,
    pub choice0_label: String,
    pub choice0_staked: BigDecimal,
    pub choice1_label: String,
    pub choice1_staked: BigDecimal,
    pub details: MarketDetails,
}

/// Type-specific market fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MarketDetails {
    General,
    Crypto {
        comparison_type: u8,
        asset_key: String,
        target_value: BigDecimal,
    },
    Sports {
        event_id: i64,
        team_flag: bool,
    },
    Business {
        event_id: i64,
    },
}

impl MarketDetails {
    pub fn market_type(&self) -> MarketType {
        match self {
            MarketDetails::General => MarketType::General,
            MarketDetails::Crypto { .. } => MarketType::Crypto,
            MarketDetails::Sports { .. } => MarketType::Sports,
            MarketDetails::Business { .. } => MarketType::Business,
        }
    }
}

/// Market type discriminant as emitted by the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    General,
    Crypto,
    Sports,
    Business,
}

impl MarketType {
    pub fn from_discriminant(value: u64) -> SyncResult<Self> {
        match value {
            0 => Ok(MarketType::General),
            1 => Ok(MarketType::Crypto),
            2 => Ok(MarketType::Sports),
            3 => Ok(MarketType::Business),
            other => Err(SyncError::Decode(format!("unsupported market type {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::General => "general",
            MarketType::Crypto => "crypto",
            MarketType::Sports => "sports",
            MarketType::Business => "business",
        }
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the two outcomes of a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChoiceIndex {
    Choice0,
    Choice1,
}

impl ChoiceIndex {
    pub fn from_index(value: u64) -> SyncResult<Self> {
        match value {
            0 => Ok(ChoiceIndex::Choice0),
            1 => Ok(ChoiceIndex::Choice1),
            other => Err(SyncError::Decode(format!("invalid choice index {}", other))),
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            ChoiceIndex::Choice0 => 0,
            ChoiceIndex::Choice1 => 1,
        }
    }
}

impl std::fmt::Display for ChoiceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i16())
    }
}

/// Identity of one wager event, used to make wager projection replay-safe
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WagerKey {
    pub tx_hash: String,
    pub event_index: u32,
}
