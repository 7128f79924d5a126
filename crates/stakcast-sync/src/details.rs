use alloy::primitives::U256;
use std::sync::Arc;

use stakcast_common::{ChoiceIndex, MarketDetails, MarketSnapshot, MarketType, SyncError, SyncResult};

use crate::chain::ChainClient;
use crate::felt::{felt_to_hex, to_big_decimal, u256_to_calldata, Felt, FeltReader};

/// View entry point returning the full market tuple for a market type
pub fn entry_point(market_type: MarketType) -> &'static str {
    match market_type {
        MarketType::General => "get_prediction",
        MarketType::Crypto => "get_crypto_prediction",
        MarketType::Sports => "get_sports_prediction",
        MarketType::Business => "get_business_prediction",
    }
}

/// Reads complete market state back from the prediction hub contract.
pub struct MarketDetailFetcher {
    chain: Arc<dyn ChainClient>,
    contract: Felt,
}

impl MarketDetailFetcher {
    pub fn new(chain: Arc<dyn ChainClient>, contract: Felt) -> Self {
        Self { chain, contract }
    }

    /// Read the market as of the end of `block`, the block that created it.
    pub async fn fetch(&self, market_id: U256, market_type: u8, block: u64) -> SyncResult<MarketSnapshot> {
        let market_type = MarketType::from_discriminant(u64::from(market_type))?;
        let method = entry_point(market_type);

        let felts = self
            .chain
            .read_call(self.contract, method, &u256_to_calldata(market_id), block)
            .await?;
        tracing::debug!(
            market_id = %felt_to_hex(market_id),
            %market_type,
            block,
            "{} returned {} felts",
            method,
            felts.len()
        );

        let snapshot = decode_snapshot(market_type, &felts)?;
        if snapshot.market_id != felt_to_hex(market_id) {
            return Err(SyncError::Decode(format!(
                "{} returned market {} for requested market {}",
                method,
                snapshot.market_id,
                felt_to_hex(market_id)
            )));
        }
        Ok(snapshot)
    }
}

/// Decode the Cairo-serialized market tuple for the given market type
pub fn decode_snapshot(market_type: MarketType, felts: &[Felt]) -> SyncResult<MarketSnapshot> {
    let mut r = FeltReader::new(felts);

    let market_id = felt_to_hex(r.u256("market_id")?);
    let title = r.short_string("title")?;
    let description = r.short_string("description")?;
    let choice0_label = r.short_string("choices.label0")?;
    let choice0_staked = to_big_decimal(r.u256("choices.staked_amount0")?)?;
    let choice1_label = r.short_string("choices.label1")?;
    let choice1_staked = to_big_decimal(r.u256("choices.staked_amount1")?)?;
    let category = r.short_string("category")?;
    let image_url = r.short_string("image_url")?;
    let is_resolved = r.bool("is_resolved")?;
    let is_open = r.bool("is_open")?;
    let end_time = r.i64("end_time")?;
    let winning_choice = r
        .option_u8("winning_choice")?
        .map(|c| ChoiceIndex::from_index(u64::from(c)))
        .transpose()?;
    let total_pool = to_big_decimal(r.u256("total_pool")?)?;
    let creator = felt_to_hex(r.felt("creator")?);

    let details = match market_type {
        MarketType::General => MarketDetails::General,
        MarketType::Crypto => MarketDetails::Crypto {
            comparison_type: r.u8("comparison_type")?,
            asset_key: r.short_string("asset_key")?,
            target_value: to_big_decimal(r.felt("target_value")?)?,
        },
        MarketType::Sports => MarketDetails::Sports {
            event_id: r.i64("event_id")?,
            team_flag: r.bool("team_flag")?,
        },
        MarketType::Business => MarketDetails::Business {
            event_id: r.i64("event_id")?,
        },
    };

    if r.remaining() > 0 {
        tracing::debug!("{} trailing felts ignored in {} market tuple", r.remaining(), market_type);
    }

    Ok(MarketSnapshot {
        market_id,
        title,
        description,
        category,
        image_url,
        end_time,
        is_resolved,
        is_open,
        winning_choice,
        total_pool,
        creator,
        choice0_label,
        choice0_staked,
        choice1_label,
        choice1_staked,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{market_tuple, short_string, MarketState, ScriptedChain};
    use bigdecimal::BigDecimal;

    #[test]
    fn test_decode_general_market() {
        let felts = market_tuple(U256::from(1u8), MarketType::General);
        let snapshot = decode_snapshot(MarketType::General, &felts).unwrap();

        assert_eq!(snapshot.market_id, "0x1");
        assert_eq!(snapshot.title, "Rain tomorrow?");
        assert_eq!(snapshot.choice0_label, "Yes");
        assert_eq!(snapshot.choice1_label, "No");
        assert_eq!(snapshot.total_pool, BigDecimal::from(0));
        assert!(snapshot.is_open);
        assert_eq!(snapshot.winning_choice, None);
        assert_eq!(snapshot.details, MarketDetails::General);
    }

    #[test]
    fn test_decode_crypto_suffix() {
        let mut felts = market_tuple(U256::from(7u8), MarketType::General);
        felts.extend([U256::from(1u8), short_string("BTC/USD"), U256::from(100_000u64)]);

        let snapshot = decode_snapshot(MarketType::Crypto, &felts).unwrap();
        assert_eq!(
            snapshot.details,
            MarketDetails::Crypto {
                comparison_type: 1,
                asset_key: "BTC/USD".to_string(),
                target_value: BigDecimal::from(100_000),
            }
        );
    }

    #[test]
    fn test_decode_sports_requires_suffix() {
        let felts = market_tuple(U256::from(7u8), MarketType::General);
        let err = decode_snapshot(MarketType::Sports, &felts).unwrap_err();
        assert!(matches!(err, SyncError::Decode(ref msg) if msg.contains("event_id")));
    }

    #[test]
    fn test_decode_rejects_end_time_beyond_i64() {
        let mut felts = market_tuple(U256::from(1u8), MarketType::General);
        // end_time follows id (2), title, description, two choices (3 each),
        // category, image_url, is_resolved and is_open
        felts[14] = U256::from(u64::MAX);
        let err = decode_snapshot(MarketType::General, &felts).unwrap_err();
        assert!(matches!(err, SyncError::Decode(ref msg) if msg.contains("end_time")));
    }

    #[tokio::test]
    async fn test_fetch_reads_state_at_creation_block() {
        let chain = Arc::new(ScriptedChain::new(10));
        let id = U256::from(4u8);
        chain.set_market_state(id, MarketType::General, 5, MarketState::default());
        chain.set_market_state(id, MarketType::General, 8, MarketState { staked0: 300, ..Default::default() });
        let fetcher = MarketDetailFetcher::new(chain.clone(), U256::from(0x123u32));

        assert_eq!(fetcher.fetch(id, 0, 6).await.unwrap().total_pool, BigDecimal::from(0));
        assert_eq!(fetcher.fetch(id, 0, 9).await.unwrap().total_pool, BigDecimal::from(300));
        assert!(fetcher.fetch(id, 0, 4).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_uses_entry_point_for_type() {
        let chain = Arc::new(ScriptedChain::new(0));
        chain.set_market(U256::from(3u8), MarketType::Business);
        let fetcher = MarketDetailFetcher::new(chain.clone(), U256::from(0x123u32));

        let snapshot = fetcher.fetch(U256::from(3u8), 3, 40).await.unwrap();
        assert_eq!(snapshot.details, MarketDetails::Business { event_id: 77 });
        assert_eq!(chain.calls(), vec![("get_business_prediction".to_string(), 40)]);
    }

    #[tokio::test]
    async fn test_unsupported_type_fails_before_rpc() {
        let chain = Arc::new(ScriptedChain::new(0));
        let fetcher = MarketDetailFetcher::new(chain.clone(), U256::from(0x123u32));

        let err = fetcher.fetch(U256::from(1u8), 9, 1).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_market_id_is_rejected() {
        let chain = Arc::new(ScriptedChain::new(0));
        chain.set_call_response("get_prediction", market_tuple(U256::from(2u8), MarketType::General));
        let fetcher = MarketDetailFetcher::new(chain, U256::from(0x123u32));

        assert!(fetcher.fetch(U256::from(1u8), 0, 1).await.is_err());
    }
}
