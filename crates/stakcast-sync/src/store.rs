use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::PgPool;

use stakcast_common::{ChoiceIndex, Market, MarketSnapshot, SyncError, SyncResult, WagerKey};

use crate::projection::{BlockContext, ProjectionSink};

/// Market read-model in PostgreSQL
pub struct PgMarketStore {
    pool: PgPool,
}

impl PgMarketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_market(&self, market_id: &str) -> SyncResult<Option<Market>> {
        let market = sqlx::query_as::<_, Market>("SELECT * FROM markets WHERE market_id = $1")
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(market)
    }
}

#[async_trait]
impl ProjectionSink for PgMarketStore {
    async fn upsert_created(&self, snapshot: &MarketSnapshot, block: BlockContext) -> SyncResult<bool> {
        let market = Market::from_snapshot(snapshot, block.time()?);

        let result = sqlx::query(
            "INSERT INTO markets (
                market_id, title, description, market_type, category, image_url, end_time,
                is_resolved, is_open, winning_choice, total_pool, creator,
                choice0_label, choice0_staked, choice1_label, choice1_staked,
                comparison_type, asset_key, target_value, event_id, team_flag,
                created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                     $17, $18, $19, $20, $21, $22, $23)
             ON CONFLICT (market_id) DO NOTHING"
        )
        .bind(&market.market_id)
        .bind(&market.title)
        .bind(&market.description)
        .bind(&market.market_type)
        .bind(&market.category)
        .bind(&market.image_url)
        .bind(market.end_time)
        .bind(market.is_resolved)
        .bind(market.is_open)
        .bind(market.winning_choice)
        .bind(&market.total_pool)
        .bind(&market.creator)
        .bind(&market.choice0_label)
        .bind(&market.choice0_staked)
        .bind(&market.choice1_label)
        .bind(&market.choice1_staked)
        .bind(market.comparison_type)
        .bind(&market.asset_key)
        .bind(&market.target_value)
        .bind(market.event_id)
        .bind(market.team_flag)
        .bind(market.created_at)
        .bind(market.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_resolved(&self, market_id: &str, choice: ChoiceIndex, block: BlockContext) -> SyncResult<bool> {
        let result = sqlx::query(
            "UPDATE markets
             SET is_resolved = true, is_open = false, winning_choice = $2, updated_at = $3
             WHERE market_id = $1 AND is_resolved = false"
        )
        .bind(market_id)
        .bind(choice.as_i16())
        .bind(block.time()?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM markets WHERE market_id = $1")
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(SyncError::NotFound(format!("market {} (resolution)", market_id))),
        }
    }

    async fn apply_wager(
        &self,
        key: &WagerKey,
        market_id: &str,
        choice: ChoiceIndex,
        amount: &BigDecimal,
        block: BlockContext,
    ) -> SyncResult<bool> {
        let updated_at = block.time()?;
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent increments on the same market
        let exists: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM markets WHERE market_id = $1 FOR UPDATE")
            .bind(market_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(SyncError::NotFound(format!("market {} (wager in {})", market_id, key.tx_hash)));
        }

        let inserted = sqlx::query(
            "INSERT INTO applied_wagers (tx_hash, event_index, market_id, choice, amount, block_number)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (tx_hash, event_index) DO NOTHING"
        )
        .bind(&key.tx_hash)
        .bind(key.event_index as i32)
        .bind(market_id)
        .bind(choice.as_i16())
        .bind(amount)
        .bind(block.number as i64)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE markets
             SET total_pool = total_pool + $2,
                 choice0_staked = choice0_staked + CASE WHEN $3 = 0 THEN $2 ELSE 0 END,
                 choice1_staked = choice1_staked + CASE WHEN $3 = 1 THEN $2 ELSE 0 END,
                 updated_at = $4
             WHERE market_id = $1"
        )
        .bind(market_id)
        .bind(amount)
        .bind(choice.as_i16())
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
