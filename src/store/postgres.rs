//! PostgreSQL storage adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    AccountSnapshot, Cycle, CycleOutcome, Decision, Reflection, Trade, TradeAction, TradeStatus,
    TriggerSource,
};
use crate::error::{Result, TillerError};
use crate::mode::Mode;

use super::Store;

const MODE_KEY: &str = "mode";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode<T>(column: &str, raw: &str) -> Result<T>
where
    T: for<'a> TryFrom<&'a str, Error = String>,
{
    T::try_from(raw).map_err(|e| TillerError::Persistence(format!("bad {column} column: {e}")))
}

fn cycle_from_row(row: &PgRow) -> Result<Cycle> {
    let trigger: String = row.get("trigger_source");
    let outcome: Option<String> = row.get("outcome");
    Ok(Cycle {
        id: row.get("id"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
        trigger_source: decode::<TriggerSource>("trigger_source", &trigger)?,
        outcome: outcome
            .map(|o| decode::<CycleOutcome>("outcome", &o))
            .transpose()?,
        decision_ref: row.get("decision_ref"),
    })
}

fn decision_from_row(row: &PgRow) -> Result<Decision> {
    let action: String = row.get("action");
    Ok(Decision {
        id: row.get("id"),
        cycle_id: row.get("cycle_id"),
        timestamp: row.get("timestamp"),
        action: decode::<TradeAction>("action", &action)?,
        symbol: row.get("symbol"),
        quantity: row.get("quantity"),
        reasoning: row.get("reasoning"),
        risk_score: row.get::<i16, _>("risk_score") as u8,
        executed: row.get("executed"),
        trade_ref: row.get("trade_ref"),
    })
}

fn trade_from_row(row: &PgRow) -> Result<Trade> {
    let action: String = row.get("action");
    let status: String = row.get("status");
    Ok(Trade {
        id: row.get("id"),
        decision_id: row.get("decision_id"),
        timestamp: row.get("timestamp"),
        symbol: row.get("symbol"),
        action: decode::<TradeAction>("action", &action)?,
        quantity: row.get("quantity"),
        price: row.get("price"),
        fee: row.get("fee"),
        status: decode::<TradeStatus>("status", &status)?,
        total_value: row.get("total_value"),
    })
}

fn reflection_from_row(row: &PgRow) -> Reflection {
    Reflection {
        id: row.get("id"),
        period_start: row.get("period_start"),
        period_end: row.get("period_end"),
        trades_analyzed: row.get("trades_analyzed"),
        total_pnl: row.get("total_pnl"),
        win_rate: row.get("win_rate"),
        content: row.get("content"),
        lessons_learned: row.get("lessons_learned"),
    }
}

fn snapshot_from_row(row: &PgRow) -> AccountSnapshot {
    AccountSnapshot {
        timestamp: row.get("timestamp"),
        cash: row.get("cash"),
        positions_value: row.get("positions_value"),
        total_value: row.get("total_value"),
        pnl: row.get("pnl"),
        pnl_percent: row.get("pnl_percent"),
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn append_cycle(&self, cycle: &Cycle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cycles (id, started_at, ended_at, trigger_source, outcome, decision_ref)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(cycle.id)
        .bind(cycle.started_at)
        .bind(cycle.ended_at)
        .bind(cycle.trigger_source.as_str())
        .bind(cycle.outcome.map(|o| o.as_str()))
        .bind(cycle.decision_ref)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close_cycle(&self, cycle: &Cycle) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE cycles
            SET ended_at = $2, outcome = $3, decision_ref = $4
            WHERE id = $1
            "#,
        )
        .bind(cycle.id)
        .bind(cycle.ended_at)
        .bind(cycle.outcome.map(|o| o.as_str()))
        .bind(cycle.decision_ref)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TillerError::Persistence(format!(
                "cycle {} not found on close",
                cycle.id
            )));
        }
        Ok(())
    }

    async fn open_cycle(&self) -> Result<Option<Cycle>> {
        let row = sqlx::query(
            r#"
            SELECT id, started_at, ended_at, trigger_source, outcome, decision_ref
            FROM cycles
            WHERE ended_at IS NULL
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(cycle_from_row).transpose()
    }

    async fn recent_cycles(&self, limit: i64) -> Result<Vec<Cycle>> {
        let rows = sqlx::query(
            r#"
            SELECT id, started_at, ended_at, trigger_source, outcome, decision_ref
            FROM cycles
            ORDER BY started_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(cycle_from_row).collect()
    }

    async fn append_decision(&self, decision: &Decision) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO decisions (
                id, cycle_id, timestamp, action, symbol, quantity,
                reasoning, risk_score, executed, trade_ref
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(decision.id)
        .bind(decision.cycle_id)
        .bind(decision.timestamp)
        .bind(decision.action.as_str())
        .bind(&decision.symbol)
        .bind(decision.quantity)
        .bind(&decision.reasoning)
        .bind(decision.risk_score as i16)
        .bind(decision.executed)
        .bind(decision.trade_ref)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn attach_trade(&self, decision_id: Uuid, trade_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE decisions
            SET executed = TRUE, trade_ref = $2
            WHERE id = $1
            "#,
        )
        .bind(decision_id)
        .bind(trade_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TillerError::Persistence(format!(
                "decision {decision_id} not found when attaching trade"
            )));
        }
        Ok(())
    }

    async fn recent_decisions(&self, limit: i64) -> Result<Vec<Decision>> {
        let rows = sqlx::query(
            r#"
            SELECT id, cycle_id, timestamp, action, symbol, quantity,
                   reasoning, risk_score, executed, trade_ref
            FROM decisions
            ORDER BY timestamp DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decision_from_row).collect()
    }

    async fn decisions_since(&self, since: DateTime<Utc>) -> Result<Vec<Decision>> {
        let rows = sqlx::query(
            r#"
            SELECT id, cycle_id, timestamp, action, symbol, quantity,
                   reasoning, risk_score, executed, trade_ref
            FROM decisions
            WHERE timestamp > $1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decision_from_row).collect()
    }

    async fn append_trade(&self, trade: &Trade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, decision_id, timestamp, symbol, action, quantity,
                price, fee, status, total_value
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(trade.id)
        .bind(trade.decision_id)
        .bind(trade.timestamp)
        .bind(&trade.symbol)
        .bind(trade.action.as_str())
        .bind(trade.quantity)
        .bind(trade.price)
        .bind(trade.fee)
        .bind(trade.status.as_str())
        .bind(trade.total_value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>> {
        let rows = sqlx::query(
            r#"
            SELECT id, decision_id, timestamp, symbol, action, quantity,
                   price, fee, status, total_value
            FROM trades
            ORDER BY timestamp DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trade_from_row).collect()
    }

    async fn trades_since(&self, since: DateTime<Utc>) -> Result<Vec<Trade>> {
        let rows = sqlx::query(
            r#"
            SELECT id, decision_id, timestamp, symbol, action, quantity,
                   price, fee, status, total_value
            FROM trades
            WHERE timestamp > $1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trade_from_row).collect()
    }

    async fn filled_trades_since(&self, since: DateTime<Utc>) -> Result<u32> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM trades
            WHERE status = 'FILLED' AND timestamp > $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count as u32)
    }

    async fn append_reflection(&self, reflection: &Reflection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reflections (
                id, period_start, period_end, trades_analyzed,
                total_pnl, win_rate, content, lessons_learned
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(reflection.id)
        .bind(reflection.period_start)
        .bind(reflection.period_end)
        .bind(reflection.trades_analyzed)
        .bind(reflection.total_pnl)
        .bind(reflection.win_rate)
        .bind(&reflection.content)
        .bind(&reflection.lessons_learned)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_reflection(&self) -> Result<Option<Reflection>> {
        let row = sqlx::query(
            r#"
            SELECT id, period_start, period_end, trades_analyzed,
                   total_pnl, win_rate, content, lessons_learned
            FROM reflections
            ORDER BY period_end DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(reflection_from_row))
    }

    async fn recent_reflections(&self, limit: i64) -> Result<Vec<Reflection>> {
        let rows = sqlx::query(
            r#"
            SELECT id, period_start, period_end, trades_analyzed,
                   total_pnl, win_rate, content, lessons_learned
            FROM reflections
            ORDER BY period_end DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(reflection_from_row).collect())
    }

    async fn append_snapshot(&self, snapshot: &AccountSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO account_snapshots (
                timestamp, cash, positions_value, total_value, pnl, pnl_percent
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.timestamp)
        .bind(snapshot.cash)
        .bind(snapshot.positions_value)
        .bind(snapshot.total_value)
        .bind(snapshot.pnl)
        .bind(snapshot.pnl_percent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn first_snapshot(&self) -> Result<Option<AccountSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT timestamp, cash, positions_value, total_value, pnl, pnl_percent
            FROM account_snapshots
            ORDER BY timestamp ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(snapshot_from_row))
    }

    async fn latest_snapshot(&self) -> Result<Option<AccountSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT timestamp, cash, positions_value, total_value, pnl, pnl_percent
            FROM account_snapshots
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(snapshot_from_row))
    }

    async fn recent_snapshots(&self, limit: i64) -> Result<Vec<AccountSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, cash, positions_value, total_value, pnl, pnl_percent
            FROM account_snapshots
            ORDER BY timestamp DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(snapshot_from_row).collect())
    }

    async fn load_mode(&self) -> Result<Option<Mode>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM scheduler_state WHERE key = $1
            "#,
        )
        .bind(MODE_KEY)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(decode::<Mode>("mode", &raw)?))
            }
            None => Ok(None),
        }
    }

    async fn save_mode(&self, mode: Mode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_state (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(MODE_KEY)
        .bind(mode.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
