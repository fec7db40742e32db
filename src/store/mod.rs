//! Persistence layer.
//!
//! The store is append-friendly: cycles, decisions, trades, reflections,
//! and snapshots are written once (cycles close once, decisions gain a
//! trade reference once) and read back in reverse-chronological order by
//! the control API. Writes must be durable before a cycle is considered
//! closed; reads are monotonic for external pollers.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{AccountSnapshot, Cycle, Decision, Reflection, Trade};
use crate::error::Result;
use crate::mode::Mode;

/// Logical schema contract for the audit trail
#[async_trait]
pub trait Store: Send + Sync {
    // ==================== Cycles ====================

    async fn append_cycle(&self, cycle: &Cycle) -> Result<()>;

    /// Persist the terminal state of a cycle
    async fn close_cycle(&self, cycle: &Cycle) -> Result<()>;

    /// The open cycle, if any (at most one exists)
    async fn open_cycle(&self) -> Result<Option<Cycle>>;

    async fn recent_cycles(&self, limit: i64) -> Result<Vec<Cycle>>;

    // ==================== Decisions ====================

    async fn append_decision(&self, decision: &Decision) -> Result<()>;

    /// Mark a decision executed and attach its trade
    async fn attach_trade(&self, decision_id: Uuid, trade_id: Uuid) -> Result<()>;

    async fn recent_decisions(&self, limit: i64) -> Result<Vec<Decision>>;

    async fn decisions_since(&self, since: DateTime<Utc>) -> Result<Vec<Decision>>;

    // ==================== Trades ====================

    async fn append_trade(&self, trade: &Trade) -> Result<()>;

    async fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>>;

    async fn trades_since(&self, since: DateTime<Utc>) -> Result<Vec<Trade>>;

    /// Count of FILLED trades after the given instant
    async fn filled_trades_since(&self, since: DateTime<Utc>) -> Result<u32>;

    // ==================== Reflections ====================

    async fn append_reflection(&self, reflection: &Reflection) -> Result<()>;

    async fn latest_reflection(&self) -> Result<Option<Reflection>>;

    async fn recent_reflections(&self, limit: i64) -> Result<Vec<Reflection>>;

    // ==================== Snapshots ====================

    async fn append_snapshot(&self, snapshot: &AccountSnapshot) -> Result<()>;

    /// Earliest snapshot ever taken; its total value is the PnL baseline
    async fn first_snapshot(&self) -> Result<Option<AccountSnapshot>>;

    async fn latest_snapshot(&self) -> Result<Option<AccountSnapshot>>;

    async fn recent_snapshots(&self, limit: i64) -> Result<Vec<AccountSnapshot>>;

    // ==================== Scheduler state ====================

    async fn load_mode(&self) -> Result<Option<Mode>>;

    async fn save_mode(&self, mode: Mode) -> Result<()>;
}
