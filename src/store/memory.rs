//! In-memory store for dry runs and tests. Same logical schema as the
//! PostgreSQL store, backed by vectors behind one async lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{AccountSnapshot, Cycle, Decision, Reflection, Trade, TradeStatus};
use crate::error::{Result, TillerError};
use crate::mode::Mode;

use super::Store;

#[derive(Default)]
struct Inner {
    cycles: Vec<Cycle>,
    decisions: Vec<Decision>,
    trades: Vec<Trade>,
    reflections: Vec<Reflection>,
    snapshots: Vec<AccountSnapshot>,
    mode: Option<Mode>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append_cycle(&self, cycle: &Cycle) -> Result<()> {
        self.inner.write().await.cycles.push(cycle.clone());
        Ok(())
    }

    async fn close_cycle(&self, cycle: &Cycle) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .cycles
            .iter_mut()
            .find(|c| c.id == cycle.id)
            .ok_or_else(|| {
                TillerError::Persistence(format!("cycle {} not found", cycle.id))
            })?;
        *stored = cycle.clone();
        Ok(())
    }

    async fn open_cycle(&self) -> Result<Option<Cycle>> {
        let inner = self.inner.read().await;
        Ok(inner.cycles.iter().find(|c| c.is_open()).cloned())
    }

    async fn recent_cycles(&self, limit: i64) -> Result<Vec<Cycle>> {
        let inner = self.inner.read().await;
        Ok(latest(&inner.cycles, limit, |c: &Cycle| c.started_at))
    }

    async fn append_decision(&self, decision: &Decision) -> Result<()> {
        self.inner.write().await.decisions.push(decision.clone());
        Ok(())
    }

    async fn attach_trade(&self, decision_id: Uuid, trade_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let decision = inner
            .decisions
            .iter_mut()
            .find(|d| d.id == decision_id)
            .ok_or_else(|| {
                TillerError::Persistence(format!("decision {decision_id} not found"))
            })?;
        decision.mark_executed(trade_id);
        Ok(())
    }

    async fn recent_decisions(&self, limit: i64) -> Result<Vec<Decision>> {
        let inner = self.inner.read().await;
        Ok(latest(&inner.decisions, limit, |d: &Decision| d.timestamp))
    }

    async fn decisions_since(&self, since: DateTime<Utc>) -> Result<Vec<Decision>> {
        let inner = self.inner.read().await;
        Ok(inner
            .decisions
            .iter()
            .filter(|d| d.timestamp > since)
            .cloned()
            .collect())
    }

    async fn append_trade(&self, trade: &Trade) -> Result<()> {
        self.inner.write().await.trades.push(trade.clone());
        Ok(())
    }

    async fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>> {
        let inner = self.inner.read().await;
        Ok(latest(&inner.trades, limit, |t: &Trade| t.timestamp))
    }

    async fn trades_since(&self, since: DateTime<Utc>) -> Result<Vec<Trade>> {
        let inner = self.inner.read().await;
        Ok(inner
            .trades
            .iter()
            .filter(|t| t.timestamp > since)
            .cloned()
            .collect())
    }

    async fn filled_trades_since(&self, since: DateTime<Utc>) -> Result<u32> {
        let inner = self.inner.read().await;
        Ok(inner
            .trades
            .iter()
            .filter(|t| t.status == TradeStatus::Filled && t.timestamp > since)
            .count() as u32)
    }

    async fn append_reflection(&self, reflection: &Reflection) -> Result<()> {
        self.inner.write().await.reflections.push(reflection.clone());
        Ok(())
    }

    async fn latest_reflection(&self) -> Result<Option<Reflection>> {
        let inner = self.inner.read().await;
        Ok(inner
            .reflections
            .iter()
            .max_by_key(|r| r.period_end)
            .cloned())
    }

    async fn recent_reflections(&self, limit: i64) -> Result<Vec<Reflection>> {
        let inner = self.inner.read().await;
        Ok(latest(&inner.reflections, limit, |r: &Reflection| {
            r.period_end
        }))
    }

    async fn append_snapshot(&self, snapshot: &AccountSnapshot) -> Result<()> {
        self.inner.write().await.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn first_snapshot(&self) -> Result<Option<AccountSnapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .iter()
            .min_by_key(|s| s.timestamp)
            .cloned())
    }

    async fn latest_snapshot(&self) -> Result<Option<AccountSnapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .iter()
            .max_by_key(|s| s.timestamp)
            .cloned())
    }

    async fn recent_snapshots(&self, limit: i64) -> Result<Vec<AccountSnapshot>> {
        let inner = self.inner.read().await;
        Ok(latest(&inner.snapshots, limit, |s: &AccountSnapshot| {
            s.timestamp
        }))
    }

    async fn load_mode(&self) -> Result<Option<Mode>> {
        Ok(self.inner.read().await.mode)
    }

    async fn save_mode(&self, mode: Mode) -> Result<()> {
        self.inner.write().await.mode = Some(mode);
        Ok(())
    }
}

fn latest<T: Clone>(items: &[T], limit: i64, key: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut sorted: Vec<T> = items.to_vec();
    sorted.sort_by_key(|item| std::cmp::Reverse(key(item)));
    sorted.truncate(limit.max(0) as usize);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TradeAction, TriggerSource};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn cycle_round_trip() {
        let store = MemoryStore::new();
        let mut cycle = Cycle::begin(TriggerSource::Manual);
        store.append_cycle(&cycle).await.unwrap();

        assert!(store.open_cycle().await.unwrap().is_some());

        cycle.close(crate::domain::CycleOutcome::Executed, None);
        store.close_cycle(&cycle).await.unwrap();

        assert!(store.open_cycle().await.unwrap().is_none());
        let recent = store.recent_cycles(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert!(!recent[0].is_open());
    }

    #[tokio::test]
    async fn attach_trade_marks_decision_executed() {
        let store = MemoryStore::new();
        let decision = Decision::new(
            Uuid::new_v4(),
            TradeAction::Buy,
            Some("AAPL".to_string()),
            Some(10),
            "entry".to_string(),
            40,
        );
        store.append_decision(&decision).await.unwrap();

        let trade = Trade::filled(
            decision.id,
            "AAPL".to_string(),
            TradeAction::Buy,
            10,
            dec!(100),
            dec!(1),
        );
        store.append_trade(&trade).await.unwrap();
        store.attach_trade(decision.id, trade.id).await.unwrap();

        let stored = &store.recent_decisions(1).await.unwrap()[0];
        assert!(stored.executed);
        assert_eq!(stored.trade_ref, Some(trade.id));
    }

    #[tokio::test]
    async fn filled_trade_count_ignores_rejected() {
        let store = MemoryStore::new();
        let decision_id = Uuid::new_v4();
        store
            .append_trade(&Trade::filled(
                decision_id,
                "AAPL".to_string(),
                TradeAction::Buy,
                1,
                dec!(100),
                dec!(1),
            ))
            .await
            .unwrap();
        store
            .append_trade(&Trade::rejected(
                decision_id,
                "MSFT".to_string(),
                TradeAction::Buy,
                1,
                dec!(400),
            ))
            .await
            .unwrap();

        let count = store
            .filled_trades_since(DateTime::<Utc>::MIN_UTC)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn mode_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load_mode().await.unwrap().is_none());
        store.save_mode(Mode::Auto).await.unwrap();
        assert_eq!(store.load_mode().await.unwrap(), Some(Mode::Auto));
    }
}
