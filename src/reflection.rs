//! Reflection cadence tracker.
//!
//! Counts FILLED trades since the last reflection. The crossing check runs
//! inside the scheduler's single-flight critical section (the cycle that
//! pushed the counter over the threshold is still holding the lock), so two
//! reflections can never be generated concurrently.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::Reflection;
use crate::error::Result;
use crate::store::Store;
use crate::summarizer::{Summarizer, TradeWindow};

pub struct ReflectionTracker {
    threshold: u32,
    counter: AtomicU32,
    store: Arc<dyn Store>,
    summarizer: Arc<dyn Summarizer>,
}

impl ReflectionTracker {
    pub fn new(threshold: u32, store: Arc<dyn Store>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            threshold,
            counter: AtomicU32::new(0),
            store,
            summarizer,
        }
    }

    /// Rebuild the counter from the store on startup: filled trades after
    /// the latest reflection's period end.
    pub async fn resync(&self) -> Result<()> {
        let since = self.last_period_end().await?;
        let count = self.store.filled_trades_since(since).await?;
        self.counter.store(count, Ordering::SeqCst);
        info!(
            trades = count,
            threshold = self.threshold,
            "reflection counter synced from store"
        );
        Ok(())
    }

    pub fn trades_since_reflection(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record a completed cycle's fills. When the counter crosses the
    /// threshold, generate and persist a reflection and reset the counter
    /// to zero. A summarizer failure keeps the counter so the next cycle
    /// retries the crossing.
    pub async fn on_cycle_completed(&self, filled_trades: u32) -> Result<Option<Reflection>> {
        if filled_trades > 0 {
            self.counter.fetch_add(filled_trades, Ordering::SeqCst);
        }

        let count = self.counter.load(Ordering::SeqCst);
        if count < self.threshold {
            return Ok(None);
        }

        info!(
            trades = count,
            threshold = self.threshold,
            "trade threshold reached, generating reflection"
        );

        let period_start = self.last_period_end().await?;
        let period_end = Utc::now();
        let window = TradeWindow {
            period_start,
            period_end,
            trades: self.store.trades_since(period_start).await?,
            decisions: self.store.decisions_since(period_start).await?,
        };
        let trades_analyzed = window.trades.len() as i32;

        let summary = match self.summarizer.summarize(&window).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("summarizer failed, reflection deferred: {e}");
                return Ok(None);
            }
        };

        let reflection = Reflection::new(
            period_start,
            period_end,
            trades_analyzed,
            summary.total_pnl,
            summary.win_rate,
            summary.content,
            summary.lessons_learned,
        );
        self.store.append_reflection(&reflection).await?;
        self.counter.store(0, Ordering::SeqCst);

        info!(
            reflection_id = %reflection.id,
            trades_analyzed,
            win_rate = reflection.win_rate,
            "reflection persisted"
        );
        Ok(Some(reflection))
    }

    async fn last_period_end(&self) -> Result<DateTime<Utc>> {
        Ok(self
            .store
            .latest_reflection()
            .await?
            .map(|r| r.period_end)
            .unwrap_or(DateTime::<Utc>::MIN_UTC))
    }
}
