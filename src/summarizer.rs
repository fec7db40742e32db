//! Summarizer collaborator contract plus the built-in statistical
//! implementation used when no language-model backend is wired in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::{Decision, Trade, TradeStatus};
use crate::error::Result;

/// The trades and decisions between two reflections
#[derive(Debug, Clone)]
pub struct TradeWindow {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub trades: Vec<Trade>,
    pub decisions: Vec<Decision>,
}

/// What a summarizer produces for one window
#[derive(Debug, Clone)]
pub struct TradeSummary {
    pub content: String,
    pub lessons_learned: Option<String>,
    /// Percentage of profitable exits, 0-100
    pub win_rate: f64,
    pub total_pnl: Decimal,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, window: &TradeWindow) -> Result<TradeSummary>;
}

/// Computes realized PnL and win rate from the window itself and formats a
/// plain-text review. Exit trades are matched against the average cost of
/// buys earlier in the window; exits without a basis in the window are
/// counted but not scored.
pub struct StatsSummarizer;

#[derive(Default)]
struct Basis {
    quantity: i64,
    avg_cost: Decimal,
}

impl StatsSummarizer {
    fn realized(window: &TradeWindow) -> (Decimal, usize, usize) {
        let mut basis: HashMap<&str, Basis> = HashMap::new();
        let mut total_pnl = Decimal::ZERO;
        let mut wins = 0usize;
        let mut scored_exits = 0usize;

        for trade in window.trades.iter().filter(|t| t.status == TradeStatus::Filled) {
            if trade.action.is_entry() {
                let entry = basis.entry(trade.symbol.as_str()).or_default();
                let old_cost = Decimal::from(entry.quantity) * entry.avg_cost;
                let added_cost = Decimal::from(trade.quantity) * trade.price;
                entry.quantity += trade.quantity;
                if entry.quantity > 0 {
                    entry.avg_cost = (old_cost + added_cost) / Decimal::from(entry.quantity);
                }
            } else if trade.action.is_exit() {
                let Some(entry) = basis.get_mut(trade.symbol.as_str()) else {
                    continue;
                };
                if entry.quantity == 0 {
                    continue;
                }
                let matched = trade.quantity.min(entry.quantity);
                let pnl =
                    (trade.price - entry.avg_cost) * Decimal::from(matched) - trade.fee;
                entry.quantity -= matched;
                total_pnl += pnl;
                scored_exits += 1;
                if pnl > Decimal::ZERO {
                    wins += 1;
                }
            }
        }

        (total_pnl, wins, scored_exits)
    }
}

#[async_trait]
impl Summarizer for StatsSummarizer {
    async fn summarize(&self, window: &TradeWindow) -> Result<TradeSummary> {
        let filled: Vec<&Trade> = window
            .trades
            .iter()
            .filter(|t| t.status == TradeStatus::Filled)
            .collect();
        let rejected = window.trades.len() - filled.len();
        let (total_pnl, wins, scored_exits) = Self::realized(window);

        let win_rate = if scored_exits > 0 {
            wins as f64 / scored_exits as f64 * 100.0
        } else {
            0.0
        };

        let mut lines = vec![
            format!(
                "Review of {} trade(s) ({} filled, {} rejected) between {} and {}.",
                window.trades.len(),
                filled.len(),
                rejected,
                window.period_start.format("%Y-%m-%d %H:%M"),
                window.period_end.format("%Y-%m-%d %H:%M"),
            ),
            format!(
                "Realized PnL ${total_pnl:.2} across {scored_exits} exit(s); win rate {win_rate:.1}%."
            ),
        ];
        for trade in &filled {
            lines.push(format!(
                "- {} {} {} {} @ ${}",
                trade.timestamp.format("%m-%d %H:%M"),
                trade.action,
                trade.quantity,
                trade.symbol,
                trade.price,
            ));
        }
        let unexecuted = window.decisions.iter().filter(|d| !d.executed).count();
        if unexecuted > 0 {
            lines.push(format!("{unexecuted} proposal(s) were not executed."));
        }

        let lessons = if total_pnl < Decimal::ZERO {
            Some("Losing window: tighten position sizing before the next run.".to_string())
        } else {
            None
        };

        Ok(TradeSummary {
            content: lines.join("\n"),
            lessons_learned: lessons,
            win_rate,
            total_pnl,
        })
    }
}
