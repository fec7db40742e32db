//! Decision orchestrator.
//!
//! Runs one full cycle: gather account context, obtain a proposal (from the
//! stop-loss override or the decision engine), gate it, execute it, and
//! persist the audit trail. Always invoked under the scheduler's
//! single-flight lock; recoverable engine/broker failures close the cycle
//! as FAILED, while store failures propagate to the caller.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::broker::{BrokerClient, OrderRequest};
use crate::clock::MarketSession;
use crate::config::{EngineConfig, RiskConfig};
use crate::domain::{
    AccountSnapshot, BrokerAccount, Cycle, CycleOutcome, Decision, Position, Trade, TradeAction,
};
use crate::engine::{DecisionEngine, EngineContext, Proposal};
use crate::error::Result;
use crate::reflection::ReflectionTracker;
use crate::risk::{AccountView, OrderProposal, RiskGate, RiskVerdict};
use crate::store::Store;

/// Risk score stamped on forced stop-loss and take-profit closes
const FORCED_CLOSE_RISK_SCORE: u8 = 50;

/// How many recent trades the engine gets to see
const ENGINE_TRADE_HISTORY: i64 = 5;

/// Thresholds the orchestrator enforces around the engine
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Account drawdown fraction that trips the close-all circuit breaker
    pub stop_loss_pct: Decimal,
    /// Per-position loss fraction forcing a close (zero disables)
    pub position_stop_loss_pct: Decimal,
    /// Per-position gain fraction taking profit (zero disables)
    pub position_take_profit_pct: Decimal,
    pub engine_timeout_secs: u64,
}

impl OrchestratorSettings {
    pub fn from_config(risk: &RiskConfig, engine: &EngineConfig) -> Self {
        Self {
            stop_loss_pct: risk.stop_loss_pct,
            position_stop_loss_pct: risk.position_stop_loss_pct,
            position_take_profit_pct: risk.position_take_profit_pct,
            engine_timeout_secs: engine.timeout_secs,
        }
    }
}

/// What a cycle produced, reported back to the scheduler
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub decision_ref: Option<Uuid>,
    pub filled_trades: u32,
}

impl CycleReport {
    pub fn failed() -> Self {
        Self {
            outcome: CycleOutcome::Failed,
            decision_ref: None,
            filled_trades: 0,
        }
    }

    pub fn skipped_market_closed() -> Self {
        Self {
            outcome: CycleOutcome::SkippedMarketClosed,
            decision_ref: None,
            filled_trades: 0,
        }
    }
}

enum Execution {
    Filled,
    BrokerRejected,
}

pub struct DecisionOrchestrator {
    broker: Arc<dyn BrokerClient>,
    engine: Arc<dyn DecisionEngine>,
    store: Arc<dyn Store>,
    gate: RiskGate,
    tracker: Arc<ReflectionTracker>,
    settings: OrchestratorSettings,
    shutdown: watch::Receiver<bool>,
}

impl DecisionOrchestrator {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        engine: Arc<dyn DecisionEngine>,
        store: Arc<dyn Store>,
        gate: RiskGate,
        tracker: Arc<ReflectionTracker>,
        settings: OrchestratorSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            broker,
            engine,
            store,
            gate,
            tracker,
            settings,
            shutdown,
        }
    }

    /// Run one cycle and notify the reflection tracker of its fills.
    /// The caller (scheduler) owns cycle creation and closing.
    pub async fn run_cycle(&self, cycle: &Cycle, session: MarketSession) -> Result<CycleReport> {
        let report = self.run_cycle_inner(cycle, session).await?;
        self.tracker.on_cycle_completed(report.filled_trades).await?;
        Ok(report)
    }

    async fn run_cycle_inner(
        &self,
        cycle: &Cycle,
        session: MarketSession,
    ) -> Result<CycleReport> {
        // Account context; a broker read failure fails the cycle, not the loop
        let account = match self.broker.account_state().await {
            Ok(account) => account,
            Err(e) => {
                warn!(cycle_id = %cycle.id, "failed to read account state: {e}");
                return Ok(CycleReport::failed());
            }
        };

        let baseline = self.store.first_snapshot().await?.map(|s| s.total_value);
        let snapshot = AccountSnapshot::from_account(&account, baseline);
        self.store.append_snapshot(&snapshot).await?;

        if self.shutdown_requested() {
            warn!(cycle_id = %cycle.id, "shutdown requested, abandoning cycle");
            return Ok(CycleReport::failed());
        }

        // Hard circuit breaker: account drawdown forces a close-all,
        // bypassing the engine entirely.
        let stop_loss_floor = -self.settings.stop_loss_pct * Decimal::ONE_HUNDRED;
        if snapshot.pnl_percent <= stop_loss_floor && !account.positions.is_empty() {
            warn!(
                pnl_percent = %snapshot.pnl_percent,
                floor = %stop_loss_floor,
                "account stop-loss breached, forcing close of all positions"
            );
            let reason = format!(
                "account stop-loss: pnl {}% breached floor {}%",
                snapshot.pnl_percent.round_dp(2),
                stop_loss_floor
            );
            return self
                .close_positions(cycle, session, &snapshot, &account.positions, &reason)
                .await;
        }

        // Per-position exit overrides, checked before the engine is asked
        if let Some((position, reason)) = self.position_exit(&account) {
            info!(symbol = %position.symbol, %reason, "position exit override");
            let positions = [position.clone()];
            return self
                .close_positions(cycle, session, &snapshot, &positions, &reason)
                .await;
        }

        // Engine proposal, under an explicit timeout
        let context = EngineContext {
            snapshot: snapshot.clone(),
            positions: account.positions.clone(),
            recent_trades: self.store.recent_trades(ENGINE_TRADE_HISTORY).await?,
            session,
            capabilities: EngineContext::default_capabilities(),
            timestamp: Utc::now(),
        };
        let timeout = Duration::from_secs(self.settings.engine_timeout_secs);
        let proposal = match tokio::time::timeout(timeout, self.engine.propose(&context)).await {
            Err(_) => {
                warn!(
                    cycle_id = %cycle.id,
                    "decision engine timed out after {}s",
                    self.settings.engine_timeout_secs
                );
                return Ok(CycleReport::failed());
            }
            Ok(Err(e)) => {
                warn!(cycle_id = %cycle.id, "decision engine failed: {e}");
                return Ok(CycleReport::failed());
            }
            Ok(Ok(proposal)) => proposal,
        };

        self.apply_proposal(cycle, session, &snapshot, &account, proposal)
            .await
    }

    /// Persist and (when permitted) execute the engine's proposal
    async fn apply_proposal(
        &self,
        cycle: &Cycle,
        session: MarketSession,
        snapshot: &AccountSnapshot,
        account: &BrokerAccount,
        proposal: Proposal,
    ) -> Result<CycleReport> {
        if proposal.action == TradeAction::Keep {
            let decision = Decision::new(
                cycle.id,
                TradeAction::Keep,
                proposal.symbol,
                proposal.quantity,
                proposal.reasoning,
                proposal.risk_score,
            );
            self.store.append_decision(&decision).await?;
            info!(cycle_id = %cycle.id, "engine decided to keep, no order placed");
            return Ok(CycleReport {
                outcome: CycleOutcome::Executed,
                decision_ref: Some(decision.id),
                filled_trades: 0,
            });
        }

        // A proposal that cannot be resolved into a concrete order is a
        // malformed engine response: no decision is recorded.
        let order = match resolve(&proposal, account) {
            Ok(order) => order,
            Err(e) => {
                warn!(cycle_id = %cycle.id, "malformed engine proposal: {e}");
                return Ok(CycleReport::failed());
            }
        };

        let mut decision = Decision::new(
            cycle.id,
            order.action,
            Some(order.symbol.clone()),
            Some(order.quantity),
            proposal.reasoning.clone(),
            order.risk_score,
        );
        self.store.append_decision(&decision).await?;
        let decision_ref = Some(decision.id);

        if !session.is_open() {
            info!(
                %session,
                action = %order.action,
                symbol = %order.symbol,
                "market not open, decision recorded without execution"
            );
            return Ok(CycleReport {
                outcome: CycleOutcome::SkippedMarketClosed,
                decision_ref,
                filled_trades: 0,
            });
        }

        let view = AccountView {
            total_value: snapshot.total_value,
            pending_symbols: HashSet::new(),
        };
        match self.gate.evaluate(&order, &view) {
            RiskVerdict::Reject(reason) => {
                info!(%reason, symbol = %order.symbol, "proposal rejected by risk gate");
                Ok(CycleReport {
                    outcome: CycleOutcome::SkippedRisk,
                    decision_ref,
                    filled_trades: 0,
                })
            }
            RiskVerdict::Accept => match self.execute(&mut decision, &order).await? {
                Execution::Filled => Ok(CycleReport {
                    outcome: CycleOutcome::Executed,
                    decision_ref,
                    filled_trades: 1,
                }),
                Execution::BrokerRejected => Ok(CycleReport {
                    outcome: CycleOutcome::Failed,
                    decision_ref,
                    filled_trades: 0,
                }),
            },
        }
    }

    /// Force-close the given positions. Decisions are always recorded;
    /// execution requires an open session.
    async fn close_positions(
        &self,
        cycle: &Cycle,
        session: MarketSession,
        snapshot: &AccountSnapshot,
        positions: &[Position],
        reason: &str,
    ) -> Result<CycleReport> {
        let mut pending: HashSet<String> = HashSet::new();
        let mut first_decision = None;
        let mut filled = 0u32;
        let mut gate_rejects = 0u32;
        let mut broker_failures = 0u32;
        let mut cancelled = false;

        for position in positions {
            if self.shutdown_requested() {
                warn!(cycle_id = %cycle.id, "shutdown requested mid close-all");
                cancelled = true;
                break;
            }

            let quantity = position.quantity.abs();
            if quantity == 0 {
                continue;
            }

            let mut decision = Decision::new(
                cycle.id,
                TradeAction::Close,
                Some(position.symbol.clone()),
                Some(quantity),
                reason.to_string(),
                FORCED_CLOSE_RISK_SCORE,
            );
            self.store.append_decision(&decision).await?;
            first_decision.get_or_insert(decision.id);

            if !session.is_open() {
                continue;
            }

            let order = OrderProposal {
                action: TradeAction::Close,
                symbol: position.symbol.clone(),
                quantity,
                reference_price: position.current_price,
                risk_score: FORCED_CLOSE_RISK_SCORE,
            };
            let view = AccountView {
                total_value: snapshot.total_value,
                pending_symbols: pending.clone(),
            };
            match self.gate.evaluate(&order, &view) {
                RiskVerdict::Reject(reject) => {
                    info!(%reject, symbol = %order.symbol, "forced close rejected by risk gate");
                    gate_rejects += 1;
                    continue;
                }
                RiskVerdict::Accept => {}
            }
            pending.insert(position.symbol.clone());

            match self.execute(&mut decision, &order).await? {
                Execution::Filled => filled += 1,
                Execution::BrokerRejected => broker_failures += 1,
            }
        }

        let outcome = if !session.is_open() {
            CycleOutcome::SkippedMarketClosed
        } else if cancelled || broker_failures > 0 {
            CycleOutcome::Failed
        } else if filled == 0 && gate_rejects > 0 {
            CycleOutcome::SkippedRisk
        } else {
            CycleOutcome::Executed
        };

        Ok(CycleReport {
            outcome,
            decision_ref: first_decision,
            filled_trades: filled,
        })
    }

    /// Submit one accepted order and persist its trade.
    /// A store failure after a broker fill is a reconciliation emergency
    /// and propagates instead of closing the cycle normally.
    async fn execute(
        &self,
        decision: &mut Decision,
        order: &OrderProposal,
    ) -> Result<Execution> {
        let request = OrderRequest {
            symbol: order.symbol.clone(),
            action: order.action,
            quantity: order.quantity,
        };

        match self.broker.submit_order(&request).await {
            Ok(fill) => {
                let trade = Trade::filled(
                    decision.id,
                    order.symbol.clone(),
                    order.action,
                    fill.filled_quantity,
                    fill.price,
                    fill.fee,
                );
                if let Err(e) = self.store.append_trade(&trade).await {
                    error!(
                        trade_id = %trade.id,
                        decision_id = %decision.id,
                        symbol = %order.symbol,
                        "RECONCILIATION REQUIRED: broker filled order but the \
                         trade could not be persisted: {e}"
                    );
                    return Err(e);
                }
                if let Err(e) = self.store.attach_trade(decision.id, trade.id).await {
                    error!(
                        trade_id = %trade.id,
                        decision_id = %decision.id,
                        "RECONCILIATION REQUIRED: trade persisted but decision \
                         link failed: {e}"
                    );
                    return Err(e);
                }
                decision.mark_executed(trade.id);
                info!(
                    symbol = %order.symbol,
                    action = %order.action,
                    quantity = fill.filled_quantity,
                    price = %fill.price,
                    "trade executed"
                );
                Ok(Execution::Filled)
            }
            Err(e) => {
                warn!(symbol = %order.symbol, "broker rejected order: {e}");
                let trade = Trade::rejected(
                    decision.id,
                    order.symbol.clone(),
                    order.action,
                    order.quantity,
                    order.reference_price,
                );
                self.store.append_trade(&trade).await?;
                Ok(Execution::BrokerRejected)
            }
        }
    }

    /// First position breaching its own stop-loss or take-profit threshold
    fn position_exit(&self, account: &BrokerAccount) -> Option<(Position, String)> {
        let stop = self.settings.position_stop_loss_pct * Decimal::ONE_HUNDRED;
        let take = self.settings.position_take_profit_pct * Decimal::ONE_HUNDRED;

        for position in &account.positions {
            let pnl_pct = position.pnl_percent();
            if stop > Decimal::ZERO && pnl_pct <= -stop {
                return Some((
                    position.clone(),
                    format!(
                        "position stop-loss: {} down {}%",
                        position.symbol,
                        pnl_pct.round_dp(2).abs()
                    ),
                ));
            }
            if take > Decimal::ZERO && pnl_pct >= take {
                return Some((
                    position.clone(),
                    format!(
                        "taking profits: {} up {}%",
                        position.symbol,
                        pnl_pct.round_dp(2)
                    ),
                ));
            }
        }
        None
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Decode the engine's proposal into a concrete order. Sells and closes
/// fall back to the held quantity and current price; buys must be fully
/// specified by the engine.
fn resolve(
    proposal: &Proposal,
    account: &BrokerAccount,
) -> std::result::Result<OrderProposal, String> {
    let symbol = proposal
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or("proposal is missing a symbol")?;

    match proposal.action {
        TradeAction::Buy => {
            let quantity = proposal
                .quantity
                .filter(|q| *q > 0)
                .ok_or("buy proposal is missing a positive quantity")?;
            let reference_price = proposal
                .reference_price
                .filter(|p| *p > Decimal::ZERO)
                .ok_or("buy proposal is missing a reference price")?;
            Ok(OrderProposal {
                action: TradeAction::Buy,
                symbol,
                quantity,
                reference_price,
                risk_score: proposal.risk_score,
            })
        }
        TradeAction::Sell | TradeAction::Close => {
            let held = account
                .positions
                .iter()
                .find(|p| p.symbol == symbol)
                .ok_or_else(|| format!("no open position in {symbol}"))?;
            let held_quantity = held.quantity.abs();
            let quantity = proposal
                .quantity
                .filter(|q| *q > 0)
                .unwrap_or(held_quantity)
                .min(held_quantity);
            let reference_price = proposal
                .reference_price
                .filter(|p| *p > Decimal::ZERO)
                .unwrap_or(held.current_price);
            Ok(OrderProposal {
                action: proposal.action,
                symbol,
                quantity,
                reference_price,
                risk_score: proposal.risk_score,
            })
        }
        TradeAction::Keep => Err("KEEP does not resolve to an order".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account_with(symbol: &str, quantity: i64, avg: Decimal, current: Decimal) -> BrokerAccount {
        BrokerAccount {
            cash: dec!(10_000),
            positions: vec![Position {
                symbol: symbol.to_string(),
                quantity,
                avg_price: avg,
                current_price: current,
            }],
        }
    }

    #[test]
    fn resolve_buy_requires_quantity_and_price() {
        let account = BrokerAccount {
            cash: dec!(1_000),
            positions: vec![],
        };
        let mut proposal = Proposal {
            action: TradeAction::Buy,
            symbol: Some("AAPL".to_string()),
            quantity: None,
            reference_price: Some(dec!(100)),
            reasoning: String::new(),
            risk_score: 40,
        };
        assert!(resolve(&proposal, &account).is_err());

        proposal.quantity = Some(5);
        let order = resolve(&proposal, &account).unwrap();
        assert_eq!(order.quantity, 5);
        assert_eq!(order.reference_price, dec!(100));
    }

    #[test]
    fn resolve_close_defaults_to_held_quantity() {
        let account = account_with("AAPL", 25, dec!(90), dec!(100));
        let proposal = Proposal {
            action: TradeAction::Close,
            symbol: Some("AAPL".to_string()),
            quantity: None,
            reference_price: None,
            reasoning: String::new(),
            risk_score: 40,
        };
        let order = resolve(&proposal, &account).unwrap();
        assert_eq!(order.quantity, 25);
        assert_eq!(order.reference_price, dec!(100));
    }

    #[test]
    fn resolve_sell_caps_at_held_quantity() {
        let account = account_with("AAPL", 10, dec!(90), dec!(100));
        let proposal = Proposal {
            action: TradeAction::Sell,
            symbol: Some("AAPL".to_string()),
            quantity: Some(50),
            reference_price: None,
            reasoning: String::new(),
            risk_score: 40,
        };
        let order = resolve(&proposal, &account).unwrap();
        assert_eq!(order.quantity, 10);
    }

    #[test]
    fn resolve_rejects_exit_without_position() {
        let account = BrokerAccount {
            cash: dec!(1_000),
            positions: vec![],
        };
        let proposal = Proposal {
            action: TradeAction::Close,
            symbol: Some("TSLA".to_string()),
            quantity: None,
            reference_price: None,
            reasoning: String::new(),
            risk_score: 40,
        };
        assert!(resolve(&proposal, &account).is_err());
    }
}
