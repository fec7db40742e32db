//! Decision engine collaborator contract.
//!
//! The engine is a black box: it receives the assembled account and market
//! context plus the declared read-only tool set, may run its own internal
//! tool loop, and returns one terminal proposal. The orchestrator decodes
//! that proposal once at its boundary and never sees intermediate steps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::MarketSession;
use crate::domain::{AccountSnapshot, Position, Trade, TradeAction};
use crate::error::Result;

/// A read-only capability advertised to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCapability {
    pub name: String,
    pub description: String,
}

/// Everything the engine gets to see for one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineContext {
    pub snapshot: AccountSnapshot,
    pub positions: Vec<Position>,
    pub recent_trades: Vec<Trade>,
    pub session: MarketSession,
    pub capabilities: Vec<ToolCapability>,
    pub timestamp: DateTime<Utc>,
}

impl EngineContext {
    /// The default read-only tool set declared to the engine
    pub fn default_capabilities() -> Vec<ToolCapability> {
        vec![
            ToolCapability {
                name: "price_lookup".to_string(),
                description: "Current and historical prices for a symbol".to_string(),
            },
            ToolCapability {
                name: "news_search".to_string(),
                description: "Recent headlines and sentiment for a symbol".to_string(),
            },
            ToolCapability {
                name: "trending_tickers".to_string(),
                description: "Most active symbols this session".to_string(),
            },
        ]
    }
}

/// Terminal proposal returned by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub action: TradeAction,
    pub symbol: Option<String>,
    pub quantity: Option<i64>,
    /// Price the engine sized the proposal against
    pub reference_price: Option<Decimal>,
    pub reasoning: String,
    /// 0-100
    pub risk_score: u8,
}

impl Proposal {
    pub fn keep(reasoning: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Keep,
            symbol: None,
            quantity: None,
            reference_price: None,
            reasoning: reasoning.into(),
            risk_score: 0,
        }
    }
}

#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn propose(&self, context: &EngineContext) -> Result<Proposal>;
}

/// Advisory default: always keeps the current book. Lets the loop run end
/// to end without a reasoning backend attached.
pub struct HoldEngine;

#[async_trait]
impl DecisionEngine for HoldEngine {
    async fn propose(&self, context: &EngineContext) -> Result<Proposal> {
        Ok(Proposal::keep(format!(
            "advisory mode: holding {} open position(s), no reasoning backend configured",
            context.positions.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BrokerAccount;

    #[tokio::test]
    async fn hold_engine_always_keeps() {
        let account = BrokerAccount {
            cash: Decimal::from(1000),
            positions: vec![],
        };
        let context = EngineContext {
            snapshot: AccountSnapshot::from_account(&account, None),
            positions: vec![],
            recent_trades: vec![],
            session: MarketSession::Open,
            capabilities: EngineContext::default_capabilities(),
            timestamp: Utc::now(),
        };

        let proposal = HoldEngine.propose(&context).await.unwrap();
        assert_eq!(proposal.action, TradeAction::Keep);
        assert_eq!(proposal.risk_score, 0);
    }
}
