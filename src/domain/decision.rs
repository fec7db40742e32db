use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Action proposed by the decision engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Close,
    Keep,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Close => "CLOSE",
            Self::Keep => "KEEP",
        }
    }

    /// Buys add exposure; sells and closes only reduce it.
    pub fn is_entry(&self) -> bool {
        matches!(self, Self::Buy)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Sell | Self::Close)
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for TradeAction {
    type Error = String;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        match raw {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "CLOSE" => Ok(Self::Close),
            "KEEP" => Ok(Self::Keep),
            other => Err(format!("invalid trade action: {other}")),
        }
    }
}

/// A proposal that reached the audit trail.
///
/// Every cycle that gets a terminal proposal out of the engine (or out of a
/// forced stop-loss override) records a decision, executed or not. The only
/// mutation after creation is attaching the trade reference once an order
/// fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: TradeAction,
    pub symbol: Option<String>,
    pub quantity: Option<i64>,
    pub reasoning: String,
    /// Engine-assessed risk, 0-100
    pub risk_score: u8,
    pub executed: bool,
    pub trade_ref: Option<Uuid>,
}

impl Decision {
    pub fn new(
        cycle_id: Uuid,
        action: TradeAction,
        symbol: Option<String>,
        quantity: Option<i64>,
        reasoning: String,
        risk_score: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cycle_id,
            timestamp: Utc::now(),
            action,
            symbol,
            quantity,
            reasoning,
            risk_score,
            executed: false,
            trade_ref: None,
        }
    }

    /// Attach the trade that executed this decision
    pub fn mark_executed(&mut self, trade_id: Uuid) {
        self.executed = true;
        self.trade_ref = Some(trade_id);
    }
}
