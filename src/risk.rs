//! Risk gate.
//!
//! Stateless validator sitting between a proposal and the broker. All
//! checks run on data the orchestrator already holds; the gate itself
//! performs no I/O and never suspends. Rules run in order and the first
//! failing rule wins.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

use crate::config::RiskConfig;
use crate::domain::TradeAction;

/// A concrete order candidate, fully resolved by the orchestrator
#[derive(Debug, Clone)]
pub struct OrderProposal {
    pub action: TradeAction,
    pub symbol: String,
    pub quantity: i64,
    /// Price used for notional sizing (quote or current position price)
    pub reference_price: Decimal,
    pub risk_score: u8,
}

impl OrderProposal {
    pub fn notional(&self) -> Decimal {
        Decimal::from(self.quantity) * self.reference_price
    }
}

/// Account facts the gate evaluates against
#[derive(Debug, Clone)]
pub struct AccountView {
    pub total_value: Decimal,
    /// Symbols with an unresolved order in the current cycle lineage
    pub pending_symbols: HashSet<String>,
}

/// Why a proposal was rejected
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum RejectReason {
    AllocationExceeded {
        limit: Decimal,
        notional: Decimal,
    },
    RiskScoreCeiling {
        ceiling: u8,
        score: u8,
    },
    DuplicateSubmission {
        symbol: String,
    },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::AllocationExceeded { limit, notional } => {
                write!(f, "notional ${notional} exceeds allocation limit ${limit}")
            }
            RejectReason::RiskScoreCeiling { ceiling, score } => {
                write!(f, "risk score {score} above ceiling {ceiling}")
            }
            RejectReason::DuplicateSubmission { symbol } => {
                write!(f, "{symbol} already has a pending order this cycle")
            }
        }
    }
}

/// Gate verdict
#[derive(Debug, Clone)]
pub enum RiskVerdict {
    Accept,
    Reject(RejectReason),
}

impl RiskVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, RiskVerdict::Accept)
    }
}

/// Pure proposal validator
#[derive(Debug, Clone)]
pub struct RiskGate {
    max_allocation_pct: Decimal,
    max_risk_score: u8,
}

impl RiskGate {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            max_allocation_pct: config.max_allocation_pct,
            max_risk_score: config.max_risk_score,
        }
    }

    pub fn evaluate(&self, proposal: &OrderProposal, account: &AccountView) -> RiskVerdict {
        // Sells and closes are reduce-only: they shrink exposure, so the
        // allocation cap applies to buys alone. A forced stop-loss close
        // must never be blocked for being "too large".
        if proposal.action.is_entry() {
            let limit = account.total_value * self.max_allocation_pct;
            let notional = proposal.notional();
            if notional > limit {
                return RiskVerdict::Reject(RejectReason::AllocationExceeded { limit, notional });
            }
        }

        if proposal.risk_score > self.max_risk_score {
            return RiskVerdict::Reject(RejectReason::RiskScoreCeiling {
                ceiling: self.max_risk_score,
                score: proposal.risk_score,
            });
        }

        if account.pending_symbols.contains(&proposal.symbol) {
            return RiskVerdict::Reject(RejectReason::DuplicateSubmission {
                symbol: proposal.symbol.clone(),
            });
        }

        RiskVerdict::Accept
    }
}
