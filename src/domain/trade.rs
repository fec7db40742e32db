use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TradeAction;

/// Terminal status of a submitted order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Filled,
    Rejected,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filled => "FILLED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for TradeStatus {
    type Error = String;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        match raw {
            "FILLED" => Ok(Self::Filled),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("invalid trade status: {other}")),
        }
    }
}

/// A filled or rejected order, created only after the risk gate passed and
/// the broker responded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub decision_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: TradeAction,
    pub quantity: i64,
    pub price: Decimal,
    pub fee: Decimal,
    pub status: TradeStatus,
    pub total_value: Decimal,
}

impl Trade {
    /// Record a successful fill
    pub fn filled(
        decision_id: Uuid,
        symbol: String,
        action: TradeAction,
        quantity: i64,
        price: Decimal,
        fee: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            decision_id,
            timestamp: Utc::now(),
            symbol,
            action,
            quantity,
            price,
            fee,
            status: TradeStatus::Filled,
            total_value: Decimal::from(quantity) * price,
        }
    }

    /// Record an order the broker refused
    pub fn rejected(
        decision_id: Uuid,
        symbol: String,
        action: TradeAction,
        quantity: i64,
        reference_price: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            decision_id,
            timestamp: Utc::now(),
            symbol,
            action,
            quantity,
            price: reference_price,
            fee: Decimal::ZERO,
            status: TradeStatus::Rejected,
            total_value: Decimal::ZERO,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.status == TradeStatus::Filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn filled_trade_computes_total_value() {
        let trade = Trade::filled(
            Uuid::new_v4(),
            "AAPL".to_string(),
            TradeAction::Buy,
            10,
            dec!(185.50),
            dec!(1.00),
        );
        assert!(trade.is_filled());
        assert_eq!(trade.total_value, dec!(1855.00));
    }

    #[test]
    fn rejected_trade_has_no_value() {
        let trade = Trade::rejected(
            Uuid::new_v4(),
            "AAPL".to_string(),
            TradeAction::Buy,
            10,
            dec!(185.50),
        );
        assert_eq!(trade.status, TradeStatus::Rejected);
        assert_eq!(trade.total_value, Decimal::ZERO);
        assert_eq!(trade.fee, Decimal::ZERO);
    }
}
