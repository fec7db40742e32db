use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An open position as reported by the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub avg_price: Decimal,
    pub current_price: Decimal,
}

impl Position {
    pub fn value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.current_price
    }

    pub fn pnl(&self) -> Decimal {
        (self.current_price - self.avg_price) * Decimal::from(self.quantity)
    }

    /// Unrealized gain/loss as a percentage of entry price
    pub fn pnl_percent(&self) -> Decimal {
        if self.avg_price.is_zero() {
            return Decimal::ZERO;
        }
        (self.current_price - self.avg_price) / self.avg_price * Decimal::ONE_HUNDRED
    }
}

/// Read-only account state returned by the broker collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccount {
    pub cash: Decimal,
    pub positions: Vec<Position>,
}

impl BrokerAccount {
    pub fn positions_value(&self) -> Decimal {
        self.positions.iter().map(|p| p.value()).sum()
    }

    pub fn total_value(&self) -> Decimal {
        self.cash + self.positions_value()
    }
}

/// Point-in-time account record; append-only, never mutated.
///
/// PnL is measured against the first snapshot ever taken, so the baseline
/// survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cash: Decimal,
    pub positions_value: Decimal,
    pub total_value: Decimal,
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
}

impl AccountSnapshot {
    /// Build a snapshot from broker state against a PnL baseline.
    /// Without a baseline (first snapshot ever) PnL starts at zero.
    pub fn from_account(account: &BrokerAccount, baseline: Option<Decimal>) -> Self {
        let positions_value = account.positions_value();
        let total_value = account.cash + positions_value;
        let baseline = baseline.unwrap_or(total_value);

        let pnl = total_value - baseline;
        let pnl_percent = if baseline > Decimal::ZERO {
            pnl / baseline * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        Self {
            timestamp: Utc::now(),
            cash: account.cash,
            positions_value,
            total_value,
            pnl,
            pnl_percent,
        }
    }
}
