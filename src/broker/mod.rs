//! Brokerage collaborator contract.
//!
//! The orchestrator only needs two operations: a read-only account view and
//! one idempotent-safe order submission per accepted proposal. Connectivity
//! retries are the implementation's concern, never the orchestrator's.

mod paper;

pub use paper::PaperBroker;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{BrokerAccount, TradeAction};
use crate::error::Result;

/// An order the orchestrator wants placed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub action: TradeAction,
    pub quantity: i64,
}

/// Broker response to a submitted order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub price: Decimal,
    pub fee: Decimal,
    pub filled_quantity: i64,
}

impl OrderFill {
    pub fn total_value(&self) -> Decimal {
        Decimal::from(self.filled_quantity) * self.price
    }
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Current cash and open positions
    async fn account_state(&self) -> Result<BrokerAccount>;

    /// Submit an order; returns the fill or a broker error
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderFill>;
}
