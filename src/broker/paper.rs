//! Paper broker: fills orders against quoted prices without touching a real
//! brokerage. Used for dry runs and tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::{BrokerAccount, Position, TradeAction};
use crate::error::{Result, TillerError};

use super::{BrokerClient, OrderFill, OrderRequest};

struct PaperState {
    cash: Decimal,
    positions: HashMap<String, Position>,
    quotes: HashMap<String, Decimal>,
}

pub struct PaperBroker {
    state: RwLock<PaperState>,
    fee: Decimal,
}

impl PaperBroker {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            state: RwLock::new(PaperState {
                cash: starting_cash,
                positions: HashMap::new(),
                quotes: HashMap::new(),
            }),
            fee: dec!(1),
        }
    }

    /// Set the simulated market price for a symbol
    pub async fn set_quote(&self, symbol: &str, price: Decimal) {
        let mut state = self.state.write().await;
        state.quotes.insert(symbol.to_string(), price);
        if let Some(position) = state.positions.get_mut(symbol) {
            position.current_price = price;
        }
    }

    async fn quote(&self, symbol: &str) -> Result<Decimal> {
        self.state
            .read()
            .await
            .quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| TillerError::Broker(format!("no quote for {symbol}")))
    }
}

#[async_trait]
impl BrokerClient for PaperBroker {
    async fn account_state(&self) -> Result<BrokerAccount> {
        let state = self.state.read().await;
        Ok(BrokerAccount {
            cash: state.cash,
            positions: state.positions.values().cloned().collect(),
        })
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderFill> {
        if order.quantity <= 0 {
            return Err(TillerError::Broker(format!(
                "invalid quantity {} for {}",
                order.quantity, order.symbol
            )));
        }
        let price = self.quote(&order.symbol).await?;
        let mut state = self.state.write().await;

        match order.action {
            TradeAction::Buy => {
                let cost = Decimal::from(order.quantity) * price + self.fee;
                if cost > state.cash {
                    return Err(TillerError::Broker(format!(
                        "insufficient cash: need {cost}, have {}",
                        state.cash
                    )));
                }
                state.cash -= cost;
                let position = state
                    .positions
                    .entry(order.symbol.clone())
                    .or_insert_with(|| Position {
                        symbol: order.symbol.clone(),
                        quantity: 0,
                        avg_price: Decimal::ZERO,
                        current_price: price,
                    });
                let old_cost = Decimal::from(position.quantity) * position.avg_price;
                let new_quantity = position.quantity + order.quantity;
                position.avg_price =
                    (old_cost + Decimal::from(order.quantity) * price) / Decimal::from(new_quantity);
                position.quantity = new_quantity;
                position.current_price = price;
            }
            TradeAction::Sell | TradeAction::Close => {
                let held = state
                    .positions
                    .get(&order.symbol)
                    .map(|p| p.quantity)
                    .unwrap_or(0);
                if held < order.quantity {
                    return Err(TillerError::Broker(format!(
                        "cannot sell {} {}: holding {held}",
                        order.quantity, order.symbol
                    )));
                }
                state.cash += Decimal::from(order.quantity) * price - self.fee;
                let position = state.positions.get_mut(&order.symbol).unwrap();
                position.quantity -= order.quantity;
                if position.quantity == 0 {
                    state.positions.remove(&order.symbol);
                }
            }
            TradeAction::Keep => {
                return Err(TillerError::Broker("KEEP is not an order".to_string()));
            }
        }

        info!(
            symbol = %order.symbol,
            action = %order.action,
            quantity = order.quantity,
            %price,
            "paper fill"
        );

        Ok(OrderFill {
            price,
            fee: self.fee,
            filled_quantity: order.quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buy_then_close_round_trip() {
        let broker = PaperBroker::new(dec!(10_000));
        broker.set_quote("AAPL", dec!(100)).await;

        let fill = broker
            .submit_order(&OrderRequest {
                symbol: "AAPL".to_string(),
                action: TradeAction::Buy,
                quantity: 10,
            })
            .await
            .unwrap();
        assert_eq!(fill.price, dec!(100));

        let account = broker.account_state().await.unwrap();
        assert_eq!(account.cash, dec!(8_999)); // 10_000 - 1_000 - 1 fee
        assert_eq!(account.positions.len(), 1);

        broker.set_quote("AAPL", dec!(110)).await;
        broker
            .submit_order(&OrderRequest {
                symbol: "AAPL".to_string(),
                action: TradeAction::Close,
                quantity: 10,
            })
            .await
            .unwrap();

        let account = broker.account_state().await.unwrap();
        assert!(account.positions.is_empty());
        assert_eq!(account.cash, dec!(10_098)); // +1_100 - 1 fee
    }

    #[tokio::test]
    async fn rejects_overdraft_and_oversell() {
        let broker = PaperBroker::new(dec!(100));
        broker.set_quote("AAPL", dec!(100)).await;

        let overdraft = broker
            .submit_order(&OrderRequest {
                symbol: "AAPL".to_string(),
                action: TradeAction::Buy,
                quantity: 5,
            })
            .await;
        assert!(matches!(overdraft, Err(TillerError::Broker(_))));

        let oversell = broker
            .submit_order(&OrderRequest {
                symbol: "AAPL".to_string(),
                action: TradeAction::Sell,
                quantity: 1,
            })
            .await;
        assert!(matches!(oversell, Err(TillerError::Broker(_))));
    }

    #[tokio::test]
    async fn buys_average_the_entry_price() {
        let broker = PaperBroker::new(dec!(100_000));
        broker.set_quote("MSFT", dec!(100)).await;
        broker
            .submit_order(&OrderRequest {
                symbol: "MSFT".to_string(),
                action: TradeAction::Buy,
                quantity: 10,
            })
            .await
            .unwrap();

        broker.set_quote("MSFT", dec!(200)).await;
        broker
            .submit_order(&OrderRequest {
                symbol: "MSFT".to_string(),
                action: TradeAction::Buy,
                quantity: 10,
            })
            .await
            .unwrap();

        let account = broker.account_state().await.unwrap();
        assert_eq!(account.positions[0].avg_price, dec!(150));
        assert_eq!(account.positions[0].quantity, 20);
    }
}
