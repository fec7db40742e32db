//! Domain model for the trading loop: cycles, decisions, trades,
//! reflections, and account state.

mod account;
mod cycle;
mod decision;
mod reflection;
mod trade;

pub use account::{AccountSnapshot, BrokerAccount, Position};
pub use cycle::{Cycle, CycleOutcome, TriggerSource};
pub use decision::{Decision, TradeAction};
pub use reflection::Reflection;
pub use trade::{Trade, TradeStatus};
