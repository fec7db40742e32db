use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Periodic self-review covering the trades since the previous reflection.
/// Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub trades_analyzed: i32,
    pub total_pnl: Decimal,
    pub win_rate: f64,
    pub content: String,
    pub lessons_learned: Option<String>,
}

impl Reflection {
    pub fn new(
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        trades_analyzed: i32,
        total_pnl: Decimal,
        win_rate: f64,
        content: String,
        lessons_learned: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            period_start,
            period_end,
            trades_analyzed,
            total_pnl,
            win_rate,
            content,
            lessons_learned,
        }
    }
}
