//! Market session clock.
//!
//! Pure mapping from wall-clock time to an exchange session, computed in
//! exchange-local time. Sessions mirror US equities hours: pre-market
//! 4:00-9:30, regular 9:30-16:00, after-hours 16:00-20:00, local time.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::MarketConfig;
use crate::error::{Result, TillerError};

// Session boundaries, minutes since local midnight
const PRE_MARKET_OPEN_MIN: u32 = 240; // 04:00
const MARKET_OPEN_MIN: u32 = 570; // 09:30
const MARKET_CLOSE_MIN: u32 = 960; // 16:00
const AFTER_HOURS_CLOSE_MIN: u32 = 1200; // 20:00

/// Market session state, derived from time and never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketSession {
    Closed,
    PreMarket,
    Open,
    AfterHours,
}

impl MarketSession {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::PreMarket => "PRE_MARKET",
            Self::Open => "OPEN",
            Self::AfterHours => "AFTER_HOURS",
        }
    }

    /// Trade execution is permitted only during regular hours
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for MarketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exchange timezone plus holiday dates
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    tz: Tz,
    holidays: HashSet<NaiveDate>,
}

impl MarketCalendar {
    pub fn new(timezone: &str, holidays: &[String]) -> Result<Self> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| TillerError::Calendar(format!("unknown timezone: {timezone}")))?;

        let mut dates = HashSet::new();
        for raw in holidays {
            let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
                TillerError::Calendar(format!("invalid holiday date '{raw}': {e}"))
            })?;
            dates.insert(date);
        }

        Ok(Self { tz, holidays: dates })
    }

    pub fn from_config(config: &MarketConfig) -> Result<Self> {
        Self::new(&config.timezone, &config.holidays)
    }

    /// Session at an arbitrary instant. Weekends and holidays are closed
    /// regardless of time of day.
    pub fn session_at(&self, t: DateTime<Utc>) -> MarketSession {
        let local = t.with_timezone(&self.tz);

        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketSession::Closed;
        }
        if self.holidays.contains(&local.date_naive()) {
            return MarketSession::Closed;
        }

        let minutes = local.hour() * 60 + local.minute();
        if (MARKET_OPEN_MIN..MARKET_CLOSE_MIN).contains(&minutes) {
            MarketSession::Open
        } else if (PRE_MARKET_OPEN_MIN..MARKET_OPEN_MIN).contains(&minutes) {
            MarketSession::PreMarket
        } else if (MARKET_CLOSE_MIN..AFTER_HOURS_CLOSE_MIN).contains(&minutes) {
            MarketSession::AfterHours
        } else {
            MarketSession::Closed
        }
    }

    /// Session right now
    pub fn current_session(&self) -> MarketSession {
        self.session_at(Utc::now())
    }
}
