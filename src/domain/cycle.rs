use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What caused a cycle to be dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerSource {
    Scheduled,
    Manual,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Manual => "MANUAL",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for TriggerSource {
    type Error = String;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        match raw {
            "SCHEDULED" => Ok(Self::Scheduled),
            "MANUAL" => Ok(Self::Manual),
            other => Err(format!("invalid trigger source: {other}")),
        }
    }
}

/// Terminal outcome of a completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleOutcome {
    /// Cycle ran to completion; includes analysis-only cycles where the
    /// engine proposed KEEP and no order was placed.
    Executed,
    /// A proposal was rejected by the risk gate.
    SkippedRisk,
    /// Execution was not permitted because the market session was not OPEN.
    SkippedMarketClosed,
    /// Engine, broker, or cancellation failure.
    Failed,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "EXECUTED",
            Self::SkippedRisk => "SKIPPED_RISK",
            Self::SkippedMarketClosed => "SKIPPED_MARKET_CLOSED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CycleOutcome {
    type Error = String;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        match raw {
            "EXECUTED" => Ok(Self::Executed),
            "SKIPPED_RISK" => Ok(Self::SkippedRisk),
            "SKIPPED_MARKET_CLOSED" => Ok(Self::SkippedMarketClosed),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("invalid cycle outcome: {other}")),
        }
    }
}

/// One invocation of the decision orchestrator.
///
/// Created open at dispatch time and closed exactly once; the store never
/// holds more than one open cycle because dispatch is single-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub trigger_source: TriggerSource,
    pub outcome: Option<CycleOutcome>,
    pub decision_ref: Option<Uuid>,
}

impl Cycle {
    /// Open a new cycle for the given trigger
    pub fn begin(trigger_source: TriggerSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            trigger_source,
            outcome: None,
            decision_ref: None,
        }
    }

    /// Close the cycle with its terminal outcome
    pub fn close(&mut self, outcome: CycleOutcome, decision_ref: Option<Uuid>) {
        self.ended_at = Some(Utc::now());
        self.outcome = Some(outcome);
        self.decision_ref = decision_ref;
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}
