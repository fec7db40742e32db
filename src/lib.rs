pub mod api;
pub mod broker;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod mode;
pub mod orchestrator;
pub mod reflection;
pub mod risk;
pub mod scheduler;
pub mod store;
pub mod summarizer;

pub use broker::{BrokerClient, OrderFill, OrderRequest, PaperBroker};
pub use clock::{MarketCalendar, MarketSession};
pub use config::AppConfig;
pub use engine::{DecisionEngine, EngineContext, HoldEngine, Proposal};
pub use error::{Result, TillerError};
pub use mode::{Mode, ModeController};
pub use orchestrator::{CycleReport, DecisionOrchestrator, OrchestratorSettings};
pub use reflection::ReflectionTracker;
pub use risk::{AccountView, OrderProposal, RejectReason, RiskGate, RiskVerdict};
pub use scheduler::{Scheduler, SchedulerStatus, TriggerResponse};
pub use store::{MemoryStore, PostgresStore, Store};
pub use summarizer::{StatsSummarizer, Summarizer, TradeSummary, TradeWindow};
