//! Shared test doubles: scripted broker and engines driving the real
//! scheduler/orchestrator against the in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use tiller::broker::{BrokerClient, OrderFill, OrderRequest};
use tiller::config::{EngineConfig, RiskConfig};
use tiller::domain::BrokerAccount;
use tiller::engine::{DecisionEngine, EngineContext, Proposal};
use tiller::error::{Result, TillerError};
use tiller::orchestrator::{DecisionOrchestrator, OrchestratorSettings};
use tiller::reflection::ReflectionTracker;
use tiller::risk::RiskGate;
use tiller::store::MemoryStore;
use tiller::summarizer::StatsSummarizer;

/// Broker double with a fixed account view and scripted fills
pub struct StubBroker {
    account: Mutex<BrokerAccount>,
    fail_submits: bool,
    fill_price: Decimal,
    pub submitted: Mutex<Vec<OrderRequest>>,
}

impl StubBroker {
    pub fn new(account: BrokerAccount) -> Self {
        Self {
            account: Mutex::new(account),
            fail_submits: false,
            fill_price: dec!(100),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(account: BrokerAccount) -> Self {
        Self {
            fail_submits: true,
            ..Self::new(account)
        }
    }

    pub fn with_fill_price(mut self, price: Decimal) -> Self {
        self.fill_price = price;
        self
    }
}

#[async_trait]
impl BrokerClient for StubBroker {
    async fn account_state(&self) -> Result<BrokerAccount> {
        Ok(self.account.lock().await.clone())
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderFill> {
        self.submitted.lock().await.push(order.clone());
        if self.fail_submits {
            return Err(TillerError::Broker("stub rejects all orders".to_string()));
        }
        Ok(OrderFill {
            price: self.fill_price,
            fee: dec!(1),
            filled_quantity: order.quantity,
        })
    }
}

/// Engine returning one fixed proposal, recording whether it was consulted
pub struct FixedEngine {
    proposal: Proposal,
    pub called: AtomicBool,
}

impl FixedEngine {
    pub fn new(proposal: Proposal) -> Self {
        Self {
            proposal,
            called: AtomicBool::new(false),
        }
    }

    pub fn was_called(&self) -> bool {
        self.called.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionEngine for FixedEngine {
    async fn propose(&self, _context: &EngineContext) -> Result<Proposal> {
        self.called.store(true, Ordering::SeqCst);
        Ok(self.proposal.clone())
    }
}

/// Engine that parks until released, for holding the single-flight lock
pub struct BlockingEngine {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl BlockingEngine {
    pub fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl DecisionEngine for BlockingEngine {
    async fn propose(&self, _context: &EngineContext) -> Result<Proposal> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Proposal::keep("released by test"))
    }
}

/// Engine tracking its peak concurrent callers
pub struct CountingEngine {
    current: AtomicU32,
    pub peak: AtomicU32,
}

impl CountingEngine {
    pub fn new() -> Self {
        Self {
            current: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DecisionEngine for CountingEngine {
    async fn propose(&self, _context: &EngineContext) -> Result<Proposal> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(Proposal::keep("counted"))
    }
}

/// Orchestrator wired to the in-memory store with the given risk settings
pub fn orchestrator_with(
    risk: RiskConfig,
    broker: Arc<dyn BrokerClient>,
    engine: Arc<dyn DecisionEngine>,
    store: Arc<MemoryStore>,
) -> DecisionOrchestrator {
    // the orchestrator only ever borrows the flag, so the dropped sender
    // leaves it permanently "not shut down"
    let (_tx, rx) = tokio::sync::watch::channel(false);

    let tracker = Arc::new(ReflectionTracker::new(
        5,
        store.clone(),
        Arc::new(StatsSummarizer),
    ));
    DecisionOrchestrator::new(
        broker,
        engine,
        store,
        RiskGate::new(&risk),
        tracker,
        OrchestratorSettings::from_config(&risk, &EngineConfig::default()),
        rx,
    )
}

/// Default-risk orchestrator with per-position exits disabled, so tests
/// exercise them explicitly
pub fn orchestrator(
    broker: Arc<dyn BrokerClient>,
    engine: Arc<dyn DecisionEngine>,
    store: Arc<MemoryStore>,
) -> DecisionOrchestrator {
    orchestrator_with(
        RiskConfig {
            position_stop_loss_pct: Decimal::ZERO,
            position_take_profit_pct: Decimal::ZERO,
            ..RiskConfig::default()
        },
        broker,
        engine,
        store,
    )
}

pub fn flat_account(cash: Decimal) -> BrokerAccount {
    BrokerAccount {
        cash,
        positions: vec![],
    }
}
