//! Scheduler-level invariants: single-flight dispatch, bounded rejection,
//! mode gating, and market-hours gating, driven through the real scheduler
//! against the in-memory store.

mod common;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::watch;

use common::{BlockingEngine, CountingEngine, StubBroker};
use tiller::broker::BrokerClient;
use tiller::clock::MarketCalendar;
use tiller::config::{EngineConfig, RiskConfig, SchedulerConfig};
use tiller::domain::{CycleOutcome, TradeAction, TriggerSource};
use tiller::engine::{DecisionEngine, Proposal};
use tiller::mode::{Mode, ModeController};
use tiller::orchestrator::{DecisionOrchestrator, OrchestratorSettings};
use tiller::reflection::ReflectionTracker;
use tiller::risk::RiskGate;
use tiller::scheduler::{Scheduler, TriggerResponse};
use tiller::store::{MemoryStore, Store};
use tiller::summarizer::StatsSummarizer;

/// Calendar that is guaranteed closed right now: today and its UTC
/// neighbours are holidays, so the exchange-local date is covered no
/// matter the offset.
fn closed_calendar() -> MarketCalendar {
    let today = Utc::now().date_naive();
    let holidays: Vec<String> = [-1i64, 0, 1]
        .iter()
        .map(|d| (today + Duration::days(*d)).format("%Y-%m-%d").to_string())
        .collect();
    MarketCalendar::new("America/New_York", &holidays).unwrap()
}

struct Harness {
    scheduler: Arc<Scheduler>,
    store: Arc<MemoryStore>,
    _shutdown_tx: watch::Sender<bool>,
}

fn harness(engine: Arc<dyn DecisionEngine>, mode: Mode) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let broker: Arc<dyn BrokerClient> =
        Arc::new(StubBroker::new(common::flat_account(dec!(100_000))));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let risk = RiskConfig::default();
    let tracker = Arc::new(ReflectionTracker::new(
        5,
        store.clone(),
        Arc::new(StatsSummarizer),
    ));
    let orchestrator = DecisionOrchestrator::new(
        broker.clone(),
        engine,
        store.clone(),
        RiskGate::new(&risk),
        tracker.clone(),
        OrchestratorSettings::from_config(&risk, &EngineConfig::default()),
        shutdown_rx.clone(),
    );
    let scheduler = Arc::new(Scheduler::new(
        &SchedulerConfig::default(),
        closed_calendar(),
        Arc::new(ModeController::new(mode)),
        orchestrator,
        store.clone(),
        broker,
        tracker,
        shutdown_rx,
    ));

    Harness {
        scheduler,
        store,
        _shutdown_tx: shutdown_tx,
    }
}

#[tokio::test]
async fn concurrent_manual_trigger_is_rejected_while_running() {
    let engine = Arc::new(BlockingEngine::new());
    let entered = engine.entered.clone();
    let release = engine.release.clone();
    let h = harness(engine, Mode::Manual);

    let first = {
        let scheduler = h.scheduler.clone();
        tokio::spawn(async move { scheduler.trigger_manual().await.unwrap() })
    };
    // wait until the first cycle is inside the engine call
    entered.notified().await;

    // exactly one open cycle while the first is in flight
    assert!(h.store.open_cycle().await.unwrap().is_some());

    let second = h.scheduler.trigger_manual().await.unwrap();
    assert!(matches!(second, TriggerResponse::Busy));

    release.notify_one();
    let first = first.await.unwrap();
    match first {
        TriggerResponse::Completed(cycle) => {
            assert_eq!(cycle.outcome, Some(CycleOutcome::Executed));
        }
        other => panic!("expected completed cycle, got {other:?}"),
    }

    // the rejected trigger left no trace
    assert!(h.store.open_cycle().await.unwrap().is_none());
    assert_eq!(h.store.recent_cycles(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn trigger_storm_never_overlaps_cycles() {
    let engine = Arc::new(CountingEngine::new());
    let h = harness(engine.clone(), Mode::Manual);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let scheduler = h.scheduler.clone();
        tasks.push(tokio::spawn(
            async move { scheduler.trigger_manual().await },
        ));
    }

    let mut completed = 0;
    let mut busy = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            TriggerResponse::Completed(_) => completed += 1,
            TriggerResponse::Busy => busy += 1,
            TriggerResponse::Disabled => panic!("manual triggers are never disabled"),
        }
    }

    assert_eq!(completed + busy, 8);
    assert!(completed >= 1);
    assert_eq!(
        engine.peak.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "two cycles entered the engine concurrently"
    );
    assert!(h.store.open_cycle().await.unwrap().is_none());
    assert_eq!(
        h.store.recent_cycles(20).await.unwrap().len(),
        completed as usize
    );
}

#[tokio::test]
async fn scheduled_trigger_outside_open_hours_skips_without_engine() {
    let engine = Arc::new(common::FixedEngine::new(Proposal {
        action: TradeAction::Buy,
        symbol: Some("AAPL".to_string()),
        quantity: Some(1),
        reference_price: Some(dec!(100)),
        reasoning: "should never be consulted".to_string(),
        risk_score: 10,
    }));
    let h = harness(engine.clone(), Mode::Auto);

    let response = h.scheduler.dispatch(TriggerSource::Scheduled).await.unwrap();
    match response {
        TriggerResponse::Completed(cycle) => {
            assert_eq!(cycle.outcome, Some(CycleOutcome::SkippedMarketClosed));
            assert!(!cycle.is_open());
        }
        other => panic!("expected completed skip cycle, got {other:?}"),
    }

    assert!(!engine.was_called());
    assert!(h.store.recent_decisions(10).await.unwrap().is_empty());
    assert!(h.store.recent_trades(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn scheduled_trigger_in_manual_mode_is_ignored() {
    let engine = Arc::new(CountingEngine::new());
    let h = harness(engine, Mode::Manual);

    let response = h.scheduler.dispatch(TriggerSource::Scheduled).await.unwrap();
    assert!(matches!(response, TriggerResponse::Disabled));
    assert!(h.store.recent_cycles(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn manual_trigger_runs_analysis_when_market_closed() {
    // engine proposes a buy; the closed session must record the decision
    // without creating a trade
    let engine = Arc::new(common::FixedEngine::new(Proposal {
        action: TradeAction::Buy,
        symbol: Some("AAPL".to_string()),
        quantity: Some(10),
        reference_price: Some(dec!(100)),
        reasoning: "pre-market conviction".to_string(),
        risk_score: 30,
    }));
    let h = harness(engine.clone(), Mode::Manual);

    let response = h.scheduler.trigger_manual().await.unwrap();
    match response {
        TriggerResponse::Completed(cycle) => {
            assert_eq!(cycle.outcome, Some(CycleOutcome::SkippedMarketClosed));
            assert!(cycle.decision_ref.is_some());
        }
        other => panic!("expected completed cycle, got {other:?}"),
    }

    assert!(engine.was_called());
    let decisions = h.store.recent_decisions(10).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert!(!decisions[0].executed);
    assert!(h.store.recent_trades(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn mode_change_applies_to_next_dispatch() {
    let engine = Arc::new(CountingEngine::new());
    let h = harness(engine, Mode::Manual);

    assert!(matches!(
        h.scheduler.dispatch(TriggerSource::Scheduled).await.unwrap(),
        TriggerResponse::Disabled
    ));

    let previous = h.scheduler.set_mode(Mode::Auto).await;
    assert_eq!(previous, Mode::Manual);
    // persisted for the next startup
    assert_eq!(h.store.load_mode().await.unwrap(), Some(Mode::Auto));

    match h.scheduler.dispatch(TriggerSource::Scheduled).await.unwrap() {
        TriggerResponse::Completed(cycle) => {
            // closed calendar: the cycle runs but skips execution
            assert_eq!(cycle.outcome, Some(CycleOutcome::SkippedMarketClosed));
        }
        other => panic!("expected completed cycle, got {other:?}"),
    }
}
