//! End-to-end reflection cadence and per-position exit overrides.

mod common;

use rust_decimal_macros::dec;
use std::sync::Arc;

use common::{FixedEngine, StubBroker};
use tiller::clock::MarketSession;
use tiller::config::RiskConfig;
use tiller::domain::{
    BrokerAccount, Cycle, CycleOutcome, Position, TradeAction, TriggerSource,
};
use tiller::engine::Proposal;
use tiller::store::{MemoryStore, Store};

fn buy_one() -> Proposal {
    Proposal {
        action: TradeAction::Buy,
        symbol: Some("AAPL".to_string()),
        quantity: Some(1),
        reference_price: Some(dec!(100)),
        reasoning: "steady accumulation".to_string(),
        risk_score: 20,
    }
}

#[tokio::test]
async fn reflections_fire_every_five_fills_across_cycles() {
    let store = Arc::new(MemoryStore::new());
    let broker = Arc::new(StubBroker::new(common::flat_account(dec!(1_000_000))));
    let engine = Arc::new(FixedEngine::new(buy_one()));
    let orchestrator = common::orchestrator(broker, engine, store.clone());

    for _ in 0..12 {
        let cycle = Cycle::begin(TriggerSource::Scheduled);
        store.append_cycle(&cycle).await.unwrap();
        let report = orchestrator
            .run_cycle(&cycle, MarketSession::Open)
            .await
            .unwrap();
        assert_eq!(report.outcome, CycleOutcome::Executed);
    }

    let reflections = store.recent_reflections(10).await.unwrap();
    assert_eq!(reflections.len(), 2, "12 fills at threshold 5 → 2 reflections");
    assert!(reflections.iter().all(|r| r.trades_analyzed == 5));

    // two fills remain uncounted toward the next reflection
    let since = reflections
        .iter()
        .map(|r| r.period_end)
        .max()
        .unwrap();
    assert_eq!(store.filled_trades_since(since).await.unwrap(), 2);
}

#[tokio::test]
async fn losing_position_is_closed_before_the_engine_runs() {
    let store = Arc::new(MemoryStore::new());
    let account = BrokerAccount {
        cash: dec!(10_000),
        positions: vec![Position {
            symbol: "NVDA".to_string(),
            quantity: 10,
            avg_price: dec!(100),
            current_price: dec!(88), // down 12%, past the 10% stop
        }],
    };
    let broker = Arc::new(StubBroker::new(account));
    let engine = Arc::new(FixedEngine::new(buy_one()));
    let orchestrator = common::orchestrator_with(
        RiskConfig::default(),
        broker.clone(),
        engine.clone(),
        store.clone(),
    );

    let cycle = Cycle::begin(TriggerSource::Scheduled);
    store.append_cycle(&cycle).await.unwrap();
    let report = orchestrator
        .run_cycle(&cycle, MarketSession::Open)
        .await
        .unwrap();

    assert_eq!(report.outcome, CycleOutcome::Executed);
    assert_eq!(report.filled_trades, 1);
    assert!(!engine.was_called());

    let decisions = store.recent_decisions(10).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].action, TradeAction::Close);
    assert_eq!(decisions[0].symbol.as_deref(), Some("NVDA"));
    assert!(decisions[0].reasoning.contains("stop-loss"));
}

#[tokio::test]
async fn winning_position_takes_profit_before_the_engine_runs() {
    let store = Arc::new(MemoryStore::new());
    let account = BrokerAccount {
        cash: dec!(10_000),
        positions: vec![Position {
            symbol: "NVDA".to_string(),
            quantity: 10,
            avg_price: dec!(100),
            current_price: dec!(120), // up 20%, past the 15% take-profit
        }],
    };
    let broker = Arc::new(StubBroker::new(account));
    let engine = Arc::new(FixedEngine::new(buy_one()));
    let orchestrator = common::orchestrator_with(
        RiskConfig::default(),
        broker,
        engine.clone(),
        store.clone(),
    );

    let cycle = Cycle::begin(TriggerSource::Manual);
    store.append_cycle(&cycle).await.unwrap();
    let report = orchestrator
        .run_cycle(&cycle, MarketSession::Open)
        .await
        .unwrap();

    assert_eq!(report.outcome, CycleOutcome::Executed);
    assert!(!engine.was_called());

    let decisions = store.recent_decisions(10).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].reasoning.contains("profits"));
}

#[tokio::test]
async fn healthy_positions_reach_the_engine() {
    let store = Arc::new(MemoryStore::new());
    let account = BrokerAccount {
        cash: dec!(10_000),
        positions: vec![Position {
            symbol: "NVDA".to_string(),
            quantity: 10,
            avg_price: dec!(100),
            current_price: dec!(105), // within both thresholds
        }],
    };
    let broker = Arc::new(StubBroker::new(account));
    let engine = Arc::new(FixedEngine::new(buy_one()));
    let orchestrator = common::orchestrator_with(
        RiskConfig::default(),
        broker,
        engine.clone(),
        store.clone(),
    );

    let cycle = Cycle::begin(TriggerSource::Scheduled);
    store.append_cycle(&cycle).await.unwrap();
    orchestrator
        .run_cycle(&cycle, MarketSession::Open)
        .await
        .unwrap();

    assert!(engine.was_called());
}
