//! Cycle scheduler.
//!
//! Owns the single-flight lock. A fixed-interval timer fires scheduled
//! triggers; manual triggers arrive from any caller and return their
//! outcome synchronously. Concurrent triggers are rejected, never queued:
//! at most one cycle is in flight, and the next interval tick picks up
//! whatever a rejected tick would have done.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::broker::BrokerClient;
use crate::clock::{MarketCalendar, MarketSession};
use crate::config::SchedulerConfig;
use crate::domain::{AccountSnapshot, Cycle, CycleOutcome, TriggerSource};
use crate::error::Result;
use crate::mode::{Mode, ModeController};
use crate::orchestrator::{CycleReport, DecisionOrchestrator};
use crate::reflection::ReflectionTracker;
use crate::store::Store;

/// Synchronous answer to a trigger
#[derive(Debug, Clone)]
pub enum TriggerResponse {
    /// The cycle ran and closed with the carried outcome
    Completed(Cycle),
    /// Another cycle is in flight; rejected, not queued
    Busy,
    /// Scheduled tick ignored because the mode is MANUAL
    Disabled,
}

/// Snapshot of scheduler state for the control surface
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub mode: Mode,
    pub market_session: MarketSession,
    pub market_open: bool,
    pub cycle_in_flight: bool,
    pub cycle_interval_minutes: u64,
    pub trades_since_reflection: u32,
    pub reflection_threshold: u32,
}

pub struct Scheduler {
    cycle_interval: Duration,
    snapshot_interval: Duration,
    calendar: MarketCalendar,
    mode: Arc<ModeController>,
    orchestrator: DecisionOrchestrator,
    store: Arc<dyn Store>,
    broker: Arc<dyn BrokerClient>,
    tracker: Arc<ReflectionTracker>,
    flight: Mutex<()>,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &SchedulerConfig,
        calendar: MarketCalendar,
        mode: Arc<ModeController>,
        orchestrator: DecisionOrchestrator,
        store: Arc<dyn Store>,
        broker: Arc<dyn BrokerClient>,
        tracker: Arc<ReflectionTracker>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cycle_interval: Duration::from_secs(config.cycle_interval_minutes * 60),
            snapshot_interval: Duration::from_secs(config.snapshot_interval_minutes * 60),
            calendar,
            mode,
            orchestrator,
            store,
            broker,
            tracker,
            flight: Mutex::new(()),
            shutdown,
        }
    }

    /// Dispatch one trigger through the single-flight lock.
    ///
    /// The lock guard is held for the whole cycle and released on every
    /// exit path, including errors, when it drops.
    pub async fn dispatch(&self, source: TriggerSource) -> Result<TriggerResponse> {
        let _guard = match self.flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                match source {
                    TriggerSource::Manual => {
                        info!("manual trigger rejected: cycle already in flight")
                    }
                    TriggerSource::Scheduled => {
                        warn!("scheduled trigger rejected: previous cycle still running")
                    }
                }
                return Ok(TriggerResponse::Busy);
            }
        };

        if source == TriggerSource::Scheduled && self.mode.get() != Mode::Auto {
            debug!("scheduled tick ignored: mode is MANUAL");
            return Ok(TriggerResponse::Disabled);
        }

        let session = self.calendar.current_session();
        let mut cycle = Cycle::begin(source);
        info!(cycle_id = %cycle.id, %source, %session, "cycle dispatched");
        self.store.append_cycle(&cycle).await?;

        // Scheduled triggers outside regular hours never reach the engine;
        // manual triggers always run the analysis.
        let report = if source == TriggerSource::Scheduled && !session.is_open() {
            debug!(%session, "market not open, skipping scheduled cycle");
            CycleReport::skipped_market_closed()
        } else {
            self.orchestrator.run_cycle(&cycle, session).await?
        };

        cycle.close(report.outcome, report.decision_ref);
        self.store.close_cycle(&cycle).await?;
        info!(cycle_id = %cycle.id, outcome = %report.outcome, "cycle closed");

        Ok(TriggerResponse::Completed(cycle))
    }

    /// Fire a manual trigger; the outcome is returned to the caller
    pub async fn trigger_manual(&self) -> Result<TriggerResponse> {
        self.dispatch(TriggerSource::Manual).await
    }

    /// Swap the mode and persist it, returning the previous value
    pub async fn set_mode(&self, mode: Mode) -> Mode {
        let previous = self.mode.set(mode);
        if let Err(e) = self.store.save_mode(mode).await {
            warn!("mode set to {mode} but could not be persisted: {e}");
        }
        info!(%previous, current = %mode, "trading mode changed");
        previous
    }

    pub fn status(&self) -> SchedulerStatus {
        let session = self.calendar.current_session();
        SchedulerStatus {
            mode: self.mode.get(),
            market_session: session,
            market_open: session.is_open(),
            cycle_in_flight: self.flight.try_lock().is_err(),
            cycle_interval_minutes: self.cycle_interval.as_secs() / 60,
            trades_since_reflection: self.tracker.trades_since_reflection(),
            reflection_threshold: self.tracker.threshold(),
        }
    }

    /// Drive the timers until shutdown. Only store failures escape; every
    /// other error has already been folded into a closed FAILED cycle.
    pub async fn run(&self) -> Result<()> {
        self.recover_stale_cycle().await?;

        let mut cycle_tick = interval_at(Instant::now() + self.cycle_interval, self.cycle_interval);
        cycle_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut snapshot_tick = interval_at(
            Instant::now() + self.snapshot_interval,
            self.snapshot_interval,
        );
        snapshot_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut shutdown = self.shutdown.clone();
        info!(
            interval_minutes = self.cycle_interval.as_secs() / 60,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = cycle_tick.tick() => {
                    match self.dispatch(TriggerSource::Scheduled).await {
                        Ok(TriggerResponse::Completed(_)) | Ok(TriggerResponse::Busy) | Ok(TriggerResponse::Disabled) => {}
                        Err(e) => {
                            error!(
                                "persistence failure mid-cycle, stopping scheduler; \
                                 manual reconciliation required: {e}"
                            );
                            return Err(e);
                        }
                    }
                }
                _ = snapshot_tick.tick() => {
                    if let Err(e) = self.record_snapshot().await {
                        warn!("account snapshot failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduler stopping");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Close any cycle left open by a previous crash so the single-open
    /// invariant holds from the first dispatch.
    async fn recover_stale_cycle(&self) -> Result<()> {
        if let Some(mut stale) = self.store.open_cycle().await? {
            warn!(
                cycle_id = %stale.id,
                started_at = %stale.started_at,
                "found open cycle from a previous run, closing as FAILED"
            );
            stale.close(CycleOutcome::Failed, stale.decision_ref);
            self.store.close_cycle(&stale).await?;
        }
        Ok(())
    }

    /// Periodic account snapshot outside the decision path
    async fn record_snapshot(&self) -> Result<()> {
        let account = self.broker.account_state().await?;
        let baseline = self.store.first_snapshot().await?.map(|s| s.total_value);
        let snapshot = AccountSnapshot::from_account(&account, baseline);
        self.store.append_snapshot(&snapshot).await
    }
}
