use clap::Parser;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tiller::api::{self, ApiState};
use tiller::broker::{BrokerClient, PaperBroker};
use tiller::clock::MarketCalendar;
use tiller::config::AppConfig;
use tiller::engine::HoldEngine;
use tiller::mode::{Mode, ModeController};
use tiller::orchestrator::{DecisionOrchestrator, OrchestratorSettings};
use tiller::reflection::ReflectionTracker;
use tiller::risk::RiskGate;
use tiller::scheduler::Scheduler;
use tiller::store::{MemoryStore, PostgresStore, Store};
use tiller::summarizer::StatsSummarizer;

#[derive(Parser, Debug)]
#[command(name = "tiller", about = "Autonomous AI-driven equities trading loop")]
struct Cli {
    /// Directory containing default.toml / <env>.toml
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Run against the in-memory store (no database required)
    #[arg(long)]
    dry_run: bool,

    /// Override the control API port
    #[arg(long)]
    port: Option<u16>,
}

fn init_logging(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},tiller=debug,sqlx=warn")));

    // Optional daily-rotating file output when TILLER_LOG_DIR is writable
    let file_layer = std::env::var("TILLER_LOG_DIR").ok().and_then(|log_dir| {
        if std::fs::create_dir_all(&log_dir).is_err() {
            eprintln!("Warning: could not create log directory {log_dir}, file logging disabled");
            return None;
        }
        let file_appender = tracing_appender::rolling::daily(&log_dir, "tiller.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Keep the guard alive for the life of the process
        Box::leak(Box::new(guard));
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    init_logging(&config.logging.level);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config: {e}");
        }
        anyhow::bail!("invalid configuration ({} error(s))", errors.len());
    }

    let calendar = MarketCalendar::from_config(&config.market)?;

    let store: Arc<dyn Store> = if cli.dry_run {
        info!("dry run: using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let store = PostgresStore::new(&config.database.url, config.database.max_connections)
            .await?;
        store.migrate().await?;
        Arc::new(store)
    };

    // Built-in collaborators: a paper broker and the advisory hold engine.
    // Real deployments wire their brokerage and reasoning backends through
    // the same traits.
    let broker: Arc<dyn BrokerClient> = Arc::new(PaperBroker::new(dec!(100_000)));
    let engine = Arc::new(HoldEngine);
    let summarizer = Arc::new(StatsSummarizer);

    // Mode survives restarts; anything unreadable falls back to MANUAL
    let initial_mode = match store.load_mode().await {
        Ok(Some(mode)) => mode,
        Ok(None) => Mode::Manual,
        Err(e) => {
            warn!("could not load persisted mode, defaulting to MANUAL: {e}");
            Mode::Manual
        }
    };
    info!(mode = %initial_mode, "starting");
    let mode = Arc::new(ModeController::new(initial_mode));

    let tracker = Arc::new(ReflectionTracker::new(
        config.reflection.trades_threshold,
        store.clone(),
        summarizer,
    ));
    tracker.resync().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator = DecisionOrchestrator::new(
        broker.clone(),
        engine,
        store.clone(),
        RiskGate::new(&config.risk),
        tracker.clone(),
        OrchestratorSettings::from_config(&config.risk, &config.engine),
        shutdown_rx.clone(),
    );

    let scheduler = Arc::new(Scheduler::new(
        &config.scheduler,
        calendar,
        mode,
        orchestrator,
        store.clone(),
        broker,
        tracker,
        shutdown_rx.clone(),
    ));

    // Ctrl-C / SIGTERM flips the shutdown signal once
    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
        }
    });

    let port = cli.port.or(config.api_port).unwrap_or(8080);
    let api_state = ApiState {
        scheduler: scheduler.clone(),
        store,
    };
    let api_task = tokio::spawn(api::serve(api_state, port, shutdown_rx));

    let result = scheduler.run().await;

    // Bring the API down with the scheduler, whatever stopped it
    let _ = shutdown_tx.send(true);
    let _ = api_task.await;

    result?;
    info!("stopped");
    Ok(())
}
